//! Strategic briefing - the final report artifact

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Depth of the requested analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchLevel {
    #[serde(rename = "LEVEL_1")]
    Level1,
    #[default]
    #[serde(rename = "LEVEL_2")]
    Level2,
    #[serde(rename = "LEVEL_3")]
    Level3,
}

impl SearchLevel {
    /// Number of reasoning cycles the model is asked to run.
    pub fn reasoning_cycles(&self) -> u32 {
        match self {
            SearchLevel::Level1 => 1,
            SearchLevel::Level2 => 2,
            SearchLevel::Level3 => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchLevel::Level1 => "LEVEL_1",
            SearchLevel::Level2 => "LEVEL_2",
            SearchLevel::Level3 => "LEVEL_3",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SearchLevel::Level1 => "Tactical scan",
            SearchLevel::Level2 => "Strategic analysis",
            SearchLevel::Level3 => "Deep exploration",
        }
    }
}

impl fmt::Display for SearchLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "1" | "LEVEL_1" | "LEVEL1" | "TACTICAL" => Ok(SearchLevel::Level1),
            "2" | "LEVEL_2" | "LEVEL2" | "STRATEGIC" => Ok(SearchLevel::Level2),
            "3" | "LEVEL_3" | "LEVEL3" | "DEEP" => Ok(SearchLevel::Level3),
            _ => Err(format!("Unknown search level: {}", s)),
        }
    }
}

/// How the query text should be interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InputMode {
    #[default]
    Text,
    Json,
}

/// User verdict on a cited source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFeedback {
    Useful,
    NotUseful,
}

impl FromStr for SourceFeedback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "useful" | "up" => Ok(SourceFeedback::Useful),
            "not_useful" | "down" => Ok(SourceFeedback::NotUseful),
            _ => Err(format!("Unknown feedback value: {}", s)),
        }
    }
}

/// A discovered or cited information source. `url` is the identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    /// 1-10 scale
    #[serde(default, deserialize_with = "lenient_score")]
    pub relevance_score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<SourceFeedback>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineeredSolution {
    pub title: String,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceDossier {
    pub title: String,
    #[serde(deserialize_with = "lenient_sources")]
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedTeamAnalysis {
    pub title: String,
    pub potential_failures: Vec<String>,
    pub mitigation_strategies: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphNodeKind {
    Protocol,
    Tool,
    Vulnerability,
    Concept,
    Solution,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: GraphNodeKind,
    #[serde(default)]
    pub details: String,
    /// 0.0 to 1.0
    #[serde(default)]
    pub centrality: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualData {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// The final structured report delivered to the caller.
///
/// Every section is always present; sections the model omitted are filled
/// from [`default_skeleton`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategicBriefing {
    pub id: String,
    pub timestamp: String,
    pub query: String,
    pub search_level: SearchLevel,
    pub executive_summary: String,
    pub engineered_solution: EngineeredSolution,
    pub evidence_dossier: EvidenceDossier,
    pub red_team_analysis: RedTeamAnalysis,
    #[serde(
        default,
        deserialize_with = "lenient_visual_data",
        skip_serializing_if = "Option::is_none"
    )]
    pub visual_data: Option<VisualData>,
}

/// Relevance as a number or a numeric string; anything else scores 0.
fn lenient_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    let score = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or_default() as f32,
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    };
    Ok(score)
}

/// Keep the sources that carry a url, drop the rest.
fn lenient_sources<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Source>, D::Error> {
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    let sources = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Source>(item) {
            Ok(source) if !source.url.trim().is_empty() => Some(source),
            Ok(_) => None,
            Err(e) => {
                warn!("Dropping unreadable source from report: {}", e);
                None
            }
        })
        .collect();
    Ok(sources)
}

/// The graph is optional; an unreadable one is left out of the report.
fn lenient_visual_data<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<VisualData>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(visual) => Ok(Some(visual)),
        Err(e) => {
            warn!("Dropping unreadable visual data from report: {}", e);
            Ok(None)
        }
    }
}

pub const ENGINEERED_SOLUTION_PLACEHOLDER: &str = "Engineered Solution";
pub const EVIDENCE_DOSSIER_PLACEHOLDER: &str = "Evidence Dossier";
pub const RED_TEAM_PLACEHOLDER: &str = "Red Team Analysis";

/// Skeleton every model-supplied briefing is merged over.
pub fn default_skeleton() -> Value {
    json!({
        "executiveSummary": "",
        "engineeredSolution": { "title": ENGINEERED_SOLUTION_PLACEHOLDER, "steps": [] },
        "evidenceDossier": { "title": EVIDENCE_DOSSIER_PLACEHOLDER, "sources": [] },
        "redTeamAnalysis": {
            "title": RED_TEAM_PLACEHOLDER,
            "potentialFailures": [],
            "mitigationStrategies": []
        }
    })
}

/// Recursively merge `overlay` into `base`.
///
/// Objects merge key by key, `null` never replaces a default, anything else
/// replaces the base value wholesale.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        if !value.is_null() {
                            base_map.insert(key, value);
                        }
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}

impl StrategicBriefing {
    /// Build a briefing from a model-supplied JSON value.
    ///
    /// The value is merged over [`default_skeleton`], then `id`, `timestamp`,
    /// `query` and `searchLevel` are stamped by the host. The id is
    /// `<id_prefix>-<uuid>`.
    pub fn from_model_value(
        value: Value,
        query: &str,
        level: SearchLevel,
        id_prefix: &str,
    ) -> Result<Self, serde_json::Error> {
        let mut merged = default_skeleton();
        deep_merge(&mut merged, value);

        if let Value::Object(map) = &mut merged {
            stamp(map, query, level, id_prefix);
        }
        serde_json::from_value(merged)
    }

    /// Degraded briefing assembled by the caller after a failed run from the
    /// sources seen in the last status snapshot.
    pub fn emergency(query: &str, level: SearchLevel, error: &str, sources: Vec<Source>) -> Self {
        Self {
            id: new_id("emergency"),
            timestamp: chrono::Utc::now().to_rfc3339(),
            query: query.to_string(),
            search_level: level,
            executive_summary: format!(
                "The operation failed: \"{}\".\n\nNo final report was produced, but the information below was gathered during the run.",
                error
            ),
            engineered_solution: EngineeredSolution {
                title: "Incomplete solution".to_string(),
                steps: vec![
                    "The solution could not be fully engineered because of the error.".to_string(),
                    "Review the sources found and run the operation again.".to_string(),
                ],
            },
            evidence_dossier: EvidenceDossier {
                title: "Sources found before the failure".to_string(),
                sources,
            },
            red_team_analysis: RedTeamAnalysis {
                title: "Risk analysis not performed".to_string(),
                potential_failures: vec![
                    "Connection to the model was lost".to_string(),
                    "The model produced an incomplete response".to_string(),
                ],
                mitigation_strategies: vec![
                    "Run the operation again".to_string(),
                    "Refine and simplify the query".to_string(),
                ],
            },
            visual_data: None,
        }
    }

    /// Whether this briefing came from salvaged output rather than a clean report.
    pub fn is_recovered(&self) -> bool {
        self.id.starts_with("recovered-")
    }

    pub fn is_emergency(&self) -> bool {
        self.id.starts_with("emergency-")
    }
}

fn stamp(map: &mut Map<String, Value>, query: &str, level: SearchLevel, id_prefix: &str) {
    map.insert("id".to_string(), Value::String(new_id(id_prefix)));
    map.insert(
        "timestamp".to_string(),
        Value::String(chrono::Utc::now().to_rfc3339()),
    );
    map.insert("query".to_string(), Value::String(query.to_string()));
    map.insert(
        "searchLevel".to_string(),
        Value::String(level.as_str().to_string()),
    );
}

fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}
