//! Wire events emitted by the model

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opening delimiter of an event packet.
pub const START_MARKER: &str = "<<<EVENT>>>";
/// Closing delimiter of an event packet.
pub const END_MARKER: &str = "<<<END_EVENT>>>";

/// One typed event decoded from a packet.
///
/// Wire form: `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum AgentEvent {
    PhaseUpdate {
        phase: String,
    },
    LogUpdate {
        message: String,
    },
    SearchVectorsGenerated {
        vectors: Vec<String>,
    },
    SourceFound {
        url: String,
        #[serde(default)]
        title: String,
        #[serde(default)]
        summary: String,
    },
    ReasoningCycleUpdate {
        current: u32,
        #[serde(default)]
        total: Option<u32>,
    },
    FinalReportGenerated {
        briefing: Value,
    },
}

impl AgentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::PhaseUpdate { .. } => "phase_update",
            AgentEvent::LogUpdate { .. } => "log_update",
            AgentEvent::SearchVectorsGenerated { .. } => "search_vectors_generated",
            AgentEvent::SourceFound { .. } => "source_found",
            AgentEvent::ReasoningCycleUpdate { .. } => "reasoning_cycle_update",
            AgentEvent::FinalReportGenerated { .. } => "final_report_generated",
        }
    }

    /// Render as a complete delimited packet.
    pub fn to_packet(&self) -> String {
        let body = serde_json::to_string(self).unwrap_or_default();
        format!("{}{}{}", START_MARKER, body, END_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_adjacently_tagged_form() {
        let event: AgentEvent =
            serde_json::from_str(r#"{"event":"phase_update","data":{"phase":"SYNTHESIS"}}"#).unwrap();
        assert_eq!(
            event,
            AgentEvent::PhaseUpdate {
                phase: "SYNTHESIS".to_string()
            }
        );
    }

    #[test]
    fn test_source_found_tolerates_missing_text_fields() {
        let event: AgentEvent =
            serde_json::from_str(r#"{"event":"source_found","data":{"url":"https://a.b"}}"#).unwrap();
        match event {
            AgentEvent::SourceFound { url, title, summary } => {
                assert_eq!(url, "https://a.b");
                assert!(title.is_empty());
                assert!(summary.is_empty());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_wrong_field_types_are_rejected() {
        let result: Result<AgentEvent, _> =
            serde_json::from_value(json!({"event": "reasoning_cycle_update", "data": {"current": "one"}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_packet_wraps_body_in_markers() {
        let packet = AgentEvent::LogUpdate {
            message: "hi".to_string(),
        }
        .to_packet();
        assert!(packet.starts_with(START_MARKER));
        assert!(packet.ends_with(END_MARKER));
        assert!(packet.contains(r#""event":"log_update""#));
    }
}
