//! Output formatting module
//!
//! Renders status progress, briefings and settings for the terminal using
//! colored output. Rendering returns strings so callers decide the stream.
use crate::config::Settings;
use crate::protocol::{OperationStatus, Phase, SourceFeedback, StrategicBriefing, VectorStatus};
use console::Style;

/// Output formatter for CLI results
#[derive(Clone)]
pub struct OutputFormatter {
    // Styles
    blue: Style,
    green: Style,
    yellow: Style,
    red: Style,
    bold: Style,
    dim: Style,
}

impl Default for OutputFormatter {
    fn default() -> Self {
        Self {
            blue: Style::new().blue(),
            green: Style::new().green(),
            yellow: Style::new().yellow(),
            red: Style::new().red(),
            bold: Style::new().bold(),
            dim: Style::new().dim(),
        }
    }
}

impl OutputFormatter {
    /// Create a new formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Render a briefing as terminal text
    pub fn render_briefing(&self, briefing: &StrategicBriefing) -> String {
        let mut out = Vec::new();

        out.push(self.bold.apply_to("Strategic Briefing").to_string());
        out.push(format!("Query: {}", briefing.query));
        out.push(format!(
            "Level: {} ({})",
            briefing.search_level.as_str(),
            briefing.search_level.name()
        ));
        out.push(self.dim.apply_to(format!("{} | {}", briefing.id, briefing.timestamp)).to_string());
        if briefing.is_emergency() {
            out.push(self.red.apply_to("Emergency report built from partial results").to_string());
        } else if briefing.is_recovered() {
            out.push(self.yellow.apply_to("Recovered from an incomplete response").to_string());
        }

        out.push(String::new());
        out.push(self.heading("Executive Summary"));
        out.push(briefing.executive_summary.clone());

        let solution = &briefing.engineered_solution;
        out.push(String::new());
        out.push(self.heading(&solution.title));
        for (index, step) in solution.steps.iter().enumerate() {
            out.push(format!("{}. {}", index + 1, step));
        }

        let dossier = &briefing.evidence_dossier;
        out.push(String::new());
        out.push(self.heading(&dossier.title));
        for source in &dossier.sources {
            let marker = match source.feedback {
                Some(SourceFeedback::Useful) => format!(" {}", self.green.apply_to("[useful]")),
                Some(SourceFeedback::NotUseful) => format!(" {}", self.red.apply_to("[not useful]")),
                None => String::new(),
            };
            out.push(format!(
                "- [{:.1}] {} {}{}",
                source.relevance_score,
                source.title,
                self.blue.apply_to(&source.url),
                marker
            ));
            if !source.summary.is_empty() {
                out.push(format!("  {}", source.summary));
            }
        }

        let red_team = &briefing.red_team_analysis;
        out.push(String::new());
        out.push(self.heading(&red_team.title));
        out.push(self.bold.apply_to("Potential failures:").to_string());
        out.extend(red_team.potential_failures.iter().map(|f| format!("- {}", f)));
        out.push(self.bold.apply_to("Mitigation strategies:").to_string());
        out.extend(red_team.mitigation_strategies.iter().map(|m| format!("- {}", m)));

        if let Some(visual) = briefing.visual_data.as_ref().filter(|v| !v.nodes.is_empty()) {
            out.push(String::new());
            out.push(self.heading("Knowledge Graph"));
            for node in &visual.nodes {
                out.push(format!("- {} ({:?})", node.label, node.kind));
            }
            for edge in &visual.edges {
                out.push(format!("  {} -> {} {}", edge.from, edge.to, self.dim.apply_to(&edge.label)));
            }
        }

        out.join("\n")
    }

    /// One line per saved briefing
    pub fn render_history(&self, briefings: &[StrategicBriefing]) -> String {
        if briefings.is_empty() {
            return "No saved briefings.".to_string();
        }
        briefings
            .iter()
            .map(|b| {
                format!(
                    "{}  {}  {}  {}",
                    self.green.apply_to(&b.id),
                    self.dim.apply_to(&b.timestamp),
                    b.search_level.as_str(),
                    b.query
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Print the effective settings
    pub fn render_settings(&self, settings: &Settings) -> String {
        let mut out = vec![self.bold.apply_to("Current Configuration:").to_string()];
        out.push(format!("- Model: {}", self.green.apply_to(&settings.endpoint.model)));
        out.push(format!("- Base URL: {}", settings.endpoint.base_url));
        out.push(format!(
            "- API key: {}",
            if settings.has_api_key() { "set" } else { "missing" }
        ));
        out.push(format!("- Protocol: {}", settings.protocol));
        out.push(format!("- Default level: {}", settings.default_search_level));
        out.push(format!(
            "- Temperature: {} | Top-p: {}",
            settings.generation.temperature, settings.generation.top_p
        ));
        out.push(format!("- Language: {}", settings.generation.language));
        out.push(format!(
            "- Live search: {} | Knowledge base: {} ({} sources)",
            settings.features.live_search,
            settings.features.knowledge_base,
            settings.knowledge_base.sources.len()
        ));
        out.push(format!(
            "- Retries: {} | Attempt timeout: {}s | Retry delay: {}ms",
            settings.retry.max_retries, settings.retry.attempt_timeout_secs, settings.retry.retry_delay_ms
        ));
        out.join("\n")
    }

    fn heading(&self, title: &str) -> String {
        self.bold.apply_to(format!("## {}", title)).to_string()
    }
}

/// Prints only what changed between consecutive status snapshots
pub struct StatusPrinter {
    formatter: OutputFormatter,
    last: Option<OperationStatus>,
}

impl StatusPrinter {
    pub fn new(formatter: OutputFormatter) -> Self {
        Self {
            formatter,
            last: None,
        }
    }

    /// Lines describing the change from the previous snapshot.
    pub fn render(&mut self, status: &OperationStatus) -> Vec<String> {
        let f = &self.formatter;
        let mut lines = Vec::new();
        let previous = self.last.as_ref();

        if previous.map(|p| p.phase != status.phase).unwrap_or(true) {
            let style = match status.phase {
                Phase::Retrying => &f.yellow,
                Phase::Complete => &f.green,
                _ => &f.bold,
            };
            lines.push(format!(
                "[{:>3}%] {}: {}",
                status.progress,
                style.apply_to(status.phase.as_str()),
                status.message
            ));
        }

        let shared = previous
            .map(|p| {
                p.operations_log
                    .iter()
                    .zip(&status.operations_log)
                    .take_while(|(a, b)| a == b)
                    .count()
            })
            .unwrap_or(0);
        for line in &status.operations_log[shared..] {
            lines.push(format!("  {}", f.dim.apply_to(line)));
        }

        for (vector, state) in &status.search_vectors {
            let known = previous.and_then(|p| p.search_vectors.get(vector));
            if known.is_none() {
                lines.push(format!("  {} {}", f.blue.apply_to("vector:"), vector));
            } else if known != Some(state) && *state == VectorStatus::Active {
                lines.push(format!("  {} {}", f.blue.apply_to("searching:"), vector));
            }
        }

        for source in &status.live_search_results {
            if !previous.map(|p| p.has_source(&source.url)).unwrap_or(false) {
                lines.push(format!(
                    "  {} {} ({})",
                    f.green.apply_to("source:"),
                    source.title,
                    source.url
                ));
            }
        }

        if let Some(cycle) = status.reasoning_cycle {
            if previous.and_then(|p| p.reasoning_cycle) != Some(cycle) {
                lines.push(format!("  reasoning cycle {}/{}", cycle.current, cycle.total));
            }
        }

        self.last = Some(status.clone());
        lines
    }

    /// Print the change to stderr so stdout stays free for the report.
    pub fn print(&mut self, status: &OperationStatus) {
        for line in self.render(status) {
            eprintln!("{}", line);
        }
    }

    /// Last snapshot seen, if any.
    pub fn last(&self) -> Option<&OperationStatus> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ReasoningCycle, SearchLevel, Source};
    use serde_json::json;

    fn source(url: &str) -> Source {
        Source {
            url: url.to_string(),
            title: "Title".to_string(),
            summary: "Summary".to_string(),
            relevance_score: 8.0,
            is_verified: Some(true),
            feedback: None,
        }
    }

    #[test]
    fn test_status_printer_prints_deltas() {
        let mut printer = StatusPrinter::new(OutputFormatter::new());
        let mut status = OperationStatus::initial();
        let first = printer.render(&status);
        assert_eq!(first.len(), 2);
        assert!(first[0].contains("IDLE"));

        assert!(printer.render(&status).is_empty());

        status.phase = Phase::ParallelizedDataMining;
        status.operations_log.push("mining".to_string());
        status.search_vectors.insert("xray reality".to_string(), VectorStatus::Pending);
        status.live_search_results.push(source("https://a.example"));
        status.reasoning_cycle = Some(ReasoningCycle { current: 1, total: 2 });
        let lines = printer.render(&status);
        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("PARALLELIZED_DATA_MINING"));
        assert!(lines[1].contains("mining"));
        assert!(lines[2].contains("xray reality"));
        assert!(lines[3].contains("https://a.example"));
        assert!(lines[4].contains("reasoning cycle 1/2"));

        status.search_vectors.insert("xray reality".to_string(), VectorStatus::Active);
        let lines = printer.render(&status);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("searching:"));
        assert!(printer.last().is_some());
    }

    #[test]
    fn test_status_printer_handles_reset_log() {
        let mut printer = StatusPrinter::new(OutputFormatter::new());
        let mut status = OperationStatus::initial();
        status.operations_log = vec!["a".to_string(), "b".to_string()];
        printer.render(&status);

        let retrying = OperationStatus::retrying(1, 3, "boom");
        let lines = printer.render(&retrying);
        assert!(lines[0].contains("RETRYING"));
        assert!(lines.iter().any(|l| l.contains("**Attempt 1 failed:** boom")));
        assert!(lines.iter().any(|l| l.contains("**Retry (2/3)...**")));
    }

    #[test]
    fn test_render_briefing() {
        let mut briefing = StrategicBriefing::from_model_value(
            json!({
                "executiveSummary": "Summary text",
                "engineeredSolution": { "title": "Plan", "steps": ["one", "two"] },
                "evidenceDossier": { "title": "Evidence", "sources": [
                    { "url": "https://a.example", "title": "A", "summary": "about a", "relevanceScore": 9 }
                ]},
                "redTeamAnalysis": { "title": "Risks", "potentialFailures": ["f1"], "mitigationStrategies": ["m1"] },
                "visualData": { "nodes": [{ "id": "n1", "label": "REALITY", "type": "protocol" }], "edges": [] }
            }),
            "query text",
            SearchLevel::Level3,
            "briefing",
        )
        .unwrap();
        briefing.evidence_dossier.sources[0].feedback = Some(SourceFeedback::Useful);

        let text = OutputFormatter::new().render_briefing(&briefing);
        assert!(text.contains("Query: query text"));
        assert!(text.contains("LEVEL_3"));
        assert!(text.contains("Summary text"));
        assert!(text.contains("1. one\n2. two"));
        assert!(text.contains("[9.0] A"));
        assert!(text.contains("[useful]"));
        assert!(text.contains("  about a"));
        assert!(text.contains("- f1"));
        assert!(text.contains("- m1"));
        assert!(text.contains("- REALITY (Protocol)"));
        assert!(!text.contains("Recovered"));
    }

    #[test]
    fn test_render_history() {
        let formatter = OutputFormatter::new();
        assert_eq!(formatter.render_history(&[]), "No saved briefings.");

        let briefing = StrategicBriefing::emergency("q", SearchLevel::Level1, "boom", vec![]);
        let text = formatter.render_history(&[briefing.clone()]);
        assert!(text.contains(&briefing.id));
        assert!(text.contains("LEVEL_1"));
    }

    #[test]
    fn test_render_settings_hides_api_key() {
        let mut settings = Settings::default();
        settings.endpoint.api_key = Some("secret".to_string());
        let text = OutputFormatter::new().render_settings(&settings);
        assert!(text.contains("API key: set"));
        assert!(!text.contains("secret"));
        assert!(text.contains("gemini-2.5-flash"));
    }
}
