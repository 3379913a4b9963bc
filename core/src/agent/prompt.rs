//! Task prompt generation
//!
//! Builds the user turn for an analysis run: the core task for the input
//! mode, the operating parameters, and the output contract for the selected
//! wire protocol.

use super::pipeline::AnalysisRequest;
use crate::config::WireProtocol;
use crate::protocol::{InputMode, END_MARKER, START_MARKER, WIRE_PHASES};

/// Builder for the analysis task prompt.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    protocol: WireProtocol,
    live_search: bool,
    knowledge_base: bool,
}

impl PromptBuilder {
    pub fn new(protocol: WireProtocol, live_search: bool, knowledge_base: bool) -> Self {
        Self {
            protocol,
            live_search,
            knowledge_base,
        }
    }

    /// Generate the task prompt for one request.
    pub fn build(&self, request: &AnalysisRequest) -> String {
        format!(
            "Primary task: {}\n\n\
            Operating parameters:\n\
            - Analysis level: {} ({} reasoning cycles)\n\
            - Knowledge base: {}\n\
            - Live search: {}\n\n\
            {}\n\n\
            Begin the protocol.",
            core_task(request),
            request.level.as_str(),
            request.level.reasoning_cycles(),
            self.knowledge_base_instruction(request.knowledge_base_context.as_deref()),
            self.live_search_instruction(),
            protocol_instructions(self.protocol),
        )
    }

    fn knowledge_base_instruction(&self, context: Option<&str>) -> String {
        match context.map(str::trim) {
            Some(context) if self.knowledge_base && !context.is_empty() => format!(
                "First, use the information available in the knowledge base. Knowledge base text:\n{}",
                context
            ),
            _ => "The knowledge base is disabled. Rely only on external information gathering."
                .to_string(),
        }
    }

    fn live_search_instruction(&self) -> &'static str {
        if self.live_search {
            "In the PARALLELIZED_DATA_MINING phase, use the Google Search tool to gather up-to-date information."
        } else {
            "Simulate the data mining process and report the expected findings from your internal knowledge."
        }
    }
}

fn core_task(request: &AnalysisRequest) -> String {
    match request.mode {
        InputMode::Json => format!(
            "Perform a comprehensive analysis of the following JSON configuration and produce a complete strategic report. JSON to analyze:\n```json\n{}\n```",
            request.query
        ),
        InputMode::Text => format!(
            "Produce a comprehensive strategic report for the following query: \"{}\"",
            request.query
        ),
    }
}

/// Output contract stated to the model for each wire protocol.
pub fn protocol_instructions(protocol: WireProtocol) -> String {
    let phases = WIRE_PHASES
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    match protocol {
        WireProtocol::Events => format!(
            "# Output Format: Event Stream\n\
            Report your progress as a sequence of events. Every event is a single JSON object wrapped in markers, exactly like this:\n\
            {start}{{\"event\":\"<name>\",\"data\":{{...}}}}{end}\n\n\
            ## Events\n\
            - `phase_update`: {{\"phase\": \"<PHASE>\"}}\n\
            - `log_update`: {{\"message\": \"<one line of reasoning>\"}}\n\
            - `search_vectors_generated`: {{\"vectors\": [\"<query>\", ...]}}\n\
            - `source_found`: {{\"url\": \"<url>\", \"title\": \"<title>\", \"summary\": \"<summary>\"}}\n\
            - `reasoning_cycle_update`: {{\"current\": <n>, \"total\": <m>}}\n\
            - `final_report_generated`: {{\"briefing\": {{\"executiveSummary\": \"...\", \"engineeredSolution\": {{\"title\": \"...\", \"steps\": [\"...\"]}}, \"evidenceDossier\": {{\"title\": \"...\", \"sources\": [{{\"url\": \"...\", \"title\": \"...\", \"summary\": \"...\", \"relevanceScore\": 0}}]}}, \"redTeamAnalysis\": {{\"title\": \"...\", \"potentialFailures\": [\"...\"], \"mitigationStrategies\": [\"...\"]}}, \"visualData\": {{\"nodes\": [{{\"id\": \"...\", \"label\": \"...\", \"type\": \"protocol|tool|vulnerability|concept|solution\", \"details\": \"...\", \"centrality\": 0.5}}], \"edges\": [{{\"from\": \"<id>\", \"to\": \"<id>\", \"label\": \"...\"}}]}}}}}}\n\n\
            ## Rules\n\
            - Phases, in order: {phases}.\n\
            - Never wrap events in code fences and never write text outside the markers.\n\
            - The last event MUST be `final_report_generated`.",
            start = START_MARKER,
            end = END_MARKER,
            phases = phases,
        ),
        WireProtocol::LegacyTags => format!(
            "# Output Format: Thinking Block\n\
            Write your full reasoning inside a <thinking>...</thinking> block. Inside it:\n\
            - Announce each phase on its own line as [PHASE: <PHASE>]. Phases, in order: {phases}.\n\
            - Announce each search query as [SEARCH_VECTOR: <query>].\n\
            - Report each source as <FOUND_SOURCE url=\"<url>\" title=\"<title>\" summary=\"<summary>\"/>.\n\n\
            After </thinking>, output ONLY the final report as one valid JSON object with the keys \
            executiveSummary, engineeredSolution, evidenceDossier, redTeamAnalysis and visualData. \
            No text after the JSON object.",
            phases = phases,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::pipeline::ModelParameters;
    use crate::protocol::SearchLevel;

    fn request(mode: InputMode, context: Option<&str>) -> AnalysisRequest {
        AnalysisRequest {
            query: "harden a VLESS REALITY server".to_string(),
            level: SearchLevel::Level3,
            mode,
            knowledge_base_context: context.map(str::to_string),
            parameters: ModelParameters::default(),
        }
    }

    #[test]
    fn test_text_prompt() {
        let prompt = PromptBuilder::new(WireProtocol::Events, true, true)
            .build(&request(InputMode::Text, None));
        assert!(prompt.contains("for the following query: \"harden a VLESS REALITY server\""));
        assert!(prompt.contains("LEVEL_3 (4 reasoning cycles)"));
        assert!(prompt.contains("knowledge base is disabled"));
        assert!(prompt.contains("use the Google Search tool"));
        assert!(prompt.contains(START_MARKER));
        assert!(prompt.ends_with("Begin the protocol."));
    }

    #[test]
    fn test_json_prompt_with_knowledge_base() {
        let prompt = PromptBuilder::new(WireProtocol::Events, false, true).build(&request(
            InputMode::Json,
            Some("- Source: XTLS/Xray-core (GITHUB_REPOSITORY)"),
        ));
        assert!(prompt.contains("```json\nharden a VLESS REALITY server\n```"));
        assert!(prompt.contains("Knowledge base text:\n- Source: XTLS/Xray-core"));
        assert!(prompt.contains("Simulate the data mining process"));
    }

    #[test]
    fn test_knowledge_base_switch_overrides_context() {
        let prompt = PromptBuilder::new(WireProtocol::Events, true, false)
            .build(&request(InputMode::Text, Some("- Source: x")));
        assert!(prompt.contains("knowledge base is disabled"));
        assert!(!prompt.contains("- Source: x"));
    }

    #[test]
    fn test_protocol_instructions_list_wire_phases() {
        let events = protocol_instructions(WireProtocol::Events);
        for phase in WIRE_PHASES {
            assert!(events.contains(phase.as_str()));
        }
        assert!(!events.contains("RETRYING"));
        assert!(events.contains("final_report_generated"));

        let legacy = protocol_instructions(WireProtocol::LegacyTags);
        assert!(legacy.contains("[PHASE: <PHASE>]"));
        assert!(legacy.contains("<FOUND_SOURCE"));
        assert!(!legacy.contains(START_MARKER));
    }
}
