//! Protocol phases
//!
//! The analysis protocol walks through a fixed, ordered set of phases. The
//! model announces them by name; names are normalized here and mapped back
//! onto the closed vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named stage of the analysis protocol, used for progress display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    Idle,
    QueryDeconstruction,
    KnowledgeBaseQuerying,
    SearchVectorGeneration,
    ParallelizedDataMining,
    InformationSynthesis,
    IterativeReasoning,
    SolutionEngineering,
    FinalReportGeneration,
    Retrying,
    Complete,
}

/// Canonical progress order. `Complete` closes every successful run.
pub const PHASE_ORDER: [Phase; 9] = [
    Phase::QueryDeconstruction,
    Phase::KnowledgeBaseQuerying,
    Phase::SearchVectorGeneration,
    Phase::ParallelizedDataMining,
    Phase::InformationSynthesis,
    Phase::IterativeReasoning,
    Phase::SolutionEngineering,
    Phase::FinalReportGeneration,
    Phase::Complete,
];

/// Phase names the model is allowed to emit on the wire.
pub const WIRE_PHASES: [Phase; 8] = [
    Phase::QueryDeconstruction,
    Phase::KnowledgeBaseQuerying,
    Phase::SearchVectorGeneration,
    Phase::ParallelizedDataMining,
    Phase::InformationSynthesis,
    Phase::IterativeReasoning,
    Phase::SolutionEngineering,
    Phase::FinalReportGeneration,
];

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::QueryDeconstruction => "QUERY_DECONSTRUCTION",
            Phase::KnowledgeBaseQuerying => "KNOWLEDGE_BASE_QUERYING",
            Phase::SearchVectorGeneration => "SEARCH_VECTOR_GENERATION",
            Phase::ParallelizedDataMining => "PARALLELIZED_DATA_MINING",
            Phase::InformationSynthesis => "INFORMATION_SYNTHESIS",
            Phase::IterativeReasoning => "ITERATIVE_REASONING",
            Phase::SolutionEngineering => "SOLUTION_ENGINEERING",
            Phase::FinalReportGeneration => "FINAL_REPORT_GENERATION",
            Phase::Retrying => "RETRYING",
            Phase::Complete => "COMPLETE",
        }
    }

    /// Human-readable description shown next to the progress bar.
    pub fn description(&self) -> &'static str {
        match self {
            Phase::Idle => "Standing by",
            Phase::QueryDeconstruction => "Fetching and deconstructing the request",
            Phase::KnowledgeBaseQuerying => "Querying the knowledge base",
            Phase::SearchVectorGeneration => "Generating search vectors",
            Phase::ParallelizedDataMining => "Mining information sources",
            Phase::InformationSynthesis => "Synthesizing gathered information",
            Phase::IterativeReasoning => "Iterative reasoning and refinement",
            Phase::SolutionEngineering => "Engineering the final solution",
            Phase::FinalReportGeneration => "Generating the strategic report",
            Phase::Retrying => "Attempt failed, retrying",
            Phase::Complete => "Operation completed successfully",
        }
    }

    /// Position in [`PHASE_ORDER`], `None` for `Idle` and `Retrying`.
    pub fn order_index(&self) -> Option<usize> {
        PHASE_ORDER.iter().position(|p| p == self)
    }

    /// Progress percentage derived from the phase position.
    pub fn progress(&self) -> u8 {
        match self {
            Phase::Complete => 100,
            _ => match self.order_index() {
                Some(index) => {
                    let step = ((index + 1) * 85) / PHASE_ORDER.len();
                    (5 + step) as u8
                }
                None => 0,
            },
        }
    }

    /// Resolve a phase label as emitted by the model.
    ///
    /// Labels are trimmed, uppercased and have spaces/hyphens folded into
    /// underscores before matching. Labels outside the vocabulary go
    /// through [`remap_label`]. `IDLE` and `RETRYING` are reserved for the
    /// host and never accepted from the wire.
    pub fn from_wire(label: &str) -> Option<Phase> {
        let normalized = normalize_label(label);
        if normalized == Phase::Complete.as_str() {
            return Some(Phase::Complete);
        }
        WIRE_PHASES
            .iter()
            .copied()
            .find(|p| p.as_str() == normalized)
            .or_else(|| remap_label(&normalized))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uppercase a phase label and fold separators into underscores.
pub fn normalize_label(label: &str) -> String {
    label
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '*')
        .chars()
        .map(|c| match c {
            ' ' | '-' | '.' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

/// Known off-contract phase labels observed in model output.
fn remap_label(normalized: &str) -> Option<Phase> {
    let phase = match normalized {
        "DECONSTRUCTION" | "QUERY_ANALYSIS" | "QUERY_DECOMPOSITION" | "REQUEST_DECONSTRUCTION" => {
            Phase::QueryDeconstruction
        }
        "KNOWLEDGE_BASE" | "KNOWLEDGE_BASE_QUERY" | "KB_QUERYING" | "KB_QUERY" | "KNOWLEDGE_QUERYING" => {
            Phase::KnowledgeBaseQuerying
        }
        "VECTOR_GENERATION" | "SEARCH_VECTORS" | "SEARCH_VECTOR_ENGINEERING" | "VECTOR_ENGINEERING" => {
            Phase::SearchVectorGeneration
        }
        "DATA_MINING" | "PARALLEL_DATA_MINING" | "PARALLELIZED_SEARCH" | "WEB_SEARCH" | "RESEARCH" => {
            Phase::ParallelizedDataMining
        }
        "SYNTHESIS" | "INFORMATION_SYNTHESIZING" | "RESEARCH_AND_SYNTHESIS" | "DATA_SYNTHESIS" => {
            Phase::InformationSynthesis
        }
        "REASONING" | "ITERATIVE_REASONING_CYCLE" | "REASONING_CYCLE" | "CRITICAL_REASONING" => {
            Phase::IterativeReasoning
        }
        "ENGINEERING" | "SOLUTION_DESIGN" | "SOLUTION_ENGINEER" => Phase::SolutionEngineering,
        "REPORT_GENERATION" | "FINAL_REPORT" | "REPORT" | "FINAL_REPORT_GENERATED" => {
            Phase::FinalReportGeneration
        }
        "COMPLETED" | "DONE" | "FINISHED" => Phase::Complete,
        _ => return None,
    };
    Some(phase)
}
