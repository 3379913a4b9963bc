//! Operation status snapshots

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::briefing::Source;
use super::phase::Phase;

/// State of one search vector. Variants are ordered; a vector only ever
/// moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStatus {
    Pending,
    Active,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningCycle {
    pub current: u32,
    pub total: u32,
}

/// Snapshot of a running analysis, rebuilt fresh for every attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    pub phase: Phase,
    pub message: String,
    /// 0 to 100
    pub progress: u8,
    pub operations_log: Vec<String>,
    pub search_vectors: IndexMap<String, VectorStatus>,
    pub live_search_results: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_cycle: Option<ReasoningCycle>,
}

impl Default for OperationStatus {
    fn default() -> Self {
        Self::initial()
    }
}

impl OperationStatus {
    pub fn initial() -> Self {
        Self {
            phase: Phase::Idle,
            message: "Initializing analysis engine...".to_string(),
            progress: 2,
            operations_log: vec!["Initializing the analysis engine".to_string()],
            search_vectors: IndexMap::new(),
            live_search_results: Vec::new(),
            reasoning_cycle: None,
        }
    }

    /// Status published between attempts. `failed_attempt` is 1-based.
    pub fn retrying(failed_attempt: u32, total_attempts: u32, error: &str) -> Self {
        Self {
            phase: Phase::Retrying,
            message: format!(
                "Attempt {} failed. Retrying ({}/{})...",
                failed_attempt,
                failed_attempt + 1,
                total_attempts
            ),
            progress: 0,
            operations_log: vec![
                format!("**Attempt {} failed:** {}", failed_attempt, error),
                format!("**Retry ({}/{})...**", failed_attempt + 1, total_attempts),
            ],
            search_vectors: IndexMap::new(),
            live_search_results: Vec::new(),
            reasoning_cycle: None,
        }
    }

    /// Move a vector to `next` if that is a forward transition.
    ///
    /// Returns false when the vector is unknown or already at or past `next`.
    pub fn advance_vector(&mut self, vector: &str, next: VectorStatus) -> bool {
        match self.search_vectors.get_mut(vector) {
            Some(current) if *current < next => {
                *current = next;
                true
            }
            _ => false,
        }
    }

    /// Flip the oldest pending vector to active.
    pub fn activate_next_vector(&mut self) -> bool {
        let next = self
            .search_vectors
            .iter()
            .find(|(_, status)| **status == VectorStatus::Pending)
            .map(|(name, _)| name.clone());
        match next {
            Some(name) => self.advance_vector(&name, VectorStatus::Active),
            None => false,
        }
    }

    pub fn complete_all_vectors(&mut self) {
        for status in self.search_vectors.values_mut() {
            *status = VectorStatus::Complete;
        }
    }

    pub fn has_source(&self, url: &str) -> bool {
        self.live_search_results.iter().any(|s| s.url == url)
    }
}
