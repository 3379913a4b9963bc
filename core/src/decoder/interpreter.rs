//! Event interpreter
//!
//! Folds decoded events into an [`OperationStatus`]. Pure state transitions,
//! no I/O.

use serde_json::Value;
use tracing::{debug, warn};

use super::repair::first_json_value;
use super::RunContext;
use crate::protocol::{AgentEvent, OperationStatus, Phase, ReasoningCycle, Source, StrategicBriefing, VectorStatus};

/// Relevance assigned to sources reported during the run.
const FOUND_SOURCE_RELEVANCE: f32 = 8.0;

pub struct StatusReducer {
    status: OperationStatus,
    context: RunContext,
    briefing: Option<StrategicBriefing>,
    unknown_phases: usize,
    rejected_reports: usize,
}

impl StatusReducer {
    pub fn new(context: RunContext) -> Self {
        Self {
            status: OperationStatus::initial(),
            context,
            briefing: None,
            unknown_phases: 0,
            rejected_reports: 0,
        }
    }

    pub fn status(&self) -> &OperationStatus {
        &self.status
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn unknown_phases(&self) -> usize {
        self.unknown_phases
    }

    pub fn rejected_reports(&self) -> usize {
        self.rejected_reports
    }

    pub fn take_briefing(&mut self) -> Option<StrategicBriefing> {
        self.briefing.take()
    }

    /// Apply one event. Returns whether the status changed.
    pub fn apply(&mut self, event: AgentEvent) -> bool {
        match event {
            AgentEvent::PhaseUpdate { phase } => self.apply_phase_label(&phase),
            AgentEvent::LogUpdate { message } => {
                self.status.operations_log.push(message);
                true
            }
            AgentEvent::SearchVectorsGenerated { vectors } => {
                self.status.search_vectors = vectors
                    .into_iter()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(|v| (v, VectorStatus::Pending))
                    .collect();
                true
            }
            AgentEvent::SourceFound { url, title, summary } => self.add_source(url, title, summary),
            AgentEvent::ReasoningCycleUpdate { current, total } => {
                let total = total
                    .filter(|t| *t > 0)
                    .unwrap_or_else(|| self.context.level.reasoning_cycles());
                self.status.reasoning_cycle = Some(ReasoningCycle { current, total });
                true
            }
            AgentEvent::FinalReportGenerated { briefing } => self.capture_report(briefing),
        }
    }

    /// Resolve a phase label and move the status to it.
    ///
    /// Unknown labels are logged and leave the phase unchanged. Moves back
    /// to an earlier phase are ignored.
    pub fn apply_phase_label(&mut self, label: &str) -> bool {
        let Some(phase) = Phase::from_wire(label) else {
            self.unknown_phases += 1;
            warn!("Unknown phase label from model: {}", label);
            self.status
                .operations_log
                .push(format!("Unknown phase entered: {}", label.trim()));
            return true;
        };

        if phase == Phase::Complete {
            if self.status.phase == Phase::Complete {
                return false;
            }
            self.mark_complete();
            return true;
        }

        let current = self.status.phase.order_index();
        let next = phase.order_index();
        if next <= current {
            debug!("Ignoring phase move {} -> {}", self.status.phase, phase);
            return false;
        }

        self.status.phase = phase;
        self.status.message = phase.description().to_string();
        self.status.progress = self.status.progress.max(phase.progress());
        true
    }

    /// Record a source unless its URL was already seen.
    ///
    /// Each new source flips the oldest pending search vector to active.
    pub fn add_source(&mut self, url: String, title: String, summary: String) -> bool {
        let url = url.trim().to_string();
        if url.is_empty() || self.status.has_source(&url) {
            return false;
        }
        self.status.live_search_results.push(Source {
            url,
            title,
            summary,
            relevance_score: FOUND_SOURCE_RELEVANCE,
            is_verified: Some(true),
            feedback: None,
        });
        self.status.activate_next_vector();
        true
    }

    /// Append a single search vector as pending if it is new.
    pub fn add_search_vector(&mut self, vector: &str) -> bool {
        let vector = vector.trim();
        if vector.is_empty() || self.status.search_vectors.contains_key(vector) {
            return false;
        }
        self.status
            .search_vectors
            .insert(vector.to_string(), VectorStatus::Pending);
        true
    }

    /// Replace the whole operations log.
    pub fn replace_log(&mut self, lines: Vec<String>) -> bool {
        if self.status.operations_log == lines {
            return false;
        }
        self.status.operations_log = lines;
        true
    }

    pub fn mark_complete(&mut self) {
        self.status.phase = Phase::Complete;
        self.status.message = Phase::Complete.description().to_string();
        self.status.progress = 100;
        self.status.complete_all_vectors();
    }

    fn capture_report(&mut self, briefing: Value) -> bool {
        // Some models send the report as a JSON string.
        let briefing = match briefing {
            Value::String(text) => first_json_value(&text).unwrap_or(Value::String(text)),
            other => other,
        };
        if !briefing.is_object() {
            self.rejected_reports += 1;
            warn!("Final report payload is not an object, ignoring it");
            return false;
        }

        match StrategicBriefing::from_model_value(
            briefing,
            &self.context.query,
            self.context.level,
            "briefing",
        ) {
            Ok(report) => {
                self.briefing = Some(report);
                self.mark_complete();
                true
            }
            Err(e) => {
                self.rejected_reports += 1;
                warn!("Final report does not match the briefing shape: {}", e);
                false
            }
        }
    }
}
