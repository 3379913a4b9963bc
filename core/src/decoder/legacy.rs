//! Legacy tag-based decoder
//!
//! Older prompts ask the model to think inside `<thinking>...</thinking>`
//! and mark progress inline with `[PHASE: NAME]`, `[SEARCH_VECTOR: query]`
//! and `<FOUND_SOURCE url="" title="" summary=""/>` tags. The report follows
//! the closing tag as bare JSON.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use super::assembler::assemble_plain;
use super::interpreter::StatusReducer;
use super::{Completion, DecodeDiagnostics, RunContext, StreamDecoder};
use crate::error::RahyabError;
use crate::protocol::OperationStatus;

const THINKING_START: &str = "<thinking>";
const THINKING_END: &str = "</thinking>";

lazy_static! {
    static ref PHASE_TAG: Regex = Regex::new(r"\[PHASE:\s*([A-Za-z_ \-]+?)\s*\]").expect("valid regex");
    static ref SOURCE_TAG: Regex = Regex::new(
        r#"<FOUND_SOURCE\s+url="([^"]*)"\s+title="([^"]*)"\s+summary="([^"]*)"\s*/>"#
    )
    .expect("valid regex");
    static ref VECTOR_TAG: Regex = Regex::new(r"\[SEARCH_VECTOR:\s*([^\]\n]+)\]").expect("valid regex");
}

pub struct LegacyTagDecoder {
    reducer: StatusReducer,
    buffer: String,
    seen_sources: HashSet<String>,
    seen_vectors: HashSet<String>,
    last_phase_label: Option<String>,
    /// Log lines the host adds on top of the thinking text.
    notices: Vec<String>,
}

impl LegacyTagDecoder {
    pub fn new(context: RunContext) -> Self {
        Self {
            reducer: StatusReducer::new(context),
            buffer: String::new(),
            seen_sources: HashSet::new(),
            seen_vectors: HashSet::new(),
            last_phase_label: None,
            notices: Vec::new(),
        }
    }

    /// Text inside the thinking block, and whether the block is closed.
    fn thinking(&self) -> Option<(&str, bool)> {
        let start = self.buffer.find(THINKING_START)? + THINKING_START.len();
        let rest = &self.buffer[start..];
        match rest.find(THINKING_END) {
            Some(end) => Some((&rest[..end], true)),
            None => Some((rest, false)),
        }
    }

    /// Text after the thinking block, or the whole text when the model
    /// skipped it.
    fn report_text(&self) -> Option<&str> {
        match self.buffer.find(THINKING_START) {
            Some(start) => {
                let after = &self.buffer[start..];
                after
                    .find(THINKING_END)
                    .map(|end| &after[end + THINKING_END.len()..])
            }
            None => Some(self.buffer.as_str()),
        }
    }

    fn rescan(&mut self) -> bool {
        let Some((thinking, _)) = self.thinking() else {
            return false;
        };
        let thinking = thinking.to_string();
        let mut changed = false;

        if let Some(caps) = PHASE_TAG.captures_iter(&thinking).last() {
            let label = caps[1].to_string();
            if self.last_phase_label.as_deref() != Some(label.as_str()) {
                let unknown_before = self.reducer.unknown_phases();
                changed |= self.reducer.apply_phase_label(&label);
                if self.reducer.unknown_phases() > unknown_before {
                    self.notices
                        .push(format!("Unknown phase entered: {}", label.trim()));
                }
                self.last_phase_label = Some(label);
            }
        }

        for caps in VECTOR_TAG.captures_iter(&thinking) {
            let vector = caps[1].trim().to_string();
            if !vector.is_empty() && self.seen_vectors.insert(vector.clone()) {
                changed |= self.reducer.add_search_vector(&vector);
            }
        }

        for caps in SOURCE_TAG.captures_iter(&thinking) {
            let url = caps[1].to_string();
            if self.seen_sources.insert(url.clone()) {
                changed |= self
                    .reducer
                    .add_source(url, caps[2].to_string(), caps[3].to_string());
            }
        }

        let mut log = rebuild_log(&thinking);
        log.extend(self.notices.iter().cloned());
        changed |= self.reducer.replace_log(log);
        changed
    }
}

/// Operations log derived from the thinking text with tags removed and
/// phase markers set on their own bold lines.
fn rebuild_log(thinking: &str) -> Vec<String> {
    let without_sources = SOURCE_TAG.replace_all(thinking, "");
    let without_vectors = VECTOR_TAG.replace_all(&without_sources, "");
    let marked = PHASE_TAG.replace_all(&without_vectors, |caps: &regex::Captures| {
        format!("\n**{}**\n", &caps[0])
    });

    marked
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

impl StreamDecoder for LegacyTagDecoder {
    fn feed(&mut self, chunk: &str) -> Vec<OperationStatus> {
        self.buffer.push_str(chunk);
        if self.rescan() {
            vec![self.reducer.status().clone()]
        } else {
            Vec::new()
        }
    }

    fn finish(&mut self) -> Result<Completion, RahyabError> {
        let mut statuses = Vec::new();
        if self.rescan() {
            statuses.push(self.reducer.status().clone());
        }

        let report = self.report_text().ok_or(RahyabError::ReportMissing)?;
        debug!("Legacy report text of {} bytes", report.len());
        let briefing = assemble_plain(report, self.reducer.context())?;

        self.reducer.mark_complete();
        statuses.push(self.reducer.status().clone());
        Ok(Completion { statuses, briefing })
    }

    fn status(&self) -> &OperationStatus {
        self.reducer.status()
    }

    fn diagnostics(&self) -> DecodeDiagnostics {
        DecodeDiagnostics {
            unknown_phases: self.reducer.unknown_phases(),
            ..DecodeDiagnostics::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Phase, SearchLevel, VectorStatus};

    fn decoder() -> LegacyTagDecoder {
        LegacyTagDecoder::new(RunContext::new("q", SearchLevel::Level1))
    }

    #[test]
    fn test_tags_are_applied_once_across_chunks() {
        let mut d = decoder();
        assert!(d.feed("preamble <thin").is_empty());
        d.feed("king>Starting.\n[PHASE: QUERY_DECONSTRUCTION]\n[SEARCH_VECTOR: rust async");
        d.feed("]\n<FOUND_SOURCE url=\"https://a\" title=\"A\" summary=\"S\"/>\n");
        let statuses = d.feed("[PHASE: PARALLELIZED_DATA_MINING] mining\n");

        let status = statuses.last().unwrap();
        assert_eq!(status.phase, Phase::ParallelizedDataMining);
        assert_eq!(status.search_vectors["rust async"], VectorStatus::Active);
        assert_eq!(status.live_search_results.len(), 1);
        assert_eq!(status.live_search_results[0].title, "A");
    }

    #[test]
    fn test_log_is_rebuilt_without_tags() {
        let log = rebuild_log(
            "Thinking.\n[PHASE: INFORMATION_SYNTHESIS] merging\n[SEARCH_VECTOR: x]\n\n<FOUND_SOURCE url=\"u\" title=\"t\" summary=\"s\"/>done",
        );
        assert_eq!(
            log,
            vec![
                "Thinking.",
                "**[PHASE: INFORMATION_SYNTHESIS]**",
                "merging",
                "done"
            ]
        );
    }

    #[test]
    fn test_report_after_thinking_block() {
        let mut d = decoder();
        d.feed("<thinking>[PHASE: SOLUTION_ENGINEERING]</thinking>\n```json\n");
        d.feed("{\"executiveSummary\": \"legacy ok\"}\n```");
        let completion = d.finish().unwrap();
        assert_eq!(completion.briefing.executive_summary, "legacy ok");
        assert_eq!(completion.statuses.last().unwrap().phase, Phase::Complete);
        assert_eq!(completion.statuses.last().unwrap().progress, 100);
    }

    #[test]
    fn test_unclosed_thinking_has_no_report() {
        let mut d = decoder();
        d.feed("<thinking>[PHASE: QUERY_DECONSTRUCTION] still going");
        assert_eq!(d.finish().err(), Some(RahyabError::ReportMissing));
    }

    #[test]
    fn test_unknown_phase_tag_is_counted() {
        let mut d = decoder();
        d.feed("<thinking>[PHASE: DAYDREAMING]\n");
        assert_eq!(d.diagnostics().unknown_phases, 1);
        assert_eq!(d.status().phase, Phase::Idle);

        d.feed("still thinking\n");
        assert_eq!(
            d.status().operations_log.last().map(String::as_str),
            Some("Unknown phase entered: DAYDREAMING")
        );
    }
}
