//! Streaming response decoder
//!
//! Raw text chunks go through the [`framer`], each packet through the
//! [`sanitizer`] and into the [`interpreter`]; at stream end the
//! [`assembler`] produces the briefing. [`legacy`] handles the older
//! tag-based output format behind the same [`StreamDecoder`] trait.

pub mod assembler;
pub mod framer;
pub mod interpreter;
pub mod legacy;
pub mod repair;
pub mod sanitizer;

pub use framer::DelimiterFramer;
pub use interpreter::StatusReducer;
pub use legacy::LegacyTagDecoder;
pub use sanitizer::parse_event;

use serde::Serialize;
use tracing::debug;

use crate::config::WireProtocol;
use crate::error::RahyabError;
use crate::protocol::{OperationStatus, SearchLevel, StrategicBriefing};

/// Per-run facts the decoder stamps onto the briefing.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub query: String,
    pub level: SearchLevel,
}

impl RunContext {
    pub fn new(query: impl Into<String>, level: SearchLevel) -> Self {
        Self {
            query: query.into(),
            level,
        }
    }
}

/// Counters for everything the decoder absorbed instead of failing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecodeDiagnostics {
    pub packets_decoded: usize,
    pub packets_dropped: usize,
    pub fragments_discarded: usize,
    pub markers_repaired: usize,
    pub unknown_phases: usize,
    pub reports_rejected: usize,
}

/// Outcome of a successfully finished stream.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Status changes produced while flushing, in order.
    pub statuses: Vec<OperationStatus>,
    pub briefing: StrategicBriefing,
}

/// Incremental decoder for one attempt.
pub trait StreamDecoder: Send {
    /// Consume one chunk. Returns a snapshot for every status change it caused.
    fn feed(&mut self, chunk: &str) -> Vec<OperationStatus>;

    /// Flush at stream end and produce the final briefing.
    fn finish(&mut self) -> Result<Completion, RahyabError>;

    /// Latest status.
    fn status(&self) -> &OperationStatus;

    fn diagnostics(&self) -> DecodeDiagnostics;
}

/// Decoder for the delimited JSON event protocol.
pub struct EventDecoder {
    framer: DelimiterFramer,
    reducer: StatusReducer,
    packets_decoded: usize,
    packets_dropped: usize,
}

impl EventDecoder {
    pub fn new(context: RunContext) -> Self {
        Self {
            framer: DelimiterFramer::new(),
            reducer: StatusReducer::new(context),
            packets_decoded: 0,
            packets_dropped: 0,
        }
    }

    fn handle_packet(&mut self, raw: &str, statuses: &mut Vec<OperationStatus>) {
        match parse_event(raw) {
            Some(event) => {
                self.packets_decoded += 1;
                debug!("Decoded {} event", event.name());
                if self.reducer.apply(event) {
                    statuses.push(self.reducer.status().clone());
                }
            }
            None => self.packets_dropped += 1,
        }
    }
}

impl StreamDecoder for EventDecoder {
    fn feed(&mut self, chunk: &str) -> Vec<OperationStatus> {
        let mut statuses = Vec::new();
        for raw in self.framer.feed(chunk) {
            self.handle_packet(&raw, &mut statuses);
        }
        statuses
    }

    fn finish(&mut self) -> Result<Completion, RahyabError> {
        let mut statuses = Vec::new();
        let (packets, leftover) = self.framer.finish();
        for raw in packets {
            self.handle_packet(&raw, &mut statuses);
        }

        let captured = self.reducer.take_briefing();
        let recovered = captured.is_none();
        let briefing = assembler::assemble(captured, &leftover, self.reducer.context())?;
        if recovered {
            self.reducer.mark_complete();
            statuses.push(self.reducer.status().clone());
        }
        Ok(Completion { statuses, briefing })
    }

    fn status(&self) -> &OperationStatus {
        self.reducer.status()
    }

    fn diagnostics(&self) -> DecodeDiagnostics {
        DecodeDiagnostics {
            packets_decoded: self.packets_decoded,
            packets_dropped: self.packets_dropped,
            fragments_discarded: self.framer.fragments_discarded(),
            markers_repaired: self.framer.markers_repaired(),
            unknown_phases: self.reducer.unknown_phases(),
            reports_rejected: self.reducer.rejected_reports(),
        }
    }
}

/// Build the decoder for the configured wire protocol.
pub fn decoder_for(protocol: WireProtocol, context: RunContext) -> Box<dyn StreamDecoder> {
    match protocol {
        WireProtocol::Events => Box::new(EventDecoder::new(context)),
        WireProtocol::LegacyTags => Box::new(LegacyTagDecoder::new(context)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AgentEvent, Phase, END_MARKER, START_MARKER};

    fn decoder() -> EventDecoder {
        EventDecoder::new(RunContext::new("q", SearchLevel::Level2))
    }

    #[test]
    fn test_scenario_two_chunks() {
        let mut d = decoder();
        let mut statuses = d.feed(&format!(
            r#"{}{{"event":"phase_update","data":{{"phase":"QUERY_DECONSTRUCTION"}}}}{}"#,
            START_MARKER, END_MARKER
        ));
        statuses.extend(d.feed(&format!(
            r#"{}{{"event":"final_report_generated","data":{{"briefing":{{"executiveSummary":"ok"}}}}}}{}"#,
            START_MARKER, END_MARKER
        )));
        let completion = d.finish().unwrap();
        statuses.extend(completion.statuses);

        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].phase, Phase::QueryDeconstruction);
        assert_eq!(statuses[1].phase, Phase::Complete);
        assert_eq!(completion.briefing.executive_summary, "ok");
        assert!(completion.briefing.engineered_solution.steps.is_empty());
        assert!(completion.briefing.evidence_dossier.sources.is_empty());
    }

    #[test]
    fn test_off_contract_report_fields_do_not_reject_report() {
        let mut d = decoder();
        d.feed(&format!(
            r#"{}{{"event":"final_report_generated","data":{{"briefing":{{"executiveSummary":"ok","evidenceDossier":{{"title":"E","sources":[{{"title":"no url"}},{{"url":"https://a.example","relevanceScore":"6"}}]}},"visualData":{{"nodes":[{{"id":"n","label":"L","type":"hardware"}}],"edges":[]}}}}}}}}{}"#,
            START_MARKER, END_MARKER
        ));
        let completion = d.finish().unwrap();
        assert_eq!(completion.briefing.executive_summary, "ok");
        assert_eq!(completion.briefing.evidence_dossier.sources.len(), 1);
        assert_eq!(completion.briefing.evidence_dossier.sources[0].relevance_score, 6.0);
        assert!(completion.briefing.visual_data.is_some());
        assert!(!completion.briefing.is_recovered());
        assert_eq!(d.diagnostics().reports_rejected, 0);
    }

    #[test]
    fn test_dropped_packets_are_counted() {
        let mut d = decoder();
        d.feed(&format!("{}not json at all{}", START_MARKER, END_MARKER));
        d.feed(&AgentEvent::LogUpdate { message: "x".to_string() }.to_packet());
        let diagnostics = d.diagnostics();
        assert_eq!(diagnostics.packets_dropped, 1);
        assert_eq!(diagnostics.packets_decoded, 1);
    }

    #[test]
    fn test_truncated_final_packet_is_recovered_at_finish() {
        let mut d = decoder();
        d.feed(&format!(
            r#"{}{{"event":"final_report_generated","data":{{"briefing":{{"executiveSummary":"partial","redTeamAnalysis":{{"potentialFailures":["a""#,
            START_MARKER
        ));
        let completion = d.finish().unwrap();
        assert!(completion.briefing.is_recovered());
        assert_eq!(completion.statuses.last().unwrap().phase, Phase::Complete);
    }

    #[test]
    fn test_stream_without_report_fails() {
        let mut d = decoder();
        d.feed(&AgentEvent::LogUpdate { message: "x".to_string() }.to_packet());
        assert_eq!(d.finish().err(), Some(RahyabError::ReportMissing));
    }
}
