//! Final-report assembler
//!
//! Produces the briefing at stream end, salvaging it from leftover text when
//! the final packet never closed.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use super::repair::{
    balance_braces_naive, close_odd_quote_naive, close_open_structures, first_json_value,
    outermost_object, strip_code_fences, structural_repair, trim_to_last_separator,
};
use super::RunContext;
use crate::error::RahyabError;
use crate::protocol::{StrategicBriefing, END_MARKER};

/// How many times salvage may back off to an earlier separator.
const MAX_BACKOFF: usize = 12;

const FINAL_REPORT_EVENT: &str = "final_report_generated";

lazy_static! {
    static ref BRIEFING_START: Regex = Regex::new(r#""briefing"\s*:\s*\{"#).expect("valid regex");
}

/// End marker spellings a truncated stream may stop inside.
const END_MARKER_SPELLINGS: [&str; 5] = [
    END_MARKER,
    "<<<EVENT_END>>>",
    "<<<END EVENT>>>",
    "<<END_EVENT>>>",
    "<<END_EVENT>>",
];

/// Choose the final briefing for a finished stream.
///
/// A report captured from a complete packet wins. Otherwise the leftover text
/// is searched for an unterminated final-report packet and its `briefing`
/// object is repaired; a salvaged report must have a non-empty executive
/// summary and gets a `recovered-` id.
pub fn assemble(
    captured: Option<StrategicBriefing>,
    leftover: &str,
    ctx: &RunContext,
) -> Result<StrategicBriefing, RahyabError> {
    if let Some(briefing) = captured {
        return Ok(briefing);
    }

    if !leftover.contains(FINAL_REPORT_EVENT) {
        return Err(RahyabError::ReportMissing);
    }

    let Some(value) = salvage_briefing(leftover) else {
        warn!("Leftover final report could not be repaired");
        return Err(RahyabError::ReportMissing);
    };

    let summary_present = value
        .get("executiveSummary")
        .and_then(Value::as_str)
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false);
    if !summary_present {
        warn!("Recovered final report has no executive summary");
        return Err(RahyabError::ReportMissing);
    }

    let briefing = StrategicBriefing::from_model_value(value, &ctx.query, ctx.level, "recovered")
        .map_err(|e| {
            warn!("Recovered final report has the wrong shape: {}", e);
            RahyabError::ReportMissing
        })?;
    info!("Recovered truncated final report");
    Ok(briefing)
}

/// Locate and repair the `briefing` object inside a truncated packet.
pub fn salvage_briefing(leftover: &str) -> Option<Value> {
    let start = BRIEFING_START.find(leftover)?;
    // Keep the opening brace the regex matched.
    let payload = &leftover[start.end() - 1..];
    let mut candidate = strip_partial_end_marker(payload).to_string();
    for _ in 0..=MAX_BACKOFF {
        let repaired = balance_braces_naive(&close_odd_quote_naive(&candidate));
        if let Some(value) = first_json_value(&repaired).filter(Value::is_object) {
            return Some(value);
        }
        candidate = trim_to_last_separator(&candidate)?;
    }
    None
}

/// Drop a tail that is an end marker, or the first two or more bytes of one.
fn strip_partial_end_marker(payload: &str) -> &str {
    let trimmed = payload.trim_end();
    let upper = trimmed.to_ascii_uppercase();
    let cut = END_MARKER_SPELLINGS
        .iter()
        .flat_map(|marker| (2..=marker.len()).map(move |len| &marker[..len]))
        .filter(|prefix| upper.ends_with(prefix))
        .map(str::len)
        .max();
    match cut {
        Some(len) => trimmed[..trimmed.len() - len].trim_end(),
        None => trimmed,
    }
}

/// Build a briefing from a bare JSON report, possibly fenced or surrounded by
/// prose.
pub fn assemble_plain(text: &str, ctx: &RunContext) -> Result<StrategicBriefing, RahyabError> {
    let body = strip_code_fences(text);
    let object = outermost_object(body).ok_or(RahyabError::ReportMissing)?;
    let value = parse_lenient(object).ok_or_else(|| {
        warn!("Plain final report could not be parsed");
        RahyabError::ReportMissing
    })?;

    StrategicBriefing::from_model_value(value, &ctx.query, ctx.level, "briefing").map_err(|e| {
        warn!("Plain final report has the wrong shape: {}", e);
        RahyabError::ReportMissing
    })
}

fn parse_lenient(text: &str) -> Option<Value> {
    let parsed = first_json_value(text)
        .or_else(|| first_json_value(&structural_repair(text)))
        .filter(Value::is_object);
    if parsed.is_some() {
        return parsed;
    }

    let mut candidate = structural_repair(text);
    for _ in 0..=MAX_BACKOFF {
        let closed = structural_repair(&close_open_structures(&candidate));
        if let Some(value) = first_json_value(&closed).filter(Value::is_object) {
            return Some(value);
        }
        candidate = trim_to_last_separator(&candidate)?;
    }
    None
}
