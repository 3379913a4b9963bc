//! Event sanitizer
//!
//! Turns one raw packet body into a typed [`AgentEvent`], repairing the JSON
//! when needed. Never panics; anything that cannot be turned into a valid
//! event is dropped with a warning.

use serde_json::Value;
use tracing::{debug, warn};

use super::repair::{
    close_open_structures, first_json_value, strip_code_fences, structural_repair,
    trim_to_last_separator,
};
use crate::protocol::AgentEvent;

/// How many times truncation repair may back off to an earlier separator.
const MAX_BACKOFF: usize = 8;

/// Field names models use instead of `vectors`.
const VECTOR_ALIASES: [&str; 3] = ["queries", "search_vectors", "searchVectors"];

/// Parse a raw packet into an event, repairing it if necessary.
pub fn parse_event(raw: &str) -> Option<AgentEvent> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return None;
    }

    if let Some(event) = decode(body) {
        return Some(event);
    }

    let structural = structural_repair(body);
    if let Some(event) = decode(&structural) {
        debug!("Packet recovered by structural repair");
        return Some(event);
    }

    let mut candidate = structural;
    for _ in 0..=MAX_BACKOFF {
        let closed = structural_repair(&close_open_structures(&candidate));
        if let Some(event) = decode(&closed) {
            debug!("Packet recovered by truncation repair");
            return Some(event);
        }
        match trim_to_last_separator(&candidate) {
            Some(shorter) => candidate = shorter,
            None => break,
        }
    }

    warn!("Dropping malformed event packet: {}", preview(raw));
    None
}

fn decode(text: &str) -> Option<AgentEvent> {
    let mut value = first_json_value(text)?;
    adapt_field_names(&mut value);
    serde_json::from_value(value).ok()
}

/// Rename known aliases of event fields to their canonical names.
fn adapt_field_names(value: &mut Value) {
    if value.get("event").and_then(Value::as_str) != Some("search_vectors_generated") {
        return;
    }
    let Some(data) = value.get_mut("data").and_then(Value::as_object_mut) else {
        return;
    };
    if data.contains_key("vectors") {
        return;
    }
    for alias in VECTOR_ALIASES {
        if let Some(vectors) = data.remove(alias) {
            data.insert("vectors".to_string(), vectors);
            return;
        }
    }
}

fn preview(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(120) {
        Some((i, _)) => format!("{}...", &trimmed[..i]),
        None => trimmed.to_string(),
    }
}
