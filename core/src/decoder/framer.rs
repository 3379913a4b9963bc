//! Delimiter framer
//!
//! Cuts an unaligned text stream into raw packet bodies delimited by
//! [`START_MARKER`] and [`END_MARKER`].

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::protocol::{END_MARKER, START_MARKER};

lazy_static! {
    static ref END_VARIANT: Regex =
        Regex::new(r"(?i)<{2,3}\s*(?:END[_ ]?EVENT|EVENT[_ ]?END)\s*>{2,3}").expect("valid regex");
    static ref START_VARIANT: Regex = Regex::new(r"(?i)<{2,3}\s*EVENT\s*>{2,3}").expect("valid regex");
}

/// Incremental packet framer.
///
/// After every [`feed`](Self::feed) the buffer holds only text that has not
/// yet been closed by an end marker.
#[derive(Debug, Default)]
pub struct DelimiterFramer {
    buffer: String,
    fragments_discarded: usize,
    markers_repaired: usize,
}

impl DelimiterFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every packet it completed, in order.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        self.normalize_markers(false);
        self.drain_packets()
    }

    /// Flush the stream.
    ///
    /// Marker variants at the very end are now final and get normalized,
    /// which may complete one last packet. Returns those packets and the
    /// leftover text; an unterminated packet is only ever part of the
    /// leftover.
    pub fn finish(&mut self) -> (Vec<String>, String) {
        self.normalize_markers(true);
        let packets = self.drain_packets();
        (packets, std::mem::take(&mut self.buffer))
    }

    pub fn fragments_discarded(&self) -> usize {
        self.fragments_discarded
    }

    pub fn markers_repaired(&self) -> usize {
        self.markers_repaired
    }

    fn drain_packets(&mut self) -> Vec<String> {
        let mut packets = Vec::new();
        while let Some(pos) = self.buffer.find(END_MARKER) {
            let candidate = self.buffer[..pos].to_string();
            self.buffer.drain(..pos + END_MARKER.len());
            self.split_candidate(&candidate, &mut packets);
        }
        packets
    }

    fn split_candidate(&mut self, candidate: &str, packets: &mut Vec<String>) {
        let mut pieces = candidate.split(START_MARKER);
        let prefix = pieces.next().unwrap_or_default();

        if !candidate.contains(START_MARKER) {
            if !candidate.trim().is_empty() {
                self.fragments_discarded += 1;
                warn!("Discarding fragment without start marker: {:?}", preview(candidate));
            }
            return;
        }

        if !prefix.trim().is_empty() {
            self.fragments_discarded += 1;
            warn!("Discarding text before start marker: {:?}", preview(prefix));
        }

        for piece in pieces {
            let body = piece.trim();
            if !body.is_empty() {
                debug!("Framed packet of {} bytes", body.len());
                packets.push(body.to_string());
            }
        }
    }

    fn normalize_markers(&mut self, at_end: bool) {
        for (pattern, canonical) in [(&*END_VARIANT, END_MARKER), (&*START_VARIANT, START_MARKER)] {
            if let Some((text, count)) = rewrite_variants(&self.buffer, pattern, canonical, at_end) {
                debug!("Normalized {} corrupted marker(s) to {}", count, canonical);
                self.markers_repaired += count;
                self.buffer = text;
            }
        }
    }
}

/// Replace every non-canonical match of `pattern` with `canonical`.
///
/// A match touching the end of the text may still be growing and is left
/// alone unless `at_end` is set.
fn rewrite_variants(
    text: &str,
    pattern: &Regex,
    canonical: &str,
    at_end: bool,
) -> Option<(String, usize)> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut count = 0;

    for m in pattern.find_iter(text) {
        if m.as_str() == canonical || (!at_end && m.end() == text.len()) {
            continue;
        }
        out.push_str(&text[last..m.start()]);
        out.push_str(canonical);
        last = m.end();
        count += 1;
    }

    if count == 0 {
        return None;
    }
    out.push_str(&text[last..]);
    Some((out, count))
}

fn preview(text: &str) -> String {
    text.trim().chars().take(80).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(body: &str) -> String {
        format!("{}{}{}", START_MARKER, body, END_MARKER)
    }

    fn stream() -> (String, Vec<String>) {
        let bodies = vec![
            r#"{"event":"phase_update","data":{"phase":"QUERY_DECONSTRUCTION"}}"#.to_string(),
            r#"{"event":"log_update","data":{"message":"a < b >> c"}}"#.to_string(),
            r#"{"event":"final_report_generated","data":{"briefing":{"executiveSummary":"ok"}}}"#
                .to_string(),
        ];
        let text = format!(
            "{}\n\n{}\n{}",
            packet(&bodies[0]),
            packet(&bodies[1]),
            packet(&bodies[2])
        );
        (text, bodies)
    }

    #[test]
    fn test_every_two_way_split_yields_all_packets() {
        let (text, bodies) = stream();
        for (split, _) in text.char_indices() {
            let mut framer = DelimiterFramer::new();
            let mut packets = framer.feed(&text[..split]);
            packets.extend(framer.feed(&text[split..]));
            let (rest, leftover) = framer.finish();
            packets.extend(rest);
            assert_eq!(packets, bodies, "split at {}", split);
            assert!(leftover.trim().is_empty());
            assert_eq!(framer.fragments_discarded(), 0);
        }
    }

    #[test]
    fn test_char_by_char_feed() {
        let (text, bodies) = stream();
        let mut framer = DelimiterFramer::new();
        let mut packets = Vec::new();
        for ch in text.chars() {
            packets.extend(framer.feed(&ch.to_string()));
        }
        assert_eq!(packets, bodies);
        assert_eq!(framer.markers_repaired(), 0);
    }

    #[test]
    fn test_back_to_back_start_markers_share_one_end() {
        let mut framer = DelimiterFramer::new();
        let text = format!("{}{{\"a\":1}}{}{{\"b\":2}}{}", START_MARKER, START_MARKER, END_MARKER);
        let packets = framer.feed(&text);
        assert_eq!(packets, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_corrupted_end_markers_are_normalized() {
        for end in ["<<END_EVENT>>>", "<<<END_EVENT>>", "<<<EVENT_END>>>", "<<<END EVENT>>>", "<<end_event>>"] {
            let mut framer = DelimiterFramer::new();
            let mut packets = framer.feed(&format!("{}{{\"a\":1}}{}\n", START_MARKER, end));
            packets.extend(framer.finish().0);
            assert_eq!(packets, vec!["{\"a\":1}"], "variant {}", end);
            assert_eq!(framer.markers_repaired(), 1);
        }
    }

    #[test]
    fn test_corrupted_marker_at_tail_waits_for_more_input() {
        let mut framer = DelimiterFramer::new();
        assert!(framer.feed(&format!("{}{{\"a\":1}}<<<END_EVENT>>", START_MARKER)).is_empty());
        let packets = framer.feed(">");
        assert_eq!(packets, vec!["{\"a\":1}"]);
        assert_eq!(framer.markers_repaired(), 0);
        assert_eq!(framer.finish(), (Vec::new(), String::new()));
    }

    #[test]
    fn test_corrupted_marker_at_stream_end_is_flushed() {
        let mut framer = DelimiterFramer::new();
        assert!(framer.feed(&format!("{}{{\"a\":1}}<<END_EVENT>>", START_MARKER)).is_empty());
        let (packets, leftover) = framer.finish();
        assert_eq!(packets, vec!["{\"a\":1}"]);
        assert!(leftover.is_empty());
    }

    #[test]
    fn test_corrupted_start_marker_is_normalized() {
        let mut framer = DelimiterFramer::new();
        let packets = framer.feed(&format!("<<EVENT>>>{{\"a\":1}}{}", END_MARKER));
        assert_eq!(packets, vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_fragments_without_start_marker_are_discarded() {
        let mut framer = DelimiterFramer::new();
        let text = format!(
            "preamble{}stray{}{}{{\"a\":1}}{}",
            END_MARKER, END_MARKER, START_MARKER, END_MARKER
        );
        let packets = framer.feed(&text);
        assert_eq!(packets, vec!["{\"a\":1}"]);
        assert_eq!(framer.fragments_discarded(), 2);
    }

    #[test]
    fn test_text_before_start_marker_is_discarded() {
        let mut framer = DelimiterFramer::new();
        let packets = framer.feed(&format!("Sure! Here you go: {}{{\"a\":1}}{}", START_MARKER, END_MARKER));
        assert_eq!(packets, vec!["{\"a\":1}"]);
        assert_eq!(framer.fragments_discarded(), 1);
    }

    #[test]
    fn test_partial_packet_is_never_emitted() {
        let mut framer = DelimiterFramer::new();
        let partial = format!("{}{{\"event\":\"final_report_generated\",\"data\":{{", START_MARKER);
        assert!(framer.feed(&partial).is_empty());
        let (packets, leftover) = framer.finish();
        assert!(packets.is_empty());
        assert_eq!(leftover, partial);
    }
}
