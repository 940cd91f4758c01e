//! NDJSON decoder for transport messages
//!
//! Each transport message may carry zero or more records separated by line
//! breaks. Lines that fail to parse are dropped and decoding continues with the
//! next one. A final unterminated segment that isn't valid JSON on its own is
//! carried over and prefixed onto the first line of the next message, so a
//! record split across two frames still decodes.

use muxdeck_protocol::InboundRecord;
use serde_json::Value;
use tracing::debug;

/// Upper bound on a carried partial line.
const MAX_CARRY_BYTES: usize = 1024 * 1024;

/// Per-connection line decoder. Owns the carry buffer for split records.
///
/// `starts` holds the byte offset in `carry` where each held fragment began,
/// so a bad leading fragment can be dropped without losing the ones after it.
#[derive(Debug, Default)]
pub struct LineDecoder {
    carry: String,
    starts: Vec<usize>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when a partial line is waiting for the next message.
    pub fn has_partial(&self) -> bool {
        !self.carry.is_empty()
    }

    /// Decode one raw transport message into records, in original order.
    pub fn decode(&mut self, raw: &str) -> Vec<InboundRecord> {
        let mut records = Vec::new();
        let mut prefix = std::mem::take(&mut self.carry);
        let mut starts = std::mem::take(&mut self.starts);

        let mut segments = raw.split('\n').peekable();
        while let Some(segment) = segments.next() {
            let terminated = segments.peek().is_some();
            let segment = segment.strip_suffix('\r').unwrap_or(segment);

            if prefix.is_empty() {
                if segment.trim().is_empty() {
                    continue;
                }
                match parse_line(segment) {
                    Some(value) => records.push(InboundRecord::from_value(value)),
                    None if terminated => log_dropped(segment),
                    None => self.hold(segment.to_string(), vec![0]),
                }
                continue;
            }

            // Longest candidate first: every held fragment boundary, then the
            // new segment on its own.
            let boundary = prefix.len();
            let joined = format!("{}{}", std::mem::take(&mut prefix), segment);
            starts.push(boundary);
            let parsed = starts
                .iter()
                .find_map(|&at| parse_line(&joined[at..]).map(|value| (at, value)));

            match parsed {
                Some((at, value)) => {
                    if at > 0 {
                        log_dropped(&joined[..at]);
                    }
                    records.push(InboundRecord::from_value(value));
                }
                None if terminated => log_dropped(&joined),
                None => {
                    if segment.is_empty() {
                        starts.pop();
                    }
                    self.hold(joined, std::mem::take(&mut starts));
                }
            }
            starts.clear();
        }

        records
    }

    /// Keep `partial` for the next message, trimming whole leading fragments
    /// until it fits under the carry limit.
    fn hold(&mut self, partial: String, starts: Vec<usize>) {
        let Some(&keep_from) = starts
            .iter()
            .find(|&&at| partial.len() - at <= MAX_CARRY_BYTES)
        else {
            debug!(
                component = "decoder",
                event = "decoder.partial.discarded",
                partial_bytes = partial.len(),
                "Partial line exceeded carry limit"
            );
            return;
        };
        if keep_from > 0 {
            log_dropped(&partial[..keep_from]);
        }
        self.carry = partial[keep_from..].to_string();
        self.starts = starts
            .into_iter()
            .filter(|&at| at >= keep_from)
            .map(|at| at - keep_from)
            .collect();
    }
}

/// Parse a single line as JSON. Empty or malformed lines yield `None`.
pub fn parse_line(line: &str) -> Option<Value> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    serde_json::from_str(line).ok()
}

/// Stateless decode of one self-contained message.
pub fn decode_message(raw: &str) -> Vec<InboundRecord> {
    LineDecoder::new().decode(raw)
}

fn log_dropped(line: &str) {
    let end = (0..=200.min(line.len()))
        .rev()
        .find(|&i| line.is_char_boundary(i))
        .unwrap_or(0);
    debug!(
        component = "decoder",
        event = "decoder.line.dropped",
        line_preview = %&line[..end],
        "Dropped malformed line"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use muxdeck_protocol::inbound::SystemRecord;

    fn kinds(records: &[InboundRecord]) -> Vec<&'static str> {
        records.iter().map(InboundRecord::kind).collect()
    }

    #[test]
    fn empty_and_blank_messages_yield_nothing() {
        assert!(decode_message("").is_empty());
        assert!(decode_message("\n\n  \n").is_empty());
    }

    #[test]
    fn valid_lines_survive_invalid_neighbours_in_order() {
        let raw = concat!(
            "{\"type\":\"keep_alive\"}\n",
            "not json at all\n",
            "{\"type\":\"system\",\"subtype\":\"status\"}\n",
            "{\"type\":\n",
            "\n",
            "{\"type\":\"result\",\"subtype\":\"success\"}\n",
        );
        let records = decode_message(raw);
        assert_eq!(kinds(&records), vec!["keep_alive", "system", "result"]);
        assert_eq!(records[1], InboundRecord::System(SystemRecord::Other));
    }

    #[test]
    fn valid_json_of_unknown_type_is_still_a_record() {
        let records = decode_message("{\"type\":\"mystery\"}\n[1,2]\n\"str\"\n");
        assert_eq!(kinds(&records), vec!["unknown", "unknown", "unknown"]);
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let records = decode_message("{\"type\":\"keep_alive\"}\r\n{\"type\":\"keep_alive\"}\r\n");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn unterminated_complete_record_decodes_immediately() {
        let mut decoder = LineDecoder::new();
        let records = decoder.decode("{\"type\":\"keep_alive\"}");
        assert_eq!(kinds(&records), vec!["keep_alive"]);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn record_split_across_messages_is_reassembled() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.decode("{\"type\":\"keep_alive\"}\n{\"type\":\"sys").len() == 1);
        assert!(decoder.has_partial());
        assert!(decoder.decode("tem\",\"subtype\":").is_empty());
        let records = decoder.decode("\"status\"}\n{\"type\":\"keep_alive\"}\n");
        assert_eq!(kinds(&records), vec!["system", "keep_alive"]);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn stray_fragment_does_not_swallow_next_valid_line() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.decode("garbage{").is_empty());
        assert!(decoder.has_partial());
        let records = decoder.decode("{\"type\":\"keep_alive\"}\n");
        assert_eq!(kinds(&records), vec!["keep_alive"]);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn stray_fragment_does_not_swallow_a_split_record() {
        let mut decoder = LineDecoder::new();
        let line = "{\"type\":\"system\",\"subtype\":\"status\"}\n";
        let (head, tail) = line.split_at(12);

        assert!(decoder.decode("garbage{").is_empty());
        assert!(decoder.decode(head).is_empty());
        assert!(decoder.has_partial());
        let records = decoder.decode(tail);
        assert_eq!(records, vec![InboundRecord::System(SystemRecord::Other)]);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn record_split_three_ways_after_garbage_is_reassembled() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.decode("}}oops").is_empty());
        assert!(decoder.decode("{\"type\":").is_empty());
        assert!(decoder.decode("\"keep_").is_empty());
        let records = decoder.decode("alive\"}\n");
        assert_eq!(kinds(&records), vec!["keep_alive"]);
    }

    #[test]
    fn oversized_carry_keeps_the_newest_fragment() {
        let mut decoder = LineDecoder::new();
        let huge = format!("{{\"x\":\"{}", "a".repeat(MAX_CARRY_BYTES));
        assert!(decoder.decode(&huge).is_empty());
        assert!(!decoder.has_partial());

        assert!(decoder.decode(&"b".repeat(MAX_CARRY_BYTES - 4)).is_empty());
        assert!(decoder.decode("{\"type\":").is_empty());
        let records = decoder.decode("\"keep_alive\"}\n");
        assert_eq!(kinds(&records), vec!["keep_alive"]);
    }

    #[test]
    fn oversized_partial_is_discarded() {
        let mut decoder = LineDecoder::new();
        let huge = format!("{{\"type\":\"{}", "x".repeat(MAX_CARRY_BYTES + 1));
        assert!(decoder.decode(&huge).is_empty());
        assert!(!decoder.has_partial());
    }

    #[test]
    fn decode_never_panics_on_mixed_input() {
        let valid = "{\"type\":\"keep_alive\"}";
        let invalid = ["{", "}", "nul", "{\"a\":}", "\u{1F600}", "[", "tru"];
        for (i, bad) in invalid.iter().copied().enumerate() {
            let mut lines = Vec::new();
            for j in 0..=i {
                lines.push(if j % 2 == 0 { valid } else { bad });
                lines.push(bad);
            }
            let raw = format!("{}\n", lines.join("\n"));
            let expected = lines.iter().filter(|l| **l == valid).count();
            assert_eq!(decode_message(&raw).len(), expected);
        }
    }
}
