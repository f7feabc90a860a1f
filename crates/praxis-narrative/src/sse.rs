//! Incremental decoding of the narrative event stream.
//!
//! Bytes arrive in arbitrary slices; events are separated by a blank line.
//! The decoder buffers raw bytes (so a multi-byte character split across
//! two reads is reassembled) and yields one [`NarrativeEvent`] per complete
//! block. Malformed blocks are logged and skipped.

use tracing::warn;

use crate::error::NarrativeError;
use crate::events::{self, NarrativeEvent};

const DELIMITER: &[u8] = b"\n\n";

#[derive(Debug, Default)]
pub struct EventDecoder {
    buffer: Vec<u8>,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every event completed by them, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<NarrativeEvent> {
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = find(&self.buffer, DELIMITER) {
            let block: Vec<u8> = self.buffer.drain(..end + DELIMITER.len()).collect();
            if let Some(event) = decode_block(&block[..end]) {
                events.push(event);
            }
        }
        events
    }

    /// Give leftover bytes one final parse attempt. Handles a last event
    /// that was not followed by the delimiter.
    pub fn finish(&mut self) -> Option<NarrativeEvent> {
        let rest = std::mem::take(&mut self.buffer);
        decode_block(&rest)
    }

    pub fn has_pending(&self) -> bool {
        self.buffer.iter().any(|b| !b.is_ascii_whitespace())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn decode_block(block: &[u8]) -> Option<NarrativeEvent> {
    match parse_block(block) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "skipping malformed stream event");
            None
        }
    }
}

/// `Ok(None)` for blocks with no `data:` line (keep-alives, comments).
fn parse_block(block: &[u8]) -> Result<Option<NarrativeEvent>, NarrativeError> {
    let text = std::str::from_utf8(block)
        .map_err(|e| NarrativeError::Malformed(format!("invalid UTF-8: {e}")))?;

    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    if data.is_empty() {
        return Ok(None);
    }

    events::parse_payload(&data.join("\n")).map(Some)
}

/// Encode one event as a `data:` frame terminated by a blank line.
pub fn encode_frame(event: &NarrativeEvent) -> Result<String, NarrativeError> {
    Ok(format!("data: {}\n\n", events::payload_json(event)?))
}
