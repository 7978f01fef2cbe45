//! Wire framing for the text event-stream protocol.
//!
//! An event on the wire is a sequence of LF-terminated lines followed by a
//! blank line:
//!
//! ```text
//! event: <type>\n
//! id: <id>\n              (optional)
//! retry: <ms>\n           (optional)
//! data: <json-line>\n     (one per LF in the JSON payload)
//! \n
//! ```
//!
//! Encoding happens exactly once per `Hub::send` call; the resulting
//! [`Bytes`] buffer is refcount-cloned per matching connection. Decoding is
//! the client half: [`FrameDecoder`] accumulates raw bytes, splits the buffer
//! on `\n\n` into records and parses each one, dropping records whose payload
//! is not valid JSON without breaking the stream.

use crate::error::Error;
use crate::event::Event;
use bytes::Bytes;
use log::warn;

const EVENT_PREFIX: &str = "event: ";
const ID_PREFIX: &str = "id: ";
const RETRY_PREFIX: &str = "retry: ";
const DATA_PREFIX: &str = "data: ";

/// Serialize an event into a single framed buffer.
pub fn encode(event: &Event) -> Result<Bytes, Error> {
    let payload = serde_json::to_string(&event.data)?;

    let mut frame = String::with_capacity(payload.len() + 64);
    frame.push_str(EVENT_PREFIX);
    frame.push_str(&event.event_type);
    frame.push('\n');

    if let Some(id) = &event.id {
        frame.push_str(ID_PREFIX);
        frame.push_str(id);
        frame.push('\n');
    }

    if let Some(retry) = event.retry {
        frame.push_str(RETRY_PREFIX);
        frame.push_str(&retry.to_string());
        frame.push('\n');
    }

    // One `data:` line per LF so the client can reassemble the payload.
    for segment in payload.split('\n') {
        frame.push_str(DATA_PREFIX);
        frame.push_str(segment);
        frame.push('\n');
    }

    frame.push('\n');
    Ok(Bytes::from(frame))
}

/// Parse one `\n\n`-delimited record into an event.
///
/// Returns `None` when the record carries no recognizable event (missing
/// `event:` line) or when the reassembled payload is not valid JSON; the
/// caller keeps consuming the stream either way.
pub fn decode_record(record: &str) -> Option<Event> {
    let mut event_type: Option<&str> = None;
    let mut id: Option<&str> = None;
    let mut retry: Option<u64> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in record.split('\n') {
        if let Some(rest) = line.strip_prefix(EVENT_PREFIX) {
            event_type = Some(rest);
        } else if let Some(rest) = line.strip_prefix(ID_PREFIX) {
            id = Some(rest);
        } else if let Some(rest) = line.strip_prefix(RETRY_PREFIX) {
            retry = rest.parse().ok();
        } else if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
            data_lines.push(rest);
        }
    }

    let event_type = event_type?;
    let payload = data_lines.join("\n");

    let data = match serde_json::from_str(&payload) {
        Ok(value) => value,
        Err(e) => {
            warn!("Discarding {event_type} record with unparseable payload: {e}");
            return None;
        }
    };

    Some(Event {
        event_type: event_type.to_string(),
        data,
        id: id.map(str::to_string),
        retry,
    })
}

/// Incremental decoder for a byte stream of framed records.
///
/// Chunk boundaries are arbitrary: bytes accumulate until a full `\n\n`
/// frame (and its UTF-8) is complete, so records split across reads are
/// handled transparently.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and drain every complete record it finishes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Event> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(end) = find_record_end(&self.buffer) {
            let record_bytes: Vec<u8> = self.buffer.drain(..end + 2).collect();
            match std::str::from_utf8(&record_bytes[..end]) {
                Ok(record) => {
                    if let Some(event) = decode_record(record) {
                        events.push(event);
                    }
                }
                Err(e) => {
                    warn!("Discarding non-UTF-8 record: {e}");
                }
            }
        }
        events
    }
}

fn find_record_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_minimal_event() {
        let event = Event::new("user.message", json!({"n": 1}));
        let frame = encode(&event).unwrap();
        assert_eq!(&frame[..], b"event: user.message\ndata: {\"n\":1}\n\n");
    }

    #[test]
    fn test_encode_includes_optional_fields_in_order() {
        let event = Event::new("t", json!(null)).with_id("e-7").with_retry(1500);
        let frame = encode(&event).unwrap();
        assert_eq!(&frame[..], b"event: t\nid: e-7\nretry: 1500\ndata: null\n\n");
    }

    #[test]
    fn test_encode_data_line_count_tracks_payload_newlines() {
        // Compact JSON escapes LF, so a serialized event carries exactly one
        // data line even when the payload text contains newlines.
        let event = Event::new("t", json!({"text": "line1\nline2"}));
        let frame = String::from_utf8(encode(&event).unwrap().to_vec()).unwrap();
        let data_lines = frame.lines().filter(|l| l.starts_with("data: ")).count();
        assert_eq!(data_lines, 1);

        // The splitting contract itself: 1 + count('\n', payload) lines.
        let payload = "{\"a\":\n\"b\"\n}";
        assert_eq!(payload.split('\n').count(), 1 + payload.matches('\n').count());
    }

    #[test]
    fn test_decode_round_trips_encode() {
        let event = Event::new("user.message", json!({"n": 1, "nested": {"k": [1, 2]}}))
            .with_id("abc")
            .with_retry(3000);
        let frame = encode(&event).unwrap();
        let decoded = decode_record(std::str::from_utf8(&frame[..frame.len() - 2]).unwrap());
        assert_eq!(decoded, Some(event));
    }

    #[test]
    fn test_decode_joins_multiple_data_lines() {
        let record = "event: t\ndata: {\"text\":\ndata: \"v\"}";
        let event = decode_record(record).unwrap();
        assert_eq!(event.data, json!({"text": "v"}));
    }

    #[test]
    fn test_decode_drops_unparseable_payload() {
        assert_eq!(decode_record("event: t\ndata: {not json"), None);
    }

    #[test]
    fn test_decode_ignores_record_without_event_line() {
        assert_eq!(decode_record("data: {}"), None);
    }

    #[test]
    fn test_decoder_handles_chunks_split_mid_record() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"event: a\nda").is_empty());
        assert!(decoder.feed(b"ta: {\"n\":1}\n").is_empty());

        let events = decoder.feed(b"\nevent: b\ndata: 2\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "a");
        assert_eq!(events[0].data, json!({"n": 1}));
        assert_eq!(events[1].event_type, "b");
        assert_eq!(events[1].data, json!(2));
    }

    #[test]
    fn test_decoder_survives_bad_record_between_good_ones() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.feed(b"event: a\ndata: 1\n\nevent: x\ndata: oops\n\nevent: b\ndata: 2\n\n");
        let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["a", "b"]);
    }
}
