//! Incremental `text/event-stream` parsing.
//!
//! Bytes arrive in arbitrary chunks; [`SseParser::push`] buffers partial
//! lines and returns every frame completed by the chunk. Only the `event`
//! and `data` fields are used by the order feed; `id`, `retry` and comment
//! lines are skipped.

use denim_core::OrderChange;

/// Event name used when a frame has no `event:` line.
const DEFAULT_EVENT: &str = "message";

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect the frames it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
        })
    }
}

/// A frame from the order feed, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    Change(OrderChange),
    /// The server may have dropped changes; reload the snapshot.
    Resync,
    /// Any other event name.
    Other(String),
}

impl FeedMessage {
    /// # Errors
    ///
    /// Returns the JSON error if a change event carries a malformed body.
    pub fn decode(frame: &SseFrame) -> Result<Self, serde_json::Error> {
        match frame.event.as_str() {
            "insert" | "update" | "delete" => {
                serde_json::from_str(&frame.data).map(Self::Change)
            }
            "resync" => Ok(Self::Resync),
            other => Ok(Self::Other(other.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"event: upd").is_empty());
        assert!(parser.push(b"ate\ndata: {\"a\"").is_empty());
        let frames = parser.push(b":1}\n\nevent: resync\ndata: {}\n\n");
        assert_eq!(
            frames,
            [
                SseFrame {
                    event: "update".to_string(),
                    data: "{\"a\":1}".to_string(),
                },
                SseFrame {
                    event: "resync".to_string(),
                    data: "{}".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_comments_crlf_and_multiline_data() {
        let mut parser = SseParser::new();
        let frames = parser.push(b": keep-alive\r\n\r\ndata: one\r\ndata:two\r\nid: 7\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "one\ntwo");
    }

    #[test]
    fn test_multibyte_text_split_mid_character() {
        let text = "data: Windhoek \u{2013} Klein\n\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xE2).unwrap() + 1;
        let mut parser = SseParser::new();
        assert!(parser.push(&text[..split]).is_empty());
        let frames = parser.push(&text[split..]);
        assert_eq!(frames[0].data, "Windhoek \u{2013} Klein");
    }

    #[test]
    fn test_decode_feed_messages() {
        let delete = SseFrame {
            event: "delete".to_string(),
            data: r#"{"type":"delete","id":"0b3f1c52-8f0e-4c59-9a43-5d7a0e2d1b11","user_id":"5f1d7c2a-3b4e-4f60-8a71-92c3d4e5f607"}"#.to_string(),
        };
        let FeedMessage::Change(change) = FeedMessage::decode(&delete).unwrap() else {
            panic!("expected change");
        };
        assert_eq!(change.order_id().to_string(), "0b3f1c52-8f0e-4c59-9a43-5d7a0e2d1b11");

        let resync = SseFrame {
            event: "resync".to_string(),
            data: "{}".to_string(),
        };
        assert_eq!(FeedMessage::decode(&resync).unwrap(), FeedMessage::Resync);

        let broken = SseFrame {
            event: "insert".to_string(),
            data: "{".to_string(),
        };
        assert!(FeedMessage::decode(&broken).is_err());
    }
}
