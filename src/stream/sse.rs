//! Incremental parser for `text/event-stream` framing.
//!
//! The chat endpoint answers a POST with an SSE body, so this cannot lean on
//! an EventSource-style client; the response byte stream is decoded by hand.
//! Chunk boundaries are arbitrary: a frame, a line, even a UTF-8 code point
//! may be split across chunks, so the parser buffers raw bytes and only
//! decodes complete lines.

use serde_json::Value;

/// One decoded SSE frame: the event name and its JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub event: String,
    pub data: Value,
}

#[derive(Debug, Default)]
pub struct SseParser {
    /// Unconsumed tail of the stream, at most one partial line.
    pending: Vec<u8>,
    /// Name from the most recent `event:` line, cleared once a frame is
    /// emitted (or its data line fails to parse).
    current_event: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of the stream; returns the frames completed by it.
    ///
    /// Malformed JSON in a data line drops that frame silently and must not
    /// desynchronize later frames. Blank lines and `:` comment lines
    /// (keepalive pings) are ignored. An incomplete trailing line stays
    /// buffered until the next chunk; if the stream ends first it is simply
    /// dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);

        // Consume everything up to the last newline; the remainder is the
        // (possibly incomplete) current line.
        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();

        let mut frames = Vec::new();
        for raw_line in complete.split(|&b| b == b'\n') {
            let raw_line = match raw_line.last() {
                Some(b'\r') => &raw_line[..raw_line.len() - 1],
                _ => raw_line,
            };
            let line = String::from_utf8_lossy(raw_line);
            self.handle_line(&line, &mut frames);
        }
        frames
    }

    fn handle_line(&mut self, line: &str, frames: &mut Vec<SseFrame>) {
        if line.is_empty() || line.starts_with(':') {
            return;
        }
        if let Some(name) = line.strip_prefix("event:") {
            self.current_event = Some(name.trim().to_string());
            return;
        }
        if let Some(payload) = line.strip_prefix("data:") {
            // A data line without a preceding event name is not ours to frame.
            let Some(event) = self.current_event.take() else {
                return;
            };
            match serde_json::from_str::<Value>(payload.trim()) {
                Ok(data) => frames.push(SseFrame { event, data }),
                Err(_) => {
                    // Skip malformed frames silently
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_all(chunks: &[&[u8]]) -> Vec<SseFrame> {
        let mut parser = SseParser::new();
        let mut frames = Vec::new();
        for chunk in chunks {
            frames.extend(parser.push(chunk));
        }
        frames
    }

    const STREAM: &[u8] = b"event: text_delta\ndata: {\"text\":\"Hello\"}\n\n\
                            event: done\ndata: {}\n\n";

    #[test]
    fn test_single_chunk() {
        let frames = parse_all(&[STREAM]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event, "text_delta");
        assert_eq!(frames[0].data, json!({"text": "Hello"}));
        assert_eq!(frames[1].event, "done");
    }

    #[test]
    fn test_split_anywhere_matches_unsplit() {
        let whole = parse_all(&[STREAM]);
        // Every possible two-way split, including mid-line and mid-JSON.
        for i in 0..STREAM.len() {
            let frames = parse_all(&[&STREAM[..i], &STREAM[i..]]);
            assert_eq!(frames, whole, "split at byte {i} diverged");
        }
        // Byte-at-a-time.
        let bytes: Vec<&[u8]> = STREAM.chunks(1).collect();
        assert_eq!(parse_all(&bytes), whole);
    }

    #[test]
    fn test_mid_json_split() {
        // The exact split from the interface contract.
        let frames = parse_all(&[b"event: text_delta\ndata: {\"te", b"xt\":\"hi\"}\n"]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, json!({"text": "hi"}));
    }

    #[test]
    fn test_split_inside_utf8_code_point() {
        // "héllo": the two-byte é may straddle a chunk boundary.
        let stream = "event: text_delta\ndata: {\"text\":\"h\u{e9}llo\"}\n\n".as_bytes();
        let whole = parse_all(&[stream]);
        assert_eq!(whole[0].data, json!({"text": "héllo"}));
        for i in 0..stream.len() {
            let frames = parse_all(&[&stream[..i], &stream[i..]]);
            assert_eq!(frames, whole, "split at byte {i} diverged");
        }
    }

    #[test]
    fn test_malformed_json_dropped_then_resyncs() {
        let frames = parse_all(&[
            b"event: text_delta\ndata: {not json\n\n\
              event: text_delta\ndata: {\"text\":\"ok\"}\n\n",
        ]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, json!({"text": "ok"}));
    }

    #[test]
    fn test_malformed_frame_clears_event_name() {
        // The broken frame must not leave its event name behind for a later
        // orphan data line.
        let frames = parse_all(&[b"event: text_delta\ndata: oops\ndata: {\"text\":\"x\"}\n"]);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let frames = parse_all(&[b": keepalive\n\nevent: done\n: ping\ndata: {}\n\n: bye\n"]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "done");
    }

    #[test]
    fn test_data_without_event_name_ignored() {
        let frames = parse_all(&[b"data: {\"text\":\"orphan\"}\n\n"]);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_incomplete_trailing_line_not_flushed() {
        let mut parser = SseParser::new();
        let frames = parser.push(b"event: text_delta\ndata: {\"text\":\"hi\"}");
        // No trailing newline, so the data line is still pending.
        assert!(frames.is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let frames = parse_all(&[b"event: done\r\ndata: {}\r\n\r\n"]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "done");
    }
}
