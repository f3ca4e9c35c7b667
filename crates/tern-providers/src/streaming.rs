//! Shared utilities for streaming SSE response parsing.
//!
//! This module provides common helpers used by the providers for handling
//! Server-Sent Events (SSE) streaming responses.

use crate::{CompletionChunk, StopReason, ToolCall, Usage};

// ─────────────────────────────────────────────────────────────────────────────
// UTF-8 Streaming
// ─────────────────────────────────────────────────────────────────────────────

/// Try to decode bytes as UTF-8, handling incomplete sequences at the end.
/// Returns the decoded string and leaves any incomplete bytes in the buffer.
pub fn decode_utf8_streaming(byte_buffer: &mut Vec<u8>) -> Option<String> {
    match std::str::from_utf8(byte_buffer) {
        Ok(s) => {
            let result = s.to_string();
            byte_buffer.clear();
            Some(result)
        }
        Err(e) => {
            let valid_up_to = e.valid_up_to();
            if valid_up_to > 0 {
                let valid_bytes: Vec<u8> = byte_buffer.drain(..valid_up_to).collect();
                Some(String::from_utf8_lossy(&valid_bytes).into_owned())
            } else if e.error_len().is_some() {
                // Invalid (not merely truncated) sequence at the front; skip it
                let skip = e.error_len().unwrap_or(1);
                byte_buffer.drain(..skip);
                Some(char::REPLACEMENT_CHARACTER.to_string())
            } else {
                None // No valid UTF-8 yet, wait for more bytes
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE framing
// ─────────────────────────────────────────────────────────────────────────────

/// One server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE decoder: feed raw byte chunks, get back complete events.
#[derive(Debug, Default)]
pub struct SseDecoder {
    bytes: Vec<u8>,
    text: String,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.bytes.extend_from_slice(chunk);
        while let Some(decoded) = decode_utf8_streaming(&mut self.bytes) {
            self.text.push_str(&decoded);
            if self.bytes.is_empty() {
                break;
            }
        }

        let mut events = Vec::new();
        while let Some(line_end) = self.text.find('\n') {
            let line: String = self.text.drain(..=line_end).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.handle_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.text);
        let mut event = None;
        for line in rest.lines() {
            if let Some(e) = self.handle_line(line) {
                event = Some(e);
            }
        }
        event.or_else(|| self.dispatch())
    }

    fn handle_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        Some(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Completion Chunk Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Create a final completion chunk with stop reason and usage.
pub fn make_final_chunk(stop_reason: StopReason, usage: Option<Usage>) -> CompletionChunk {
    CompletionChunk {
        finished: true,
        stop_reason: Some(stop_reason),
        usage,
        ..Default::default()
    }
}

/// Create a text content chunk (not finished).
pub fn make_text_chunk(text: String) -> CompletionChunk {
    CompletionChunk {
        text,
        ..Default::default()
    }
}

/// Create a chunk carrying one complete tool call (not finished).
pub fn make_tool_chunk(tool_call: ToolCall) -> CompletionChunk {
    CompletionChunk {
        tool_call: Some(tool_call),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8_keeps_incomplete_tail() {
        // "é" is 0xC3 0xA9; split it across two pushes
        let mut buffer = vec![b'a', 0xC3];
        assert_eq!(decode_utf8_streaming(&mut buffer).as_deref(), Some("a"));
        assert_eq!(buffer, vec![0xC3]);
        assert_eq!(decode_utf8_streaming(&mut buffer), None);

        buffer.push(0xA9);
        assert_eq!(decode_utf8_streaming(&mut buffer).as_deref(), Some("é"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_sse_events_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: message_start\nda").is_empty());
        let events = decoder.push(b"ta: {\"a\":1}\n\ndata: [DONE]\n\n");
        assert_eq!(
            events,
            vec![
                SseEvent {
                    event: Some("message_start".to_string()),
                    data: "{\"a\":1}".to_string()
                },
                SseEvent {
                    event: None,
                    data: "[DONE]".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_sse_comments_and_crlf() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keepalive\r\ndata: x\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn test_sse_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        let event = decoder.finish().unwrap();
        assert_eq!(event.data, "tail");
    }
}
