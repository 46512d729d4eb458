//! Line-delimited JSON framing over the child's output streams.
//!
//! Stdout bytes arrive in arbitrary chunks: a single logical message may be
//! split across dozens of reads, each possibly ending mid-string-literal, and
//! one read may carry many messages. The buffer extracts complete lines,
//! parses each as JSON, and keeps residual bytes until the closing newline
//! arrives. Newlines inside JSON string values are escaped on the wire and
//! never break framing.

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

/// Events produced while consuming stdout bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A complete JSON value parsed from one line.
    Message(Value),
    /// A non-empty line that failed to parse; carries the error and a
    /// trimmed snippet of the offending line.
    ParseError { error: String, snippet: String },
}

/// Framing state for one server session.
///
/// Pure and synchronous: the owning I/O task feeds bytes in and forwards the
/// returned events. Stderr is accumulated separately and only ever cleared
/// at test boundaries; the stdout buffer is never truncated except by
/// consumption of complete lines.
#[derive(Debug)]
pub struct StreamBuffer {
    /// Raw bytes so a chunk boundary inside a multi-byte character cannot
    /// corrupt the line it lands in.
    stdout_buffer: Vec<u8>,
    stderr_buffer: String,
    ready_pattern: Option<Regex>,
    is_ready: bool,
}

const SNIPPET_LEN: usize = 120;

impl StreamBuffer {
    /// `ready_pattern` is tested against cumulative stderr; a literal
    /// substring is a valid regex. The pattern was validated at config load.
    pub fn new(ready_pattern: Option<&str>) -> Self {
        let ready_pattern = ready_pattern.and_then(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Ignoring unparseable ready pattern '{}': {}", p, e);
                None
            }
        });
        Self {
            stdout_buffer: Vec::new(),
            stderr_buffer: String::new(),
            ready_pattern,
            is_ready: false,
        }
    }

    /// Consume a chunk of stdout bytes, returning an event per complete line.
    pub fn process_stdout(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.stdout_buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline_at) = self.stdout_buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.stdout_buffer.drain(..=newline_at).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(value) => {
                    debug!(
                        "Parsed message: {}",
                        line.chars().take(100).collect::<String>()
                    );
                    events.push(StreamEvent::Message(value));
                }
                Err(e) => {
                    let snippet: String = line.chars().take(SNIPPET_LEN).collect();
                    events.push(StreamEvent::ParseError {
                        error: e.to_string(),
                        snippet,
                    });
                }
            }
        }
        events
    }

    /// Consume a chunk of stderr bytes. Returns `true` the first time the
    /// configured ready pattern matches the accumulated buffer.
    pub fn process_stderr(&mut self, bytes: &[u8]) -> bool {
        self.stderr_buffer.push_str(&String::from_utf8_lossy(bytes));

        if self.is_ready {
            return false;
        }
        if let Some(pattern) = &self.ready_pattern {
            if pattern.is_match(&self.stderr_buffer) {
                self.is_ready = true;
                debug!("Ready pattern matched on stderr");
                return true;
            }
        }
        false
    }

    pub fn get_stderr(&self) -> &str {
        &self.stderr_buffer
    }

    /// Cleared between tests so each test sees only its own stderr. The
    /// stdout buffer is left alone: a partial message must survive the
    /// boundary.
    pub fn clear_stderr(&mut self) {
        self.stderr_buffer.clear();
    }

    /// True when no pattern is configured, else whether it has matched.
    pub fn ready_status(&self) -> bool {
        self.ready_pattern.is_none() || self.is_ready
    }

    /// Full reset, used only when tearing a session down.
    pub fn reset_state(&mut self) {
        self.stdout_buffer.clear();
        self.stderr_buffer.clear();
        self.is_ready = false;
    }

    #[cfg(test)]
    fn buffered_stdout(&self) -> &[u8] {
        &self.stdout_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn messages(events: Vec<StreamEvent>) -> Vec<Value> {
        events
            .into_iter()
            .map(|e| match e {
                StreamEvent::Message(v) => v,
                other => panic!("expected message, got {:?}", other),
            })
            .collect()
    }

    #[test]
    fn whole_line_in_one_chunk() {
        let mut buffer = StreamBuffer::new(None);
        let events = buffer.process_stdout(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n");
        assert_eq!(
            messages(events),
            vec![json!({"jsonrpc": "2.0", "id": 1, "result": {}})]
        );
        assert!(buffer.buffered_stdout().is_empty());
    }

    #[test]
    fn message_fragmented_across_chunks() {
        let mut buffer = StreamBuffer::new(None);
        assert!(buffer.process_stdout(b"{\"id\":1,\"resu").is_empty());
        assert!(buffer.process_stdout(b"lt\":\"par").is_empty());
        let events = buffer.process_stdout(b"tial\"}\n");
        assert_eq!(messages(events), vec![json!({"id": 1, "result": "partial"})]);
    }

    #[test]
    fn many_messages_in_one_chunk() {
        let mut buffer = StreamBuffer::new(None);
        let events = buffer.process_stdout(b"{\"id\":1}\n{\"id\":2}\n{\"id\":3}\n");
        assert_eq!(
            messages(events),
            vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]
        );
    }

    #[test]
    fn escaped_newline_inside_string_does_not_split() {
        let mut buffer = StreamBuffer::new(None);
        // Wire bytes contain backslash-n inside the string value, not a raw
        // newline, so the frame ends only at the real newline.
        let events = buffer.process_stdout(b"{\"text\":\"line one\\nline two\"}\n");
        assert_eq!(
            messages(events),
            vec![json!({"text": "line one\nline two"})]
        );
    }

    #[test]
    fn chunk_boundary_mid_utf8_character() {
        let mut buffer = StreamBuffer::new(None);
        let wire = "{\"text\":\"héllo wörld\"}\n".as_bytes();
        // Split inside the two-byte 'é' sequence.
        let cut = wire.iter().position(|&b| b == 0xc3).unwrap() + 1;
        assert!(buffer.process_stdout(&wire[..cut]).is_empty());
        let events = buffer.process_stdout(&wire[cut..]);
        assert_eq!(messages(events), vec![json!({"text": "héllo wörld"})]);
    }

    #[test]
    fn chunk_boundary_mid_escape() {
        let mut buffer = StreamBuffer::new(None);
        assert!(buffer.process_stdout(b"{\"text\":\"a\\").is_empty());
        let events = buffer.process_stdout(b"nb\"}\n");
        assert_eq!(messages(events), vec![json!({"text": "a\nb"})]);
    }

    #[test]
    fn empty_lines_skipped() {
        let mut buffer = StreamBuffer::new(None);
        let events = buffer.process_stdout(b"\n\n  \n{\"id\":7}\n\n");
        assert_eq!(messages(events), vec![json!({"id": 7})]);
    }

    #[test]
    fn malformed_line_yields_parse_error_with_snippet() {
        let mut buffer = StreamBuffer::new(None);
        let events = buffer.process_stdout(b"this is not json\n{\"id\":1}\n");
        assert_eq!(events.len(), 2);
        match &events[0] {
            StreamEvent::ParseError { snippet, .. } => {
                assert_eq!(snippet, "this is not json");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
        assert_eq!(events[1], StreamEvent::Message(json!({"id": 1})));
    }

    #[test]
    fn residual_bytes_survive_stderr_clear() {
        let mut buffer = StreamBuffer::new(None);
        buffer.process_stdout(b"{\"id\":1,\"result\":\"hal");
        buffer.clear_stderr();
        let events = buffer.process_stdout(b"f\"}\n");
        assert_eq!(messages(events), vec![json!({"id": 1, "result": "half"})]);
    }

    #[test]
    fn ready_pattern_fires_once() {
        let mut buffer = StreamBuffer::new(Some("Server ready"));
        assert!(!buffer.ready_status());
        assert!(!buffer.process_stderr(b"starting up...\n"));
        assert!(buffer.process_stderr(b"Server ready on stdio\n"));
        assert!(buffer.ready_status());
        // Cumulative buffer still matches, but the event fires only once.
        assert!(!buffer.process_stderr(b"more logs\n"));
    }

    #[test]
    fn ready_pattern_split_across_chunks() {
        let mut buffer = StreamBuffer::new(Some("Server ready"));
        assert!(!buffer.process_stderr(b"Server re"));
        assert!(buffer.process_stderr(b"ady\n"));
    }

    #[test]
    fn no_pattern_means_always_ready() {
        let buffer = StreamBuffer::new(None);
        assert!(buffer.ready_status());
    }

    #[test]
    fn stderr_accumulates_until_cleared() {
        let mut buffer = StreamBuffer::new(None);
        buffer.process_stderr(b"warning: one\n");
        buffer.process_stderr(b"warning: two\n");
        assert_eq!(buffer.get_stderr(), "warning: one\nwarning: two\n");
        buffer.clear_stderr();
        assert_eq!(buffer.get_stderr(), "");
    }
}
