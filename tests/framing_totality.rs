//! Framing invariants for the stream buffer.
//!
//! For any byte stream that is the concatenation of N valid JSON messages
//! each followed by a newline, every chunking schedule must yield exactly N
//! message events in order. Embedded `\n` escapes inside string values must
//! never cause early delivery.

use mcp_aegis::transport::{StreamBuffer, StreamEvent};
use proptest::prelude::*;
use serde_json::{json, Value};

fn collect_messages(buffer: &mut StreamBuffer, chunks: &[&[u8]]) -> Vec<Value> {
    let mut messages = Vec::new();
    for chunk in chunks {
        for event in buffer.process_stdout(chunk) {
            match event {
                StreamEvent::Message(v) => messages.push(v),
                StreamEvent::ParseError { error, snippet } => {
                    panic!("unexpected parse error: {} in {}", error, snippet)
                }
            }
        }
    }
    messages
}

#[test]
fn twelve_kilobyte_message_in_ten_fragments() {
    // A response large enough to span many reads, with raw newlines in the
    // logical value (escaped on the wire).
    let text: String = (0..1500).map(|i| format!("line {}\n", i)).collect();
    let message = json!({"jsonrpc": "2.0", "id": 7, "result": {"text": text}});
    let mut wire = serde_json::to_string(&message).unwrap();
    wire.push('\n');
    assert!(wire.len() > 12_000);

    let bytes = wire.as_bytes();
    let step = bytes.len() / 10 + 1;
    let chunks: Vec<&[u8]> = bytes.chunks(step).collect();
    assert_eq!(chunks.len(), 10);

    let mut buffer = StreamBuffer::new(None);
    let messages = collect_messages(&mut buffer, &chunks);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0], message);
}

#[test]
fn byte_at_a_time_delivery() {
    let message = json!({"id": 1, "result": {"note": "a\nb\tc\"quoted\""}});
    let mut wire = serde_json::to_string(&message).unwrap();
    wire.push('\n');

    let mut buffer = StreamBuffer::new(None);
    let mut messages = Vec::new();
    for byte in wire.as_bytes() {
        for event in buffer.process_stdout(std::slice::from_ref(byte)) {
            match event {
                StreamEvent::Message(v) => messages.push(v),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }
    assert_eq!(messages, vec![message]);
}

proptest! {
    /// Framing totality: N messages, arbitrary chunk boundaries, exactly N
    /// in-order message events.
    #[test]
    fn any_chunking_schedule_preserves_messages(
        texts in prop::collection::vec("[a-z\\n\" ]{0,40}", 1..8),
        cut_points in prop::collection::vec(0usize..10_000, 0..12),
    ) {
        let messages: Vec<Value> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| json!({"id": i, "result": {"text": t}}))
            .collect();
        let mut wire = String::new();
        for message in &messages {
            wire.push_str(&serde_json::to_string(message).unwrap());
            wire.push('\n');
        }
        let bytes = wire.as_bytes();

        let mut cuts: Vec<usize> = cut_points
            .into_iter()
            .map(|c| c % (bytes.len() + 1))
            .collect();
        cuts.push(0);
        cuts.push(bytes.len());
        cuts.sort_unstable();
        cuts.dedup();

        let chunks: Vec<&[u8]> = cuts
            .windows(2)
            .map(|w| &bytes[w[0]..w[1]])
            .collect();

        let mut buffer = StreamBuffer::new(None);
        let received = collect_messages(&mut buffer, &chunks);
        prop_assert_eq!(received, messages);
    }
}
