use super::*;
use std::io::Cursor;

fn events_of(body: &str) -> Vec<SseEvent> {
    let mut events = Vec::new();
    read_sse_events(Cursor::new(body.as_bytes()), |event| events.push(event)).unwrap();
    events
}

fn replay(body: &str) -> (CompletionStream, Vec<String>) {
    let mut stream = CompletionStream::default();
    let mut fragments = Vec::new();
    for event in events_of(body) {
        if let Some(fragment) = stream.apply(&event) {
            fragments.push(fragment);
        }
    }
    (stream, fragments)
}

#[test]
fn test_events_split_on_blank_lines() {
    let events = events_of("event: ping\ndata: {}\n\n: comment\nid: 3\ndata: a\ndata: b\n\n");
    assert_eq!(
        events,
        vec![
            SseEvent {
                event: Some("ping".to_string()),
                data: "{}".to_string()
            },
            SseEvent {
                event: None,
                data: "a\nb".to_string()
            },
        ]
    );
}

#[test]
fn test_crlf_and_compact_fields() {
    let events = events_of("event:completion\r\ndata:{\"x\":1}\r\n\r\n");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.as_deref(), Some("completion"));
    assert_eq!(events[0].data, "{\"x\":1}");
}

#[test]
fn test_trailing_event_without_blank_line_is_flushed() {
    let events = events_of("data: last");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data, "last");
}

#[test]
fn test_message_stream_with_usage() {
    let body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"uuid\":\"msg-9\",\"usage\":{\"input_tokens\":12}}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\", world\"}}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":3}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );
    let (stream, fragments) = replay(body);
    assert_eq!(fragments, vec!["Hello", ", world"]);

    let reply = stream.finish("hi").unwrap();
    assert_eq!(reply.message_id, "msg-9");
    assert_eq!(reply.content, "Hello, world");
    assert_eq!((reply.input_tokens, reply.output_tokens), (12, 3));
}

#[test]
fn test_legacy_completion_events_estimate_tokens() {
    let body = concat!(
        "data: {\"type\":\"completion\",\"completion\":\"abcd\",\"id\":\"legacy-1\"}\n\n",
        "data: {\"type\":\"completion\",\"completion\":\"efgh\"}\n\n",
        "data: [DONE]\n\n",
    );
    let (stream, fragments) = replay(body);
    assert_eq!(fragments, vec!["abcd", "efgh"]);

    let reply = stream.finish("twelve chars").unwrap();
    assert_eq!(reply.message_id, "legacy-1");
    assert_eq!(reply.content, "abcdefgh");
    assert_eq!(reply.input_tokens, 3);
    assert_eq!(reply.output_tokens, 2);
}

#[test]
fn test_event_name_used_when_type_missing() {
    let (_, fragments) = replay("event: completion\ndata: {\"completion\":\"x\"}\n\n");
    assert_eq!(fragments, vec!["x"]);
}

#[test]
fn test_error_event_fails_the_reply() {
    let body = concat!(
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"par\"}}\n\n",
        "event: error\n",
        "data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
    );
    let (stream, fragments) = replay(body);
    assert_eq!(fragments, vec!["par"]);
    assert_eq!(
        stream.finish("hi").unwrap_err(),
        UpstreamError::Remote("Overloaded".to_string())
    );
}

#[test]
fn test_missing_message_id_is_generated() {
    let (stream, _) = replay("data: {\"type\":\"completion\",\"completion\":\"x\"}\n\n");
    let reply = stream.finish("hi").unwrap();
    assert!(uuid::Uuid::parse_str(&reply.message_id).is_ok());
}
