use super::*;
use crate::accounts::Credential;
use std::io::{BufRead, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Serves exactly one canned HTTP response and returns the raw request it saw.
fn serve_once(status: &str, content_type: &str, body: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );

    let handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = std::io::BufReader::new(stream.try_clone().unwrap());

        let mut request = String::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap();
            }
            request.push_str(&line);
            if line == "\r\n" || line.is_empty() {
                break;
            }
        }
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).unwrap();
        request.push_str(&String::from_utf8_lossy(&body));

        let mut stream = stream;
        stream.write_all(response.as_bytes()).unwrap();
        stream.flush().unwrap();
        request
    });

    (format!("http://{}", addr), handle)
}

fn client_for(base_url: &str) -> WebChatClient {
    let config = ApiConfig {
        base_url: base_url.to_string(),
        ..ApiConfig::default()
    };
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(10)))
        .http_status_as_error(false)
        .proxy(None)
        .build()
        .into();
    WebChatClient::with_agent(&config, agent)
}

fn account() -> Account {
    Account::from_credential(
        Credential {
            session_key: "sk-test".to_string(),
            org_id: "org-42".to_string(),
            display_name: None,
            email: None,
            cookie_header: Some("sessionKey=sk-test; lastActiveOrg=org-42".to_string()),
        },
        "Account 1",
        chrono::Utc::now(),
    )
}

#[test]
fn test_urls_ignore_trailing_slash() {
    let client = client_for("https://chat.example.com/");
    assert_eq!(
        client.conversations_url("org-1"),
        "https://chat.example.com/api/organizations/org-1/chat_conversations"
    );
    assert_eq!(
        client.completion_url("org-1", "conv-1"),
        "https://chat.example.com/api/organizations/org-1/chat_conversations/conv-1/completion"
    );
}

#[tokio::test]
async fn test_create_conversation_posts_uuid_and_model() {
    let (base_url, server) = serve_once("201 Created", "application/json", "{}");
    let client = client_for(&base_url);

    let conversation = client
        .create_conversation(&account(), "model-x")
        .await
        .unwrap();
    let request = server.join().unwrap();

    assert!(request.starts_with("POST /api/organizations/org-42/chat_conversations HTTP/1.1"));
    assert!(request.contains("sessionKey=sk-test; lastActiveOrg=org-42"));
    assert!(request.contains(&conversation.conversation_id));
    assert!(request.contains("\"model\":\"model-x\""));
    assert!(uuid::Uuid::parse_str(&conversation.conversation_id).is_ok());
    assert_eq!(conversation.parent_message_id, ROOT_PARENT_ID);
}

#[tokio::test]
async fn test_send_message_streams_fragments() {
    let sse = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"uuid\":\"msg-1\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"Hi \"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"there\"}}\n\n",
    );
    let (base_url, server) = serve_once("200 OK", "text/event-stream", sse);
    let client = client_for(&base_url);
    let conversation = ConversationRef {
        conversation_id: "conv-7".to_string(),
        parent_message_id: "parent-7".to_string(),
    };

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = seen.clone();
    let sink: ChunkSink = Box::new(move |fragment: String| sink_seen.lock().unwrap().push(fragment));

    let reply = client
        .send_message(&account(), &conversation, "hello there", Some(sink))
        .await
        .unwrap();
    let request = server.join().unwrap();

    assert!(request.starts_with(
        "POST /api/organizations/org-42/chat_conversations/conv-7/completion HTTP/1.1"
    ));
    assert!(request.contains("\"parent_message_uuid\":\"parent-7\""));
    assert!(request.contains("\"timezone\":\"UTC\""));
    assert_eq!(*seen.lock().unwrap(), vec!["Hi ", "there"]);
    assert_eq!(reply.message_id, "msg-1");
    assert_eq!(reply.content, "Hi there");
    assert_eq!(reply.input_tokens, 3);
    assert_eq!(reply.output_tokens, 2);
}

#[tokio::test]
async fn test_error_status_carries_body_excerpt() {
    let (base_url, server) = serve_once(
        "403 Forbidden",
        "application/json",
        "{\"error\":\"session expired\"}",
    );
    let client = client_for(&base_url);

    let err = client
        .create_conversation(&account(), "model-x")
        .await
        .unwrap_err();
    server.join().unwrap();

    assert_eq!(
        err,
        UpstreamError::Status {
            status: 403,
            body: "{\"error\":\"session expired\"}".to_string()
        }
    );
}

#[tokio::test]
async fn test_unreachable_host_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client_for(&format!("http://{}", addr))
        .create_conversation(&account(), "model-x")
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::Transport(_)));
}
