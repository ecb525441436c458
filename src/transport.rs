//! Wire shapes shared with scripting clients: the JSON envelope and SSE frames.

use crate::accounts::Account;
use crate::chat::ChatEvent;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt::Display;

/// Sentinel frame that closes every event stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Envelope around every non-streaming response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Only the error's `Display` text crosses the boundary.
    pub fn failure(err: &dyn Display) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                "{{\"success\":false,\"error\":{}}}",
                serde_json::Value::String(e.to_string())
            )
        })
    }
}

/// Account as shown to callers; the session secret is masked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub org_id: String,
    pub session_key: String,
    pub active: bool,
    pub created_at: String,
    pub last_used_at: String,
    pub requests_today: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub active_conversation_id: Option<String>,
}

impl AccountSummary {
    pub fn new(account: &Account, active: bool, today: NaiveDate) -> Self {
        Self {
            id: account.id.clone(),
            display_name: account.display_name.clone(),
            email: account.email.clone(),
            org_id: account.org_id.clone(),
            session_key: account.masked_session_key(),
            active,
            created_at: account.created_at.clone(),
            last_used_at: account.last_used_at.clone(),
            requests_today: account.requests_on(today),
            input_tokens: account.input_tokens,
            output_tokens: account.output_tokens,
            active_conversation_id: account.active_conversation_id.clone(),
        }
    }
}

/// Encodes one chat event as SSE text.
///
/// `Done` becomes the `[DONE]` sentinel; `Error` becomes an `error` frame
/// followed by the sentinel.
pub fn encode_event(event: &ChatEvent) -> String {
    match event {
        ChatEvent::Metadata(conversation) => frame(Some("metadata"), &json_or_null(conversation)),
        ChatEvent::Delta(text) => frame(None, &serde_json::json!({ "text": text }).to_string()),
        ChatEvent::Done(_) => DONE_FRAME.to_string(),
        ChatEvent::Error(message) => {
            let mut out = frame(
                Some("error"),
                &serde_json::json!({ "error": message }).to_string(),
            );
            out.push_str(DONE_FRAME);
            out
        }
    }
}

fn frame(event: Option<&str>, data: &str) -> String {
    match event {
        Some(name) => format!("event: {}\ndata: {}\n\n", name, data),
        None => format!("data: {}\n\n", data),
    }
}

fn json_or_null(value: &impl Serialize) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ConversationRef, RelayError, SendResult};

    #[test]
    fn test_envelope_shapes() {
        let ok = ApiResponse::ok(vec![1, 2]).to_json();
        assert_eq!(ok, r#"{"success":true,"data":[1,2]}"#);

        let err = RelayError::InvalidArgument {
            message: "message text must not be empty".to_string(),
        };
        let failed = ApiResponse::<()>::failure(&err).to_json();
        assert_eq!(
            failed,
            r#"{"success":false,"error":"invalid argument: message text must not be empty"}"#
        );
    }

    #[test]
    fn test_account_summary_masks_secrets() {
        let mut account = Account::from_credential(
            crate::accounts::Credential {
                session_key: "sk-ant-REDACTED".to_string(),
                org_id: "org-1".to_string(),
                display_name: Some("Ada".to_string()),
                email: None,
                cookie_header: Some("sessionKey=sk-ant-REDACTED".to_string()),
            },
            "Account 1",
            chrono::Utc::now(),
        );
        account.daily_request_count = 4;
        account.last_request_date = Some("2026-02-01".to_string());

        let today = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let summary = AccountSummary::new(&account, true, today);
        let json = ApiResponse::ok(&summary).to_json();

        assert!(!json.contains("0123456789"));
        assert!(!json.contains("cookie"));
        assert!(json.contains("\"requestsToday\":4"));
        assert!(json.contains("\"active\":true"));

        let tomorrow = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
        assert_eq!(AccountSummary::new(&account, false, tomorrow).requests_today, 0);
    }

    #[test]
    fn test_stream_frames() {
        let metadata = encode_event(&ChatEvent::Metadata(ConversationRef {
            conversation_id: "c-1".to_string(),
            parent_message_id: "p-1".to_string(),
        }));
        assert_eq!(
            metadata,
            "event: metadata\ndata: {\"conversationId\":\"c-1\",\"parentMessageId\":\"p-1\"}\n\n"
        );

        assert_eq!(
            encode_event(&ChatEvent::Delta("line\n\"quoted\"".to_string())),
            "data: {\"text\":\"line\\n\\\"quoted\\\"\"}\n\n"
        );

        let done = encode_event(&ChatEvent::Done(SendResult {
            message_id: "m".to_string(),
            conversation_id: "c-1".to_string(),
            parent_message_id: "p-1".to_string(),
            content: "hi".to_string(),
            input_tokens: 1,
            output_tokens: 1,
        }));
        assert_eq!(done, DONE_FRAME);
    }

    #[test]
    fn test_error_frame_is_followed_by_sentinel() {
        let encoded = encode_event(&ChatEvent::Error("boom".to_string()));
        assert_eq!(
            encoded,
            "event: error\ndata: {\"error\":\"boom\"}\n\ndata: [DONE]\n\n"
        );
    }
}
