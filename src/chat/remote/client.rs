//! Blocking `ureq` client for the web chat endpoints, run under `spawn_blocking`.

use super::sse::{read_sse_events, CompletionStream};
use crate::accounts::Account;
use crate::chat::errors::UpstreamError;
use crate::chat::protocol::{ChunkSink, ConversationRef, MessageReply, RemoteApi};
use crate::config::ApiConfig;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::io::BufReader;

/// Parent id of the first message in a fresh conversation.
pub const ROOT_PARENT_ID: &str = "00000000-0000-4000-8000-000000000000";

const ERROR_BODY_EXCERPT_CHARS: usize = 200;

type HttpResponse = ureq::http::Response<ureq::Body>;

#[derive(Clone)]
pub struct WebChatClient {
    agent: ureq::Agent,
    base_url: String,
    user_agent: String,
}

impl WebChatClient {
    pub fn new(config: &ApiConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.request_timeout()))
            .http_status_as_error(false)
            .build()
            .into();
        Self::with_agent(config, agent)
    }

    /// Uses a preconfigured agent; it must not treat HTTP statuses as errors.
    pub fn with_agent(config: &ApiConfig, agent: ureq::Agent) -> Self {
        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
        }
    }

    pub fn conversations_url(&self, org_id: &str) -> String {
        format!("{}/api/organizations/{}/chat_conversations", self.base_url, org_id)
    }

    pub fn completion_url(&self, org_id: &str, conversation_id: &str) -> String {
        format!("{}/{}/completion", self.conversations_url(org_id), conversation_id)
    }

    fn post(&self, url: &str, cookie: &str, accept: &str, body: String) -> Result<HttpResponse, UpstreamError> {
        let response = self
            .agent
            .post(url)
            .header("Cookie", cookie)
            .header("User-Agent", &self.user_agent)
            .header("Content-Type", "application/json")
            .header("Accept", accept)
            .send(body)
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        check_status(response)
    }

    fn create_conversation_blocking(
        &self,
        url: &str,
        cookie: &str,
        conversation_id: String,
        model: &str,
    ) -> Result<ConversationRef, UpstreamError> {
        let body = json!({
            "uuid": conversation_id,
            "name": "",
            "model": model,
        })
        .to_string();

        let mut response = self.post(url, cookie, "application/json", body)?;
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        // The service echoes the conversation; prefer its id when present.
        let echoed = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|json| json["uuid"].as_str().map(str::to_string))
            .filter(|id| !id.is_empty());

        Ok(ConversationRef {
            conversation_id: echoed.unwrap_or(conversation_id),
            parent_message_id: ROOT_PARENT_ID.to_string(),
        })
    }

    fn send_message_blocking(
        &self,
        url: &str,
        cookie: &str,
        parent_message_id: &str,
        prompt: &str,
        on_chunk: Option<ChunkSink>,
    ) -> Result<MessageReply, UpstreamError> {
        let body = json!({
            "prompt": prompt,
            "parent_message_uuid": parent_message_id,
            "timezone": "UTC",
            "attachments": [],
            "files": [],
        })
        .to_string();

        let response = self.post(url, cookie, "text/event-stream", body)?;
        let reader = BufReader::new(response.into_body().into_reader());

        let mut stream = CompletionStream::default();
        read_sse_events(reader, |event| {
            if let Some(fragment) = stream.apply(&event) {
                if let Some(sink) = &on_chunk {
                    sink(fragment);
                }
            }
        })
        .map_err(|e| UpstreamError::Transport(format!("stream interrupted: {}", e)))?;

        stream.finish(prompt)
    }
}

#[async_trait]
impl RemoteApi for WebChatClient {
    async fn create_conversation(
        &self,
        account: &Account,
        model: &str,
    ) -> Result<ConversationRef, UpstreamError> {
        let client = self.clone();
        let url = self.conversations_url(&account.org_id);
        let cookie = account.cookie_header.clone();
        let model = model.to_string();
        let conversation_id = uuid::Uuid::new_v4().to_string();

        tracing::debug!(org_id = %account.org_id, "Creating conversation");
        tokio::task::spawn_blocking(move || {
            client.create_conversation_blocking(&url, &cookie, conversation_id, &model)
        })
        .await
        .map_err(|e| UpstreamError::Transport(format!("request task failed: {}", e)))?
    }

    async fn send_message(
        &self,
        account: &Account,
        conversation: &ConversationRef,
        text: &str,
        on_chunk: Option<ChunkSink>,
    ) -> Result<MessageReply, UpstreamError> {
        let client = self.clone();
        let url = self.completion_url(&account.org_id, &conversation.conversation_id);
        let cookie = account.cookie_header.clone();
        let parent = conversation.parent_message_id.clone();
        let prompt = text.to_string();

        tracing::debug!(
            org_id = %account.org_id,
            conversation_id = %conversation.conversation_id,
            "Sending message"
        );
        tokio::task::spawn_blocking(move || {
            client.send_message_blocking(&url, &cookie, &parent, &prompt, on_chunk)
        })
        .await
        .map_err(|e| UpstreamError::Transport(format!("request task failed: {}", e)))?
    }
}

fn check_status(mut response: HttpResponse) -> Result<HttpResponse, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.body_mut().read_to_string().unwrap_or_default();
    Err(UpstreamError::Status {
        status: status.as_u16(),
        body: body.trim().chars().take(ERROR_BODY_EXCERPT_CHARS).collect(),
    })
}

#[cfg(test)]
#[path = "tests/client_tests.rs"]
mod tests;
