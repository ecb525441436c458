//! Types exchanged between the relay, its callers and the remote API.

use super::errors::UpstreamError;
use crate::accounts::Account;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Remote thread coordinates for one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRef {
    pub conversation_id: String,
    pub parent_message_id: String,
}

/// What the remote API returns for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReply {
    pub message_id: String,
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendRequest {
    /// `None` selects the active account.
    pub account_id: Option<String>,
    pub conversation_id: Option<String>,
    pub parent_message_id: Option<String>,
    pub text: String,
    pub streaming: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub message_id: String,
    pub conversation_id: String,
    pub parent_message_id: String,
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Items of a streamed reply.
///
/// A stream is `Metadata`, zero or more `Delta`s, then exactly one of
/// `Done` or `Error`, after which the channel closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Metadata(ConversationRef),
    Delta(String),
    Done(SendResult),
    Error(String),
}

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Error(_))
    }
}

#[derive(Debug)]
pub enum SendOutcome {
    Buffered(SendResult),
    Streaming(mpsc::UnboundedReceiver<ChatEvent>),
}

/// Callback receiving each reply fragment as it arrives.
pub type ChunkSink = Box<dyn Fn(String) + Send + Sync>;

/// Minimal client surface of the remote chat service.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Creates a fresh conversation owned by `account`.
    async fn create_conversation(
        &self,
        account: &Account,
        model: &str,
    ) -> Result<ConversationRef, UpstreamError>;

    /// Sends `text` into `conversation`. When `on_chunk` is given it is
    /// called once per fragment, in order, before this call resolves.
    async fn send_message(
        &self,
        account: &Account,
        conversation: &ConversationRef,
        text: &str,
        on_chunk: Option<ChunkSink>,
    ) -> Result<MessageReply, UpstreamError>;
}
