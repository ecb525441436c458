//! Decides whether a caller-supplied conversation id can be reused.

use super::errors::UpstreamError;
use super::protocol::{ConversationRef, RemoteApi};
use crate::accounts::Account;
use regex::Regex;
use std::sync::{Arc, OnceLock};

const CONVERSATION_ID_PATTERN: &str =
    r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$";

/// True for a canonical hyphenated UUID (36 chars, any case).
pub fn is_valid_conversation_id(id: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    match PATTERN.get_or_init(|| Regex::new(CONVERSATION_ID_PATTERN).ok()) {
        Some(re) => re.is_match(id),
        None => id.len() == 36 && uuid::Uuid::parse_str(id).is_ok(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    /// The caller's conversation id was used as given.
    Reused(ConversationRef),
    /// A new conversation was created upstream.
    Created(ConversationRef),
}

impl Allocation {
    pub fn into_conversation(self) -> ConversationRef {
        match self {
            Self::Reused(conversation) | Self::Created(conversation) => conversation,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

pub struct ConversationAllocator {
    remote: Arc<dyn RemoteApi>,
}

impl ConversationAllocator {
    pub fn new(remote: Arc<dyn RemoteApi>) -> Self {
        Self { remote }
    }

    /// Resolves the thread for one exchange.
    ///
    /// A missing or malformed `conversation_id` creates exactly one new
    /// conversation. A valid one is reused verbatim, and a missing
    /// `parent_message_id` then defaults to the conversation id itself.
    pub async fn resolve(
        &self,
        account: &Account,
        conversation_id: Option<&str>,
        parent_message_id: Option<&str>,
        model: &str,
    ) -> Result<Allocation, UpstreamError> {
        match conversation_id {
            Some(id) if is_valid_conversation_id(id) => {
                let parent = parent_message_id
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or(id);
                Ok(Allocation::Reused(ConversationRef {
                    conversation_id: id.to_string(),
                    parent_message_id: parent.to_string(),
                }))
            }
            other => {
                if let Some(rejected) = other {
                    tracing::debug!(conversation_id = %rejected, "Ignoring malformed conversation id");
                }
                let conversation = self.remote.create_conversation(account, model).await?;
                tracing::debug!(conversation_id = %conversation.conversation_id, "Created conversation");
                Ok(Allocation::Created(conversation))
            }
        }
    }
}
