//! Buffered and streaming chat over a `RemoteApi`.

use super::allocator::{is_valid_conversation_id, ConversationAllocator};
use super::errors::RelayError;
use super::protocol::{
    ChatEvent, ChunkSink, ConversationRef, MessageReply, RemoteApi, SendOutcome, SendRequest,
    SendResult,
};
use crate::accounts::{Account, AccountStore, StoreError};
use crate::event_log::EventLog;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Routes chat requests to an account and its remote conversation.
pub struct ChatRelay {
    store: Arc<AccountStore>,
    remote: Arc<dyn RemoteApi>,
    allocator: ConversationAllocator,
    model: String,
    event_log: Option<Arc<EventLog>>,
}

impl ChatRelay {
    pub fn new(store: Arc<AccountStore>, remote: Arc<dyn RemoteApi>, model: impl Into<String>) -> Self {
        Self {
            allocator: ConversationAllocator::new(remote.clone()),
            store,
            remote,
            model: model.into(),
            event_log: None,
        }
    }

    pub fn with_event_log(mut self, event_log: Arc<EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Sends one message.
    ///
    /// Validation, account selection and conversation allocation failures are
    /// returned as `Err`. Once those pass, the account's daily counter has been
    /// bumped and it has become the active account, whatever happens upstream.
    /// In streaming mode later failures arrive as a terminal `ChatEvent::Error`.
    pub async fn send(&self, request: SendRequest) -> Result<SendOutcome, RelayError> {
        if request.text.trim().is_empty() {
            return Err(RelayError::InvalidArgument {
                message: "message text must not be empty".to_string(),
            });
        }

        let account = self.select_account(request.account_id.clone()).await?;

        let account_id = account.id.clone();
        let Some(count) = with_store(&self.store, move |store| {
            let count = store.record_request(&account_id)?;
            if count.is_some() {
                store.set_active(&account_id)?;
            }
            Ok(count)
        })
        .await?
        else {
            return Err(RelayError::NotFound {
                message: format!("account {}", account.id),
            });
        };
        tracing::info!(
            account_id = %account.id,
            daily_request_count = count,
            streaming = request.streaming,
            "Chat request"
        );
        if let Some(log) = &self.event_log {
            let reuses_conversation = request
                .conversation_id
                .as_deref()
                .is_some_and(is_valid_conversation_id);
            log.log_chat_request(&account.id, request.streaming, !reuses_conversation);
        }

        let allocation = match self
            .allocator
            .resolve(
                &account,
                request.conversation_id.as_deref(),
                request.parent_message_id.as_deref(),
                &self.model,
            )
            .await
        {
            Ok(allocation) => allocation,
            Err(err) => {
                tracing::warn!(account_id = %account.id, error = %err, "Conversation allocation failed");
                if let Some(log) = &self.event_log {
                    log.log_chat_failed(&account.id, &err.to_string());
                }
                return Err(err.into());
            }
        };
        tracing::debug!(
            account_id = %account.id,
            new_conversation = allocation.is_new(),
            "Conversation resolved"
        );
        let conversation = allocation.into_conversation();

        if request.streaming {
            Ok(SendOutcome::Streaming(self.spawn_stream(
                account,
                conversation,
                request.text,
            )))
        } else {
            self.send_buffered(account, conversation, &request.text)
                .await
                .map(SendOutcome::Buffered)
        }
    }

    async fn select_account(&self, account_id: Option<String>) -> Result<Account, RelayError> {
        match account_id {
            Some(id) => with_store(&self.store, move |store| store.require(&id)).await,
            None => with_store(&self.store, |store| store.active())
                .await?
                .ok_or_else(|| RelayError::NotFound {
                    message: "no active account".to_string(),
                }),
        }
    }

    async fn send_buffered(
        &self,
        account: Account,
        conversation: ConversationRef,
        text: &str,
    ) -> Result<SendResult, RelayError> {
        let reply = match self.remote.send_message(&account, &conversation, text, None).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(account_id = %account.id, error = %err, "Upstream send failed");
                if let Some(log) = &self.event_log {
                    log.log_chat_failed(&account.id, &err.to_string());
                }
                return Err(err.into());
            }
        };
        complete_exchange(&self.store, self.event_log.as_deref(), &account, conversation, reply).await
    }

    /// Streams one exchange. The upstream call runs in its own task so a
    /// panic there still ends the stream with exactly one terminal event.
    fn spawn_stream(
        &self,
        account: Account,
        conversation: ConversationRef,
        text: String,
    ) -> mpsc::UnboundedReceiver<ChatEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(ChatEvent::Metadata(conversation.clone()));

        let store = self.store.clone();
        let remote = self.remote.clone();
        let event_log = self.event_log.clone();
        let account_id = account.id.clone();
        let chunk_tx = tx.clone();

        let exchange = tokio::spawn(async move {
            let on_chunk: ChunkSink = Box::new(move |fragment: String| {
                let _ = chunk_tx.send(ChatEvent::Delta(fragment));
            });

            match remote
                .send_message(&account, &conversation, &text, Some(on_chunk))
                .await
            {
                Ok(reply) => {
                    match complete_exchange(&store, event_log.as_deref(), &account, conversation, reply)
                        .await
                    {
                        Ok(result) => ChatEvent::Done(result),
                        Err(err) => ChatEvent::Error(err.to_string()),
                    }
                }
                Err(err) => {
                    tracing::warn!(account_id = %account.id, error = %err, "Upstream stream failed");
                    if let Some(log) = &event_log {
                        log.log_chat_failed(&account.id, &err.to_string());
                    }
                    ChatEvent::Error(err.to_string())
                }
            }
        });

        let event_log = self.event_log.clone();
        tokio::spawn(async move {
            let terminal = match exchange.await {
                Ok(event) => event,
                Err(err) => {
                    let err = RelayError::InternalError {
                        message: format!("stream task failed: {}", err),
                    };
                    tracing::error!(account_id = %account_id, error = %err, "Stream task lost");
                    if let Some(log) = &event_log {
                        log.log_chat_failed(&account_id, &err.to_string());
                    }
                    ChatEvent::Error(err.to_string())
                }
            };
            let _ = tx.send(terminal);
        });

        rx
    }
}

/// Runs a store operation off the async workers; the store blocks on a file lock.
async fn with_store<T, F>(store: &Arc<AccountStore>, op: F) -> Result<T, RelayError>
where
    F: FnOnce(&AccountStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|e| RelayError::InternalError {
            message: format!("account store task failed: {}", e),
        })?
        .map_err(RelayError::from)
}

/// Books token usage and the conversation hint for a finished reply.
async fn complete_exchange(
    store: &Arc<AccountStore>,
    event_log: Option<&EventLog>,
    account: &Account,
    conversation: ConversationRef,
    reply: MessageReply,
) -> Result<SendResult, RelayError> {
    let account_id = account.id.clone();
    let conversation_id = conversation.conversation_id.clone();
    let (input_tokens, output_tokens) = (reply.input_tokens, reply.output_tokens);
    with_store(store, move |store| {
        store.record_usage(&account_id, input_tokens, output_tokens)?;
        store.set_conversation_hint(&account_id, &conversation_id)?;
        Ok(())
    })
    .await?;

    tracing::info!(
        account_id = %account.id,
        conversation_id = %conversation.conversation_id,
        input_tokens = reply.input_tokens,
        output_tokens = reply.output_tokens,
        "Chat complete"
    );
    if let Some(log) = event_log {
        log.log_chat_complete(
            &account.id,
            &conversation.conversation_id,
            reply.input_tokens,
            reply.output_tokens,
        );
    }

    Ok(SendResult {
        message_id: reply.message_id,
        conversation_id: conversation.conversation_id,
        parent_message_id: conversation.parent_message_id,
        content: reply.content,
        input_tokens: reply.input_tokens,
        output_tokens: reply.output_tokens,
    })
}

#[cfg(test)]
#[path = "tests/relay_tests.rs"]
mod tests;
