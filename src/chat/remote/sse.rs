//! Server-Sent Events parsing for completion responses.

use crate::chat::errors::UpstreamError;
use crate::chat::protocol::MessageReply;
use serde_json::Value;
use std::io::BufRead;

/// A single SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, if any.
    pub event: Option<String>,
    /// The joined `data:` lines.
    pub data: String,
}

/// Reads events from `reader`, calling `on_event` for each, until EOF.
///
/// An empty line ends an event. `id:`, `retry:` and comment lines are ignored.
pub fn read_sse_events<R: BufRead>(
    reader: R,
    mut on_event: impl FnMut(SseEvent),
) -> std::io::Result<()> {
    let mut current_event: Option<String> = None;
    let mut current_data = String::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.strip_suffix('\r').unwrap_or(&line);

        if line.is_empty() {
            if !current_data.is_empty() {
                on_event(SseEvent {
                    event: current_event.take(),
                    data: std::mem::take(&mut current_data),
                });
            }
            current_event = None;
            continue;
        }

        if let Some(event_type) = field_value(line, "event") {
            current_event = Some(event_type.to_string());
        } else if let Some(data) = field_value(line, "data") {
            if !current_data.is_empty() {
                current_data.push('\n');
            }
            current_data.push_str(data);
        }
    }

    if !current_data.is_empty() {
        on_event(SseEvent {
            event: current_event,
            data: current_data,
        });
    }
    Ok(())
}

/// `name: value` or `name:value`.
fn field_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Folds completion events into a `MessageReply`.
#[derive(Debug, Default)]
pub struct CompletionStream {
    message_id: Option<String>,
    content: String,
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    error: Option<String>,
}

impl CompletionStream {
    /// Applies one event; returns the text fragment it carried, if any.
    pub fn apply(&mut self, event: &SseEvent) -> Option<String> {
        if event.data.trim() == "[DONE]" {
            return None;
        }
        let Ok(json) = serde_json::from_str::<Value>(&event.data) else {
            tracing::debug!(event = ?event.event, "Skipping non-JSON SSE payload");
            return None;
        };
        let kind = json
            .get("type")
            .and_then(Value::as_str)
            .or(event.event.as_deref())
            .unwrap_or_default();

        match kind {
            "message_start" => {
                let message = &json["message"];
                if self.message_id.is_none() {
                    self.message_id = first_str(message, &["uuid", "id"]);
                }
                self.take_usage(&message["usage"]);
                None
            }
            "content_block_delta" => {
                let text = json["delta"]["text"].as_str()?;
                self.push_fragment(text)
            }
            "completion" => {
                if self.message_id.is_none() {
                    self.message_id = first_str(&json, &["uuid", "id"]);
                }
                let text = json["completion"].as_str()?;
                self.push_fragment(text)
            }
            "message_delta" => {
                self.take_usage(&json["usage"]);
                None
            }
            "error" => {
                let message = json["error"]["message"]
                    .as_str()
                    .or_else(|| json["error"].as_str())
                    .or_else(|| json["message"].as_str())
                    .unwrap_or("upstream reported an error");
                self.error = Some(message.to_string());
                None
            }
            _ => None,
        }
    }

    /// Finishes the reply, estimating token counts the service did not report.
    pub fn finish(self, prompt: &str) -> Result<MessageReply, UpstreamError> {
        if let Some(error) = self.error {
            return Err(UpstreamError::Remote(error));
        }
        let input_tokens = self
            .input_tokens
            .unwrap_or_else(|| super::estimate_tokens(prompt));
        let output_tokens = self
            .output_tokens
            .unwrap_or_else(|| super::estimate_tokens(&self.content));
        Ok(MessageReply {
            message_id: self
                .message_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            content: self.content,
            input_tokens,
            output_tokens,
        })
    }

    fn push_fragment(&mut self, text: &str) -> Option<String> {
        if text.is_empty() {
            return None;
        }
        self.content.push_str(text);
        Some(text.to_string())
    }

    fn take_usage(&mut self, usage: &Value) {
        if let Some(input) = usage["input_tokens"].as_u64() {
            self.input_tokens = Some(input);
        }
        if let Some(output) = usage["output_tokens"].as_u64() {
            self.output_tokens = Some(output);
        }
    }
}

fn first_str(json: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| json[*key].as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
#[path = "tests/sse_tests.rs"]
mod tests;
