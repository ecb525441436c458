//! HTTP implementation of `RemoteApi` against the web chat endpoints.

pub mod client;
pub mod sse;

pub use client::{WebChatClient, ROOT_PARENT_ID};

/// Rough token count for text the service did not meter: ceil(chars / 4).
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    chars.div_ceil(4)
}
