//! Multi-account chat relay.
//!
//! - [`session_bridge`] drives an interactive browser login and harvests a credential.
//! - [`accounts`] persists accounts with their active pointer and usage counters.
//! - [`chat`] relays buffered or streamed messages through a [`chat::RemoteApi`].

pub mod accounts;
pub mod chat;
pub mod config;
pub mod event_log;
pub mod logging;
pub mod relay_paths;
pub mod session_bridge;
pub mod transport;
