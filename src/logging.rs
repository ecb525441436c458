//! Tracing subscriber setup.
//!
//! The relay is an interactive CLI, so tracing output goes to
//! `~/.chat-relay/logs/chat-relay.log` rather than the terminal.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "chat_relay=info";

/// Initialise the global tracing subscriber, appending to `log_path`.
///
/// Call once at startup; a second call fails because the global default is
/// already set.
pub fn init_tracing(log_path: &Path, verbose: bool) -> Result<()> {
    let default_filter = if verbose {
        "chat_relay=debug"
    } else {
        DEFAULT_FILTER
    };
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}
