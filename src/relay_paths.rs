//! Centralized home-based storage paths for chat-relay persistence.
//!
//! Everything lives under `~/.chat-relay/` (or `$CHAT_RELAY_HOME`):
//! - `accounts.json` - Account table (plus `.lock` / `.tmp` siblings)
//! - `config.yaml` - Optional configuration
//! - `logs/chat-relay.log` - Tracing output
//! - `logs/events.jsonl` - Structured event log

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// The name of the chat-relay directory under the user's home.
const RELAY_DIR: &str = ".chat-relay";

/// Environment variable overriding the profile directory.
pub const HOME_ENV_VAR: &str = "CHAT_RELAY_HOME";

/// Returns the profile directory: `$CHAT_RELAY_HOME` or `~/.chat-relay/`
///
/// Creates the directory if it doesn't exist.
///
/// # Errors
///
/// Returns an error if:
/// - Home directory cannot be determined
/// - Directory creation fails
pub fn relay_home_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os(HOME_ENV_VAR) {
        Some(custom) if !custom.is_empty() => PathBuf::from(custom),
        _ => dirs::home_dir()
            .context("Could not determine home directory for account storage")?
            .join(RELAY_DIR),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create relay directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the account table path: `~/.chat-relay/accounts.json`
pub fn accounts_path() -> Result<PathBuf> {
    Ok(relay_home_dir()?.join("accounts.json"))
}

/// Returns the config file path: `~/.chat-relay/config.yaml`
pub fn config_path() -> Result<PathBuf> {
    Ok(relay_home_dir()?.join("config.yaml"))
}

/// Returns the logs directory: `~/.chat-relay/logs/`
///
/// Creates the directory if it doesn't exist.
pub fn logs_dir() -> Result<PathBuf> {
    let dir = relay_home_dir()?.join("logs");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the tracing log path: `~/.chat-relay/logs/chat-relay.log`
pub fn trace_log_path() -> Result<PathBuf> {
    Ok(logs_dir()?.join("chat-relay.log"))
}
