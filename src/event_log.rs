//! Structured JSONL event log for login attempts and chat requests.
//!
//! Each line carries:
//! - A monotonic sequence number for ordering
//! - An ISO 8601 UTC timestamp with microsecond precision
//! - The invocation ID correlating all lines written by one process
//! - The emitting component and structured event data
//!
//! Secrets (session keys, cookies, message text) are never written here.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Append-only JSONL event log shared by the bridge and the relay.
pub struct EventLog {
    invocation_id: String,
    seq: AtomicU64,
    log_file: Mutex<File>,
    log_path: PathBuf,
}

/// A single log entry in JSONL format.
#[derive(Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub ts: String,
    pub invocation_id: String,
    pub component: String,
    pub event: Value,
}

impl EventLog {
    /// Opens `<logs_dir>/events.jsonl` for appending.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The logs directory cannot be created
    /// - The log file cannot be opened
    pub fn new(invocation_id: &str, logs_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(logs_dir)?;
        let log_path = logs_dir.join("events.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            invocation_id: invocation_id.to_string(),
            seq: AtomicU64::new(0),
            log_file: Mutex::new(file),
            log_path,
        })
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Logs a structured event. Thread-safe; write failures are dropped.
    pub fn log(&self, component: &str, event: impl Serialize) {
        let entry = LogEntry {
            seq: self.next_seq(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            invocation_id: self.invocation_id.clone(),
            component: component.to_string(),
            event: serde_json::to_value(event).unwrap_or(Value::Null),
        };

        if let Ok(mut file) = self.log_file.lock() {
            if let Ok(line) = serde_json::to_string(&entry) {
                let _ = writeln!(file, "{}", line);
                let _ = file.flush();
            }
        }
    }

    pub fn log_login_started(&self, command: &str, timeout_secs: u64) {
        self.log(
            "SessionBridge",
            serde_json::json!({
                "type": "LoginStarted",
                "command": command,
                "timeout_secs": timeout_secs
            }),
        );
    }

    /// Logs the single outcome of a login attempt (`outcome` is "success" or a failure kind).
    pub fn log_login_finished(&self, outcome: &str, org_id: Option<&str>) {
        self.log(
            "SessionBridge",
            serde_json::json!({
                "type": "LoginFinished",
                "outcome": outcome,
                "org_id": org_id
            }),
        );
    }

    pub fn log_chat_request(&self, account_id: &str, streaming: bool, new_conversation: bool) {
        self.log(
            "ChatRelay",
            serde_json::json!({
                "type": "ChatRequest",
                "account_id": account_id,
                "streaming": streaming,
                "new_conversation": new_conversation
            }),
        );
    }

    pub fn log_chat_complete(
        &self,
        account_id: &str,
        conversation_id: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) {
        self.log(
            "ChatRelay",
            serde_json::json!({
                "type": "ChatComplete",
                "account_id": account_id,
                "conversation_id": conversation_id,
                "input_tokens": input_tokens,
                "output_tokens": output_tokens
            }),
        );
    }

    pub fn log_chat_failed(&self, account_id: &str, error: &str) {
        self.log(
            "ChatRelay",
            serde_json::json!({
                "type": "ChatFailed",
                "account_id": account_id,
                "error": error
            }),
        );
    }

    pub fn log_account_change(&self, action: &str, account_id: &str) {
        self.log(
            "AccountStore",
            serde_json::json!({
                "type": "AccountChange",
                "action": action,
                "account_id": account_id
            }),
        );
    }

    /// Flushes buffered output. Called once at shutdown.
    pub fn flush(&self) {
        if let Ok(mut file) = self.log_file.lock() {
            let _ = file.flush();
        }
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}
