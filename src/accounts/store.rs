//! File-backed account table.

use super::errors::StoreError;
use super::types::{Account, AccountTable, Credential};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Result of storing a freshly harvested credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialOutcome {
    /// A new account was appended.
    Created(Account),
    /// An account for the same organization already existed and was refreshed.
    Refreshed(Account),
}

impl CredentialOutcome {
    pub fn account(&self) -> &Account {
        match self {
            Self::Created(account) | Self::Refreshed(account) => account,
        }
    }
}

/// Persistent table of accounts plus the active-account pointer.
///
/// Every operation re-reads the file; every mutation rewrites it in full via a
/// temporary file and rename. Operations are serialized in-process by a mutex
/// and across processes by an advisory lock on `<table>.lock`.
pub struct AccountStore {
    path: PathBuf,
    lock_path: PathBuf,
    guard: Mutex<()>,
}

impl AccountStore {
    /// Opens (without creating) the table at `path`. A missing file reads as empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::storage("failed to create account directory", e))?;
        }
        let lock_path = sibling(&path, "lock");
        Ok(Self {
            path,
            lock_path,
            guard: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn list(&self) -> Result<Vec<Account>, StoreError> {
        self.with_table(|table| table.accounts.clone())
    }

    pub fn get(&self, id: &str) -> Result<Option<Account>, StoreError> {
        self.with_table(|table| table.find(id).cloned())
    }

    /// Like `get`, but an unknown id is an error.
    pub fn require(&self, id: &str) -> Result<Account, StoreError> {
        self.get(id)?.ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    pub fn active(&self) -> Result<Option<Account>, StoreError> {
        self.with_table(|table| table.active().cloned())
    }

    pub fn add(&self, account: Account) -> Result<(), StoreError> {
        let id = account.id.clone();
        self.mutate(|table| table.insert(account))?;
        tracing::info!(account_id = %id, "Account added");
        Ok(())
    }

    /// Stores a credential, refreshing the existing account for the same
    /// organization instead of creating a duplicate.
    pub fn add_credential(&self, credential: Credential) -> Result<CredentialOutcome, StoreError> {
        let outcome = self.mutate(|table| {
            if let Some(existing) = table
                .accounts
                .iter_mut()
                .find(|a| a.org_id == credential.org_id)
            {
                existing.refresh_credential(credential);
                return Ok(CredentialOutcome::Refreshed(existing.clone()));
            }
            let fallback = format!("Account {}", table.accounts.len() + 1);
            let account = Account::from_credential(credential, &fallback, Utc::now());
            table.insert(account.clone())?;
            Ok(CredentialOutcome::Created(account))
        })?;

        match &outcome {
            CredentialOutcome::Created(account) => {
                tracing::info!(account_id = %account.id, "Account created from credential")
            }
            CredentialOutcome::Refreshed(account) => {
                tracing::info!(account_id = %account.id, "Account credential refreshed")
            }
        }
        Ok(outcome)
    }

    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let removed = self.mutate(|table| Ok(table.remove(id)))?;
        if removed {
            tracing::info!(account_id = %id, "Account removed");
        }
        Ok(removed)
    }

    pub fn set_active(&self, id: &str) -> Result<bool, StoreError> {
        self.mutate(|table| Ok(table.set_active(id)))
    }

    pub fn record_usage(
        &self,
        id: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<bool, StoreError> {
        self.mutate(|table| Ok(table.record_usage(id, input_tokens, output_tokens)))
    }

    /// Counts one request against today's (UTC) quota. `None` for unknown ids.
    pub fn record_request(&self, id: &str) -> Result<Option<u32>, StoreError> {
        self.record_request_at(id, Utc::now())
    }

    pub fn record_request_at(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, StoreError> {
        let count = self.mutate(|table| Ok(table.record_request(id, now)))?;
        if let Some(count) = count {
            tracing::debug!(account_id = %id, daily_request_count = count, "Request recorded");
        }
        Ok(count)
    }

    pub fn rename(&self, id: &str, display_name: &str) -> Result<bool, StoreError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(StoreError::InvalidState {
                message: "display name must not be empty".to_string(),
            });
        }
        self.mutate(|table| Ok(table.rename(id, display_name)))
    }

    pub fn set_conversation_hint(&self, id: &str, conversation_id: &str) -> Result<bool, StoreError> {
        self.mutate(|table| Ok(table.set_conversation_hint(id, conversation_id)))
    }

    fn with_table<R>(&self, f: impl FnOnce(&AccountTable) -> R) -> Result<R, StoreError> {
        let _guard = self.lock_in_process();
        let lock_file = self.open_lock_file()?;
        FileExt::lock_shared(&lock_file)
            .map_err(|e| StoreError::storage("failed to lock account table", e))?;

        let table = self.read_table()?;
        Ok(f(&table))
    }

    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut AccountTable) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let _guard = self.lock_in_process();
        let lock_file = self.open_lock_file()?;
        lock_file
            .lock_exclusive()
            .map_err(|e| StoreError::storage("failed to lock account table", e))?;

        let mut table = self.read_table()?;
        let result = f(&mut table)?;
        self.write_table(&table)?;
        Ok(result)
    }

    fn lock_in_process(&self) -> MutexGuard<'_, ()> {
        // Nothing is shared behind the mutex, so a poisoned guard is still usable.
        self.guard.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn open_lock_file(&self) -> Result<File, StoreError> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| StoreError::storage("failed to open account lock file", e))
    }

    fn read_table(&self) -> Result<AccountTable, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(AccountTable::default()),
            Err(e) => return Err(StoreError::storage("failed to read account table", e)),
        };
        if content.trim().is_empty() {
            return Ok(AccountTable::default());
        }
        serde_json::from_str(&content).map_err(|e| StoreError::InvalidState {
            message: format!("unreadable account table {}: {}", self.path.display(), e),
        })
    }

    fn write_table(&self, table: &AccountTable) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(table)
            .map_err(|e| StoreError::storage("failed to serialize account table", e))?;
        let temp_path = sibling(&self.path, "tmp");
        fs::write(&temp_path, content)
            .map_err(|e| StoreError::storage("failed to write account table", e))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|e| StoreError::storage("failed to replace account table", e))?;
        Ok(())
    }
}

/// `accounts.json` -> `accounts.json.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
