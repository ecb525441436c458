//! In-memory invariants of the account table.
//!
//! `AccountStore` loads the table, applies exactly one of these operations and
//! writes the whole table back. Keeping them free of I/O lets the invariants be
//! tested directly.

use super::errors::StoreError;
use super::types::{format_request_date, Account, AccountTable};
use chrono::{DateTime, Utc};

impl AccountTable {
    /// Appends an account. The first account ever stored becomes active;
    /// later inserts never move the active pointer.
    pub fn insert(&mut self, account: Account) -> Result<(), StoreError> {
        if self.find(&account.id).is_some() {
            return Err(StoreError::InvalidState {
                message: format!("duplicate account id {}", account.id),
            });
        }
        if self.accounts.is_empty() {
            self.active_account_id = Some(account.id.clone());
        }
        self.accounts.push(account);
        Ok(())
    }

    /// Removes an account. Removing the active account promotes the account at
    /// the lowest remaining index, or clears the pointer when none remain.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(index) = self.accounts.iter().position(|a| a.id == id) else {
            return false;
        };
        self.accounts.remove(index);

        if self.active_account_id.as_deref() == Some(id) {
            self.active_account_id = self.accounts.first().map(|a| a.id.clone());
        }
        true
    }

    /// Points the active pointer at `id`; unknown ids leave the table untouched.
    pub fn set_active(&mut self, id: &str) -> bool {
        if self.find(id).is_none() {
            return false;
        }
        self.active_account_id = Some(id.to_string());
        true
    }

    /// Increments the daily counter, resetting it first when the stored date
    /// differs from `now`'s UTC date. Returns the new count.
    pub fn record_request(&mut self, id: &str, now: DateTime<Utc>) -> Option<u32> {
        let account = self.find_mut(id)?;
        let today = format_request_date(now.date_naive());

        if account.last_request_date.as_deref() != Some(today.as_str()) {
            account.daily_request_count = 0;
            account.last_request_date = Some(today);
        }
        account.daily_request_count = account.daily_request_count.saturating_add(1);
        account.last_used_at = now.to_rfc3339();
        Some(account.daily_request_count)
    }

    /// Adds token counts to the account's lifetime totals.
    pub fn record_usage(&mut self, id: &str, input_tokens: u64, output_tokens: u64) -> bool {
        let Some(account) = self.find_mut(id) else {
            return false;
        };
        account.input_tokens = account.input_tokens.saturating_add(input_tokens);
        account.output_tokens = account.output_tokens.saturating_add(output_tokens);
        true
    }

    pub fn rename(&mut self, id: &str, display_name: &str) -> bool {
        let Some(account) = self.find_mut(id) else {
            return false;
        };
        account.display_name = display_name.to_string();
        true
    }

    pub fn set_conversation_hint(&mut self, id: &str, conversation_id: &str) -> bool {
        let Some(account) = self.find_mut(id) else {
            return false;
        };
        account.active_conversation_id = Some(conversation_id.to_string());
        true
    }
}

#[cfg(test)]
#[path = "tests/table_tests.rs"]
mod tests;
