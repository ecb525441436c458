//! Data types for stored accounts.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Format of `Account::last_request_date` (UTC calendar date).
pub const REQUEST_DATE_FORMAT: &str = "%Y-%m-%d";

/// Proof of a signed-in browser session, as harvested by the login helper.
///
/// Ephemeral: consumed immediately to build or refresh an `Account`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub session_key: String,
    pub org_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub cookie_header: Option<String>,
}

impl Credential {
    /// Cookie header to send upstream; defaults to the bare session key cookie.
    pub fn effective_cookie_header(&self) -> String {
        match &self.cookie_header {
            Some(header) if !header.trim().is_empty() => header.clone(),
            _ => format!("sessionKey={}", self.session_key),
        }
    }
}

/// A persisted identity: a credential plus usage accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub org_id: String,
    pub session_key: String,
    pub cookie_header: String,
    pub created_at: String,
    pub last_used_at: String,
    /// Only meaningful relative to `last_request_date`.
    #[serde(default)]
    pub daily_request_count: u32,
    #[serde(default)]
    pub last_request_date: Option<String>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    /// Hint only; never treated as authoritative conversation state.
    #[serde(default)]
    pub active_conversation_id: Option<String>,
}

impl Account {
    /// Builds a fresh account from a credential.
    ///
    /// The display name falls back to the email, then to `fallback_name`.
    pub fn from_credential(credential: Credential, fallback_name: &str, now: DateTime<Utc>) -> Self {
        let cookie_header = credential.effective_cookie_header();
        let display_name = credential
            .display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| credential.email.clone().filter(|e| !e.trim().is_empty()))
            .unwrap_or_else(|| fallback_name.to_string());
        let timestamp = now.to_rfc3339();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            display_name,
            email: credential.email,
            org_id: credential.org_id,
            session_key: credential.session_key,
            cookie_header,
            created_at: timestamp.clone(),
            last_used_at: timestamp,
            daily_request_count: 0,
            last_request_date: None,
            input_tokens: 0,
            output_tokens: 0,
            active_conversation_id: None,
        }
    }

    /// Replaces the session fields with a newer credential for the same organization.
    pub fn refresh_credential(&mut self, credential: Credential) {
        self.cookie_header = credential.effective_cookie_header();
        self.session_key = credential.session_key;
        if let Some(email) = credential.email.filter(|e| !e.trim().is_empty()) {
            self.email = Some(email);
        }
        if let Some(name) = credential.display_name.filter(|n| !n.trim().is_empty()) {
            self.display_name = name;
        }
    }

    /// Requests made on `today`; a counter from an earlier date reads as zero.
    pub fn requests_on(&self, today: NaiveDate) -> u32 {
        if self.last_request_date.as_deref() == Some(format_request_date(today).as_str()) {
            self.daily_request_count
        } else {
            0
        }
    }

    /// Session key with everything but the first and last four characters hidden.
    pub fn masked_session_key(&self) -> String {
        let chars: Vec<char> = self.session_key.chars().collect();
        if chars.len() <= 12 {
            return "*".repeat(chars.len());
        }
        let head: String = chars.iter().take(4).collect();
        let tail: String = chars.iter().skip(chars.len() - 4).collect();
        format!("{}…{}", head, tail)
    }
}

pub fn format_request_date(date: NaiveDate) -> String {
    date.format(REQUEST_DATE_FORMAT).to_string()
}

/// The persisted table: every account plus the active pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountTable {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub active_account_id: Option<String>,
}

impl AccountTable {
    pub fn find(&self, id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|a| a.id == id)
    }

    /// The active account, if the pointer references a stored account.
    pub fn active(&self) -> Option<&Account> {
        self.active_account_id
            .as_deref()
            .and_then(|id| self.find(id))
    }
}

#[cfg(test)]
#[path = "tests/types_tests.rs"]
mod tests;
