//! Multi-account credential table.
//!
//! Accounts are harvested by the login bridge, persisted in a single JSON file
//! and selected per chat request. The table carries one active-account
//! pointer which always references a stored account or is empty.

pub mod errors;
pub mod store;
pub mod table;
pub mod types;

pub use errors::StoreError;
pub use store::{AccountStore, CredentialOutcome};
pub use types::{Account, AccountTable, Credential};
