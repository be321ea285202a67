//! Credential vault
//!
//! [`CredentialVault`] applies the session storage policy (fixed keys,
//! multi-key atomicity, rollback) on top of any [`SecureStore`] backend.

mod credential_vault;
mod store;

pub use credential_vault::{CredentialVault, StoredTokens};
pub use store::{FileStore, MemoryStore, SecureStore};
