//! Unified testing utilities for stokvel-session
//!
//! Compiled for unit tests and, behind the `testing` feature, for the
//! integration suites under `tests/`.
//!
//! ## Organization
//!
//! - [`fixtures`] - Pre-built test data (identities, unsigned tokens, ceremony payloads)
//! - [`mock`] - Scripted transport, failure-injecting store and a fake authenticator
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stokvel_session::testing::{fixtures::TestFixtures, mock::MockTransport};
//!
//! let transport = Arc::new(MockTransport::new());
//! transport.respond("/auth/refresh", 200, serde_json::json!({"access_token": "A2"}));
//! let manager = TestFixtures::session_manager(transport.clone());
//! ```

pub mod fixtures;
pub mod mock;

// Re-export commonly used items for convenience
pub use fixtures::{TestFixtures, TestTokens};
pub use mock::{FlakyStore, MockAuthenticator, MockTransport};

/// Common test constants
pub mod constants {
    /// Default test user id
    pub const TEST_USER_ID: &str = "user-123";

    /// Default test email address
    pub const TEST_EMAIL: &str = "thandi@example.com";

    /// Default test username
    pub const TEST_USERNAME: &str = "thandi";

    /// Default test password
    pub const TEST_PASSWORD: &str = "correct-horse";
}
