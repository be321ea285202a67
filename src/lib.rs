#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the stokvel-session library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod auth_api;
pub mod claims;
pub mod dispatcher;
pub mod error;
pub mod establishment;
pub mod factory;
pub mod models;
pub mod session;
pub mod settings;
pub mod transport;
pub mod utils;
pub mod vault;
pub mod webauthn;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use auth_api::AuthClient;
pub use claims::ClaimsDecoder;
pub use dispatcher::AuthenticatedRequestDispatcher;
pub use error::SessionError;
pub use establishment::{LoginOutcome, MfaChallenge, SessionEstablishmentFlow};
pub use factory::{SessionClient, SessionClientFactory};
pub use models::{Identity, Session, SessionPhase, TokenPair};
pub use session::SessionManager;
pub use settings::ClientSettings;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
pub use vault::{CredentialVault, FileStore, MemoryStore, SecureStore};
pub use webauthn::PlatformAuthenticator;
