//! Session error taxonomy
//!
//! Every fallible operation in the crate returns [`SessionError`]. The type is
//! `Clone` so that a single refresh outcome can be handed to every caller that
//! was waiting on it.

use crate::webauthn::TranscodeError;
use thiserror::Error;

/// Errors surfaced by the session subsystem
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// There is no usable session; the user has to sign in
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The bearer token could not be decoded into an identity
    #[error("Token decode failed: {0}")]
    Decode(String),

    /// The credential vault could not be read or written
    #[error("Credential storage unavailable: {0}")]
    Storage(String),

    /// The backend rejected the refresh token; the session has been cleared
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The request was retried once after a refresh and still expired
    #[error("Authentication failed. Please login again.")]
    ReauthenticationRequired,

    /// A ceremony field was not valid Base64 in the expected dialect
    #[error("Ceremony transcoding failed: {0}")]
    Transcode(#[from] TranscodeError),

    /// The platform authenticator did not produce a credential
    #[error("Biometric ceremony failed: {0}")]
    Ceremony(String),

    /// Transport-level failure (connection, timeout); the caller may retry
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The backend answered with a success status but an unexpected body
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The client is misconfigured
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SessionError {
    /// Whether the session is over and the user has to sign in again
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated | Self::RefreshFailed(_) | Self::ReauthenticationRequired
        )
    }

    /// Whether the failure is transient, so the UI can offer a retry instead of a logout
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}
