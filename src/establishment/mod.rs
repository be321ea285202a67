//! Session establishment
//!
//! Turns a successful password login (optionally stepped up with an OTP) or
//! a completed `WebAuthn` ceremony into an established session. Flows only
//! ever write credentials through [`SessionManager::establish`], never into
//! the vault directly.
//!
//! # Modules
//!
//! - [`password`] - Password login, MFA verification, logout and validation
//! - [`biometric`] - `WebAuthn` registration/authentication and credential management

pub mod biometric;
pub mod password;

use crate::auth_api::{AuthClient, SessionGrant};
use crate::dispatcher::AuthenticatedRequestDispatcher;
use crate::error::SessionError;
use crate::session::SessionManager;
use crate::transport::HttpTransport;
use std::fmt;
use std::sync::Arc;

/// Result of a password login
#[derive(Debug)]
pub enum LoginOutcome {
    /// The session is established and usable
    Established,
    /// A one-time code was sent; complete with [`SessionEstablishmentFlow::verify_mfa`]
    MfaRequired(MfaChallenge),
}

/// Step-up challenge issued by a password login
///
/// Owned by the caller and consumed by nobody else: it is neither `Clone`
/// nor cached, so the temporary session id dies with it.
pub struct MfaChallenge {
    pub email: String,
    pub message: Option<String>,
    temp_session: String,
}

impl MfaChallenge {
    fn new(email: String, temp_session: String, message: Option<String>) -> Self {
        Self {
            email,
            message,
            temp_session,
        }
    }
}

impl fmt::Debug for MfaChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MfaChallenge")
            .field("email", &self.email)
            .field("message", &self.message)
            .field("temp_session", &"<redacted>")
            .finish()
    }
}

/// Entry point for every way of obtaining a session
#[derive(Clone)]
pub struct SessionEstablishmentFlow {
    session: SessionManager,
    auth: AuthClient,
    transport: Arc<dyn HttpTransport>,
    dispatcher: AuthenticatedRequestDispatcher,
}

impl SessionEstablishmentFlow {
    #[must_use]
    pub fn new(
        session: SessionManager,
        auth: AuthClient,
        transport: Arc<dyn HttpTransport>,
        dispatcher: AuthenticatedRequestDispatcher,
    ) -> Self {
        Self {
            session,
            auth,
            transport,
            dispatcher,
        }
    }

    /// The session this flow establishes into
    #[must_use]
    pub const fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Install a login or MFA grant
    async fn install(&self, grant: SessionGrant) -> Result<(), SessionError> {
        let refresh_token = grant.tokens.refresh_token.ok_or_else(|| {
            SessionError::InvalidResponse("grant carried no refresh token".to_string())
        })?;
        self.session
            .establish(
                &grant.tokens.access_token,
                &refresh_token,
                grant.tokens.expires_in,
            )
            .await?;

        if let Some(user) = grant.user {
            // The identity can still be decoded from the token later
            if let Err(e) = self.session.cache_identity(user).await {
                log::warn!("Could not cache user record from login response: {e}");
            }
        }
        Ok(())
    }
}
