use super::{LoginOutcome, MfaChallenge, SessionEstablishmentFlow};
use crate::auth_api::LoginResponse;
use crate::error::SessionError;

impl SessionEstablishmentFlow {
    /// Password login
    ///
    /// Establishes the session directly, or returns the MFA challenge to be
    /// completed with [`SessionEstablishmentFlow::verify_mfa`].
    ///
    /// # Errors
    ///
    /// - [`SessionError::Rejected`] for refused credentials
    /// - [`SessionError::Network`] when the backend cannot be reached
    /// - [`SessionError::Storage`] when the session cannot be persisted
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, SessionError> {
        self.session.begin_authentication().await;

        let outcome = match self.auth.login(username, password).await {
            Ok(LoginResponse::Granted(grant)) => self.install(grant).await.map(|()| {
                log::info!("Password login succeeded");
                LoginOutcome::Established
            }),
            Ok(LoginResponse::MfaRequired {
                email,
                temp_session,
                message,
            }) => {
                log::info!("Password accepted, one-time code required");
                return Ok(LoginOutcome::MfaRequired(MfaChallenge::new(
                    email,
                    temp_session,
                    message,
                )));
            }
            Err(e) => Err(e),
        };

        if outcome.is_err() {
            self.session.abandon_authentication().await;
        }
        outcome
    }

    /// Complete a login with the one-time code
    ///
    /// The session is established only when the backend accepts the code;
    /// after a rejected code the same challenge can be retried.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Rejected`] for a wrong or expired code
    /// - [`SessionError::Network`] when the backend cannot be reached
    pub async fn verify_mfa(&self, challenge: &MfaChallenge, otp_code: &str) -> Result<(), SessionError> {
        let grant = self
            .auth
            .verify_mfa(&challenge.email, otp_code, &challenge.temp_session)
            .await?;
        self.install(grant).await?;
        log::info!("MFA verification succeeded");
        Ok(())
    }

    /// Ask the backend to send a new one-time code
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] or [`SessionError::Network`].
    pub async fn resend_mfa(&self, challenge: &MfaChallenge) -> Result<(), SessionError> {
        self.auth.resend_mfa(&challenge.email).await
    }

    /// Give up on an MFA challenge
    pub async fn cancel_mfa(&self, challenge: MfaChallenge) {
        drop(challenge);
        self.session.abandon_authentication().await;
    }

    /// Sign out: best-effort backend logout, then local teardown
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the vault could not be cleared;
    /// backend failures are ignored.
    pub async fn logout(&self) -> Result<(), SessionError> {
        if let Some(token) = self.session.current_access_token().await {
            if let Err(e) = self.auth.logout(&token).await {
                log::warn!("Backend logout failed, clearing local session anyway: {e}");
            }
        }
        self.session.invalidate().await
    }

    /// Ask the backend whether the current session is still valid
    ///
    /// Returns `false` without a session or when the session just ended.
    ///
    /// # Errors
    ///
    /// Returns non-terminal errors such as [`SessionError::Network`].
    pub async fn validate(&self) -> Result<bool, SessionError> {
        match self.session.get_valid_access_token().await {
            Ok(token) => self.auth.validate(&token).await,
            Err(e) if e.is_terminal() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
