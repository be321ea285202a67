//! `WebAuthn` ceremonies against the backend
//!
//! Backend options arrive in the wire dialect, are transcoded for the native
//! authenticator, and the authenticator's output is transcoded back before
//! completion. A transcoding failure aborts the ceremony before anything
//! else is sent.

use super::SessionEstablishmentFlow;
use crate::error::SessionError;
use crate::transport::{ApiRequest, ApiResponse};
use crate::webauthn::{
    ApiEnvelope, AuthenticationOptions, BiometricCredential, CeremonyDirection, CeremonyTokens,
    PendingCeremony, PlatformAuthenticator, RegistrationOptions, RegistrationStartRequest,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

pub const REGISTER_START_PATH: &str = "/webauthn/register/start";
pub const REGISTER_COMPLETE_PATH: &str = "/webauthn/register/complete";
pub const AUTHENTICATE_START_PATH: &str = "/webauthn/authenticate/start";
pub const AUTHENTICATE_COMPLETE_PATH: &str = "/webauthn/authenticate/complete";
pub const CREDENTIALS_PATH: &str = "/webauthn/credentials";

fn completion_path(base: &str, pending: &PendingCeremony) -> String {
    format!("{base}/{}", urlencoding::encode(&pending.challenge_id))
}

fn credentials_path(user_id: &str) -> String {
    format!("{CREDENTIALS_PATH}/{}", urlencoding::encode(user_id))
}

/// Unwrap a `{success, message, data, error}` envelope
///
/// `Ok(None)` when the call succeeded without data. Refusals report the
/// envelope's `error` ahead of its `message`.
fn envelope_data<T: DeserializeOwned>(response: ApiResponse) -> Result<Option<T>, SessionError> {
    let status = response.status;
    if !response.is_success() {
        let message = response
            .body
            .get("error")
            .and_then(Value::as_str)
            .filter(|error| !error.is_empty())
            .map_or_else(|| response.error_message(), ToString::to_string);
        return Err(SessionError::Rejected { status, message });
    }

    let envelope: ApiEnvelope<T> = response.json()?;
    if envelope.success {
        Ok(envelope.data)
    } else {
        Err(SessionError::Rejected {
            status,
            message: envelope
                .error
                .or(envelope.message)
                .unwrap_or_else(|| "request was not successful".to_string()),
        })
    }
}

fn required<T>(data: Option<T>, what: &str) -> Result<T, SessionError> {
    data.ok_or_else(|| SessionError::InvalidResponse(format!("{what} response carried no data")))
}

impl SessionEstablishmentFlow {
    /// Register a biometric credential for the signed-in user
    ///
    /// Runs through the authenticated dispatcher; it attaches a credential to
    /// the existing identity and does not change the session.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotAuthenticated`] without a session
    /// - [`SessionError::Transcode`] for malformed ceremony data
    /// - [`SessionError::Ceremony`] when the authenticator declines
    /// - [`SessionError::Rejected`] when the backend refuses a step
    pub async fn register_biometric(
        &self,
        authenticator: &dyn PlatformAuthenticator,
        authenticator_name: Option<&str>,
    ) -> Result<(), SessionError> {
        let identity = self.session.current_identity().await?;
        let start = RegistrationStartRequest {
            user_id: identity.id,
            username: identity.username,
            authenticator_name: authenticator_name.map(ToString::to_string),
        };
        let start_body = serde_json::to_value(&start)
            .map_err(|e| SessionError::InvalidResponse(format!("cannot encode request: {e}")))?;

        let response = self
            .dispatcher
            .send(ApiRequest::post(REGISTER_START_PATH).with_json(start_body))
            .await?;
        let options: RegistrationOptions =
            required(envelope_data(response)?, "registration start")?;
        let pending = PendingCeremony {
            challenge_id: options.challenge.clone(),
            direction: CeremonyDirection::Registration,
        };

        let credential = authenticator.create(&options.to_native()?).await?;
        let complete = credential.to_wire(start.authenticator_name)?;
        let complete_body = serde_json::to_value(&complete)
            .map_err(|e| SessionError::InvalidResponse(format!("cannot encode request: {e}")))?;

        let response = self
            .dispatcher
            .send(
                ApiRequest::post(completion_path(REGISTER_COMPLETE_PATH, &pending))
                    .with_json(complete_body),
            )
            .await?;
        envelope_data::<Value>(response)?;

        log::info!("Biometric credential registered");
        Ok(())
    }

    /// Sign in with a biometric credential
    ///
    /// # Errors
    ///
    /// - [`SessionError::Transcode`] for malformed ceremony data
    /// - [`SessionError::Ceremony`] when the authenticator declines
    /// - [`SessionError::Rejected`] when the backend refuses a step
    /// - [`SessionError::InvalidResponse`] when no refresh token is issued
    pub async fn authenticate_biometric(
        &self,
        authenticator: &dyn PlatformAuthenticator,
        username: &str,
    ) -> Result<(), SessionError> {
        self.session.begin_authentication().await;
        let result = self.run_authentication(authenticator, username).await;
        if result.is_err() {
            self.session.abandon_authentication().await;
        }
        result
    }

    async fn run_authentication(
        &self,
        authenticator: &dyn PlatformAuthenticator,
        username: &str,
    ) -> Result<(), SessionError> {
        let request = ApiRequest::post(AUTHENTICATE_START_PATH).with_json(json!({"username": username}));
        let response = self.transport.execute(&request).await?;
        let options: AuthenticationOptions =
            required(envelope_data(response)?, "authentication start")?;
        let pending = PendingCeremony {
            challenge_id: options.challenge.clone(),
            direction: CeremonyDirection::Authentication,
        };

        let assertion = authenticator.get(&options.to_native()?).await?;
        let complete = assertion.to_wire()?;
        let complete_body = serde_json::to_value(&complete)
            .map_err(|e| SessionError::InvalidResponse(format!("cannot encode request: {e}")))?;

        let request = ApiRequest::post(completion_path(AUTHENTICATE_COMPLETE_PATH, &pending))
            .with_json(complete_body);
        let response = self.transport.execute(&request).await?;
        let tokens: CeremonyTokens = required(envelope_data(response)?, "authentication")?;

        let refresh_token = tokens
            .refresh_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                SessionError::InvalidResponse(
                    "biometric authentication issued no refresh token".to_string(),
                )
            })?;
        self.session
            .establish(&tokens.token, &refresh_token, tokens.expires_in)
            .await?;

        log::info!("Biometric authentication succeeded for {}", tokens.username);
        Ok(())
    }

    /// Whether the user has any biometric credential registered
    ///
    /// # Errors
    ///
    /// See [`crate::dispatcher::AuthenticatedRequestDispatcher::send`].
    pub async fn has_biometric_credentials(&self, user_id: &str) -> Result<bool, SessionError> {
        let path = format!("{}/exists", credentials_path(user_id));
        let response = self.dispatcher.get(&path).await?;
        Ok(envelope_data::<bool>(response)?.unwrap_or(false))
    }

    /// Biometric credentials registered for the user
    ///
    /// # Errors
    ///
    /// See [`crate::dispatcher::AuthenticatedRequestDispatcher::send`].
    pub async fn list_biometric_credentials(
        &self,
        user_id: &str,
    ) -> Result<Vec<BiometricCredential>, SessionError> {
        let response = self.dispatcher.get(&credentials_path(user_id)).await?;
        Ok(envelope_data(response)?.unwrap_or_default())
    }

    /// Remove one biometric credential
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] when the credential is unknown.
    pub async fn delete_biometric_credential(
        &self,
        user_id: &str,
        credential_id: &str,
    ) -> Result<(), SessionError> {
        let path = format!(
            "{}/{}",
            credentials_path(user_id),
            urlencoding::encode(credential_id)
        );
        let response = self.dispatcher.delete(&path).await?;
        envelope_data::<Value>(response)?;
        Ok(())
    }
}
