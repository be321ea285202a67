//! Authenticated request dispatch
//!
//! Attaches the bearer token to outgoing requests and handles the server's
//! `token_expired` signal with exactly one refresh and one retry. The retry
//! is two straight-line attempts, never a loop.

use crate::error::SessionError;
use crate::session::SessionManager;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};
use crate::utils::logging::LoggingHelper;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Result of a single attempt
enum AttemptOutcome {
    /// Any response other than the expiry signal, passed through unchanged
    Completed(ApiResponse),
    /// The server rejected this access token as expired
    TokenExpired { rejected_token: String },
}

/// Sends requests on behalf of the signed-in user
#[derive(Clone)]
pub struct AuthenticatedRequestDispatcher {
    session: SessionManager,
    transport: Arc<dyn HttpTransport>,
}

impl AuthenticatedRequestDispatcher {
    #[must_use]
    pub fn new(session: SessionManager, transport: Arc<dyn HttpTransport>) -> Self {
        Self { session, transport }
    }

    /// Send a request with the session's bearer token
    ///
    /// Every status except the expiry signal, including a plain 401, is
    /// returned to the caller unchanged.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotAuthenticated`] when there is no session, or a
    ///   refresh ahead of the request could not reach the backend (nothing is sent)
    /// - [`SessionError::ReauthenticationRequired`] when the backend refuses a
    ///   refresh, or the retried request is still rejected as expired
    /// - [`SessionError::Network`] and other transport errors, unchanged
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let token = self
            .session
            .get_valid_access_token()
            .await
            .map_err(|e| match e {
                SessionError::RefreshFailed(message) => {
                    log::warn!(
                        "Refresh before {} {} failed: {message}",
                        request.method.as_str(),
                        request.path
                    );
                    SessionError::ReauthenticationRequired
                }
                other => other,
            })?;

        let rejected_token = match self.attempt(&request, token).await? {
            AttemptOutcome::Completed(response) => return Ok(response),
            AttemptOutcome::TokenExpired { rejected_token } => rejected_token,
        };
        LoggingHelper::log_token_expired(request.method.as_str(), &request.path, false);

        let token = self.session.renew(&rejected_token).await.map_err(|e| {
            log::warn!("Refresh after token_expired failed: {e}");
            SessionError::ReauthenticationRequired
        })?;

        match self.attempt(&request, token).await? {
            AttemptOutcome::Completed(response) => Ok(response),
            AttemptOutcome::TokenExpired { .. } => {
                LoggingHelper::log_token_expired(request.method.as_str(), &request.path, true);
                Err(SessionError::ReauthenticationRequired)
            }
        }
    }

    async fn attempt(&self, request: &ApiRequest, token: String) -> Result<AttemptOutcome, SessionError> {
        let response = self.transport.execute(&request.with_bearer(&token)).await?;
        if response.is_token_expired() {
            Ok(AttemptOutcome::TokenExpired {
                rejected_token: token,
            })
        } else {
            Ok(AttemptOutcome::Completed(response))
        }
    }

    /// Send a request and deserialize a 2xx body
    ///
    /// # Errors
    ///
    /// As [`AuthenticatedRequestDispatcher::send`], plus
    /// [`SessionError::Rejected`] for a non-2xx status and
    /// [`SessionError::InvalidResponse`] for an unexpected body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, SessionError> {
        self.send(request).await?.require_success()?.json()
    }

    /// `GET` a path
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedRequestDispatcher::send`].
    pub async fn get(&self, path: &str) -> Result<ApiResponse, SessionError> {
        self.send(ApiRequest::get(path)).await
    }

    /// `POST` a JSON body
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedRequestDispatcher::send`].
    pub async fn post(&self, path: &str, body: Value) -> Result<ApiResponse, SessionError> {
        self.send(ApiRequest::post(path).with_json(body)).await
    }

    /// `PUT` a JSON body
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedRequestDispatcher::send`].
    pub async fn put(&self, path: &str, body: Value) -> Result<ApiResponse, SessionError> {
        self.send(ApiRequest::put(path).with_json(body)).await
    }

    /// `DELETE` a path
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedRequestDispatcher::send`].
    pub async fn delete(&self, path: &str) -> Result<ApiResponse, SessionError> {
        self.send(ApiRequest::delete(path)).await
    }

    /// The session this dispatcher authenticates with
    #[must_use]
    pub const fn session(&self) -> &SessionManager {
        &self.session
    }
}
