//! Typed client for the backend `/auth` endpoints

use crate::error::SessionError;
use crate::models::{Identity, TokenPair};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const LOGIN_PATH: &str = "/auth/login";
pub const VERIFY_MFA_PATH: &str = "/auth/verify-mfa";
pub const RESEND_MFA_PATH: &str = "/auth/mfa/resend";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const VALIDATE_PATH: &str = "/auth/validate";

/// Tokens issued by a login or MFA verification, with the user record if sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    pub tokens: TokenPair,
    pub user: Option<Identity>,
}

/// Outcome of `POST /auth/login`
#[derive(Debug, PartialEq, Eq)]
pub enum LoginResponse {
    Granted(SessionGrant),
    MfaRequired {
        email: String,
        temp_session: String,
        message: Option<String>,
    },
}

#[derive(Deserialize)]
struct MfaRequiredBody {
    email: String,
    #[serde(alias = "tempSession")]
    temp_session: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ValidateBody {
    #[serde(default)]
    valid: Option<bool>,
}

/// Client for the authentication endpoints
///
/// Calls here are unauthenticated or carry an explicit token; they never go
/// through the dispatcher's refresh-and-retry.
#[derive(Clone)]
pub struct AuthClient {
    transport: Arc<dyn HttpTransport>,
}

impl AuthClient {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// `POST /auth/login`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] for refused credentials,
    /// [`SessionError::Network`] for transport failures and
    /// [`SessionError::InvalidResponse`] for an unexpected body.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, SessionError> {
        let request = ApiRequest::post(LOGIN_PATH)
            .with_json(json!({"username": username, "password": password}));
        let response = self.transport.execute(&request).await?.require_success()?;

        let mfa_required = response
            .body
            .get("mfa_required")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if mfa_required {
            let body: MfaRequiredBody = response.json()?;
            return Ok(LoginResponse::MfaRequired {
                email: body.email,
                temp_session: body.temp_session,
                message: body.message,
            });
        }

        session_grant(response).map(LoginResponse::Granted)
    }

    /// `POST /auth/verify-mfa`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] for a wrong or expired code.
    pub async fn verify_mfa(
        &self,
        email: &str,
        otp_code: &str,
        temp_session: &str,
    ) -> Result<SessionGrant, SessionError> {
        let request = ApiRequest::post(VERIFY_MFA_PATH).with_json(json!({
            "email": email,
            "otpCode": otp_code,
            "tempSession": temp_session,
        }));
        let response = self.transport.execute(&request).await?.require_success()?;
        session_grant(response)
    }

    /// `POST /auth/mfa/resend`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] if the backend refuses to resend.
    pub async fn resend_mfa(&self, email: &str) -> Result<(), SessionError> {
        let request = ApiRequest::post(RESEND_MFA_PATH).with_json(json!({"email": email}));
        self.transport.execute(&request).await?.require_success()?;
        Ok(())
    }

    /// `POST /auth/refresh`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] when the refresh token is refused,
    /// [`SessionError::Network`] when the backend could not be reached.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SessionError> {
        let request =
            ApiRequest::post(REFRESH_PATH).with_json(json!({"refreshToken": refresh_token}));
        let response = self.transport.execute(&request).await?.require_success()?;
        let tokens: TokenPair = response.json()?;
        if tokens.access_token.is_empty() {
            return Err(SessionError::InvalidResponse(
                "refresh response carried an empty access token".to_string(),
            ));
        }
        Ok(tokens)
    }

    /// `POST /auth/logout` with the session's bearer token
    ///
    /// # Errors
    ///
    /// Returns the transport or rejection error; callers treat logout as best effort.
    pub async fn logout(&self, access_token: &str) -> Result<(), SessionError> {
        let request = ApiRequest::post(LOGOUT_PATH).with_bearer(access_token);
        self.transport.execute(&request).await?.require_success()?;
        Ok(())
    }

    /// `POST /auth/validate`; a 401 means the token is not valid
    ///
    /// A success body without a `valid` flag counts as not valid.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Network`] or [`SessionError::Rejected`] for
    /// any outcome other than a verdict.
    pub async fn validate(&self, access_token: &str) -> Result<bool, SessionError> {
        let request = ApiRequest::post(VALIDATE_PATH).with_bearer(access_token);
        let response = self.transport.execute(&request).await?;
        if response.status == 401 {
            return Ok(false);
        }
        let body: ValidateBody = response.require_success()?.json()?;
        Ok(body.valid.unwrap_or_else(|| {
            log::warn!("Validation response carried no verdict, treating the token as invalid");
            false
        }))
    }
}

fn session_grant(response: ApiResponse) -> Result<SessionGrant, SessionError> {
    let user = match response.body.get("user") {
        None | Some(Value::Null) => None,
        Some(user) => match serde_json::from_value::<Identity>(user.clone()) {
            Ok(identity) => Some(identity),
            Err(e) => {
                log::warn!("Ignoring unreadable user record in login response: {e}");
                None
            }
        },
    };

    let tokens: TokenPair = response.json()?;
    if tokens.access_token.is_empty() || tokens.refresh_token.as_deref().is_none_or(str::is_empty) {
        return Err(SessionError::InvalidResponse(
            "login response must carry both access and refresh tokens".to_string(),
        ));
    }

    Ok(SessionGrant { tokens, user })
}
