//! HTTP transport seam
//!
//! Everything the crate sends goes through [`HttpTransport`]. The production
//! implementation is [`ReqwestTransport`]; tests substitute a scripted mock.

use crate::error::SessionError;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
pub use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Error code the backend puts in a 401 body when the access token expired
pub const TOKEN_EXPIRED: &str = "token_expired";

/// A request relative to the configured API base URL
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the base URL; dynamic segments must already be percent-encoded
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Copy of this request carrying `token` as its bearer credential
    ///
    /// Any previous `Authorization` header is replaced.
    #[must_use]
    pub fn with_bearer(&self, token: &str) -> Self {
        let mut request = self.clone();
        request
            .headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case(AUTHORIZATION.as_str()));
        request
            .headers
            .push((AUTHORIZATION.to_string(), format!("Bearer {token}")));
        request
    }

    /// Value of the bearer credential, if any
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(AUTHORIZATION.as_str()))
            .and_then(|(_, value)| value.strip_prefix("Bearer "))
    }
}

/// A response with its body parsed as JSON
///
/// Non-JSON bodies are kept as a JSON string, empty bodies as `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    #[must_use]
    pub const fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// The machine-readable `error` field of the body
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }

    /// Whether this is the server's access token expiry signal
    ///
    /// Only a 401 carrying `error == "token_expired"` counts; a plain 401 is
    /// an ordinary rejection.
    #[must_use]
    pub fn is_token_expired(&self) -> bool {
        self.status == 401 && self.error_code() == Some(TOKEN_EXPIRED)
    }

    /// Human readable failure message from `details`, `message` or `error`
    #[must_use]
    pub fn error_message(&self) -> String {
        ["details", "message", "error"]
            .iter()
            .find_map(|field| {
                self.body
                    .get(*field)
                    .and_then(Value::as_str)
                    .filter(|message| !message.is_empty())
            })
            .or_else(|| self.body.as_str().filter(|text| !text.is_empty()))
            .map_or_else(|| format!("HTTP {}", self.status), ToString::to_string)
    }

    /// Convert a non-success response into [`SessionError::Rejected`]
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] for any non-2xx status.
    pub fn require_success(self) -> Result<Self, SessionError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SessionError::Rejected {
                status: self.status,
                message: self.error_message(),
            })
        }
    }

    /// Deserialize the body
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidResponse`] if the body has another shape.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, SessionError> {
        serde_json::from_value(self.body)
            .map_err(|e| SessionError::InvalidResponse(format!("unexpected response body: {e}")))
    }
}

/// Sends [`ApiRequest`]s to the backend
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute a request
    ///
    /// Any HTTP status is an `Ok` response; only transport failures
    /// (connection, timeout) are errors.
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, SessionError>;
}

/// [`HttpTransport`] over a shared `reqwest` client
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestTransport {
    /// Build a transport for `base_url`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if the base URL is invalid or
    /// the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> Result<Self, SessionError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| SessionError::Configuration(format!("invalid API base URL '{base_url}': {e}")))?;
        // Keep any base path when joining relative request paths
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| SessionError::Configuration(format!("cannot build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// Absolute URL for a request path
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if the path cannot be joined.
    pub fn url_for(&self, path: &str) -> Result<Url, SessionError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| SessionError::Configuration(format!("invalid request path '{path}': {e}")))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, SessionError> {
        let url = self.url_for(&request.path)?;
        log::debug!("{} {}", request.method, url.path());

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_expired_signal_requires_401_and_code() {
        assert!(ApiResponse::new(401, json!({"error": "token_expired"})).is_token_expired());
        assert!(!ApiResponse::new(401, json!({"error": "invalid_token"})).is_token_expired());
        assert!(!ApiResponse::new(401, Value::Null).is_token_expired());
        assert!(!ApiResponse::new(403, json!({"error": "token_expired"})).is_token_expired());
    }

    #[test]
    fn test_error_message_fallbacks() {
        let details = ApiResponse::new(400, json!({"error": "bad_request", "details": "OTP expired"}));
        assert_eq!(details.error_message(), "OTP expired");

        let error_only = ApiResponse::new(401, json!({"error": "Invalid credentials"}));
        assert_eq!(error_only.error_message(), "Invalid credentials");

        let text = ApiResponse::new(502, Value::String("Bad Gateway".to_string()));
        assert_eq!(text.error_message(), "Bad Gateway");

        assert_eq!(ApiResponse::new(500, Value::Null).error_message(), "HTTP 500");
    }

    #[test]
    fn test_require_success() {
        assert!(ApiResponse::new(204, Value::Null).require_success().is_ok());
        let err = ApiResponse::new(423, json!({"message": "Account locked"}))
            .require_success()
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::Rejected {
                status: 423,
                message: "Account locked".to_string()
            }
        );
    }

    #[test]
    fn test_with_bearer_replaces_existing_header() {
        let request = ApiRequest::get("/groups")
            .with_header("authorization", "Bearer old")
            .with_header("X-Trace", "1");

        let authorized = request.with_bearer("new");
        assert_eq!(authorized.bearer_token(), Some("new"));
        assert_eq!(authorized.headers.len(), 2);
        assert_eq!(request.bearer_token(), Some("old"));
    }

    #[test]
    fn test_url_join_keeps_base_path() {
        let transport =
            ReqwestTransport::new("https://api.stokvel.test/v1", Duration::from_secs(5), "test")
                .unwrap();
        assert_eq!(
            transport.url_for("/auth/login").unwrap().as_str(),
            "https://api.stokvel.test/v1/auth/login"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            ReqwestTransport::new("not a url", Duration::from_secs(5), "test"),
            Err(SessionError::Configuration(_))
        ));
    }
}
