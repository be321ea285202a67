use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Normalized identity claims of the signed-in user
///
/// Derived from the access token (or from the user record a login response
/// carries) and cached until the session is cleared. Only `id` and `email`
/// are guaranteed to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_number: Option<String>,
}

impl Identity {
    /// Full display name, falling back to the username
    #[must_use]
    pub fn display_name(&self) -> String {
        let full_name = format!("{} {}", self.first_name, self.last_name);
        let full_name = full_name.trim();
        if full_name.is_empty() {
            self.username.clone()
        } else {
            full_name.to_string()
        }
    }
}

/// Access/refresh token pair as returned by login, MFA verification and refresh
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    /// Absent on some refresh responses; the previous refresh token stays valid then
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// The live session held by the [`SessionManager`](crate::session::SessionManager)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    /// Issued lifetime of the access token, when known
    pub lifetime: Option<Duration>,
    pub identity: Option<Identity>,
}

impl Session {
    /// Whether the access token expires within `margin` of now
    ///
    /// The margin is capped at half the issued lifetime, so a token that
    /// lives no longer than the margin is still used for half its life.
    /// A session with unknown expiry is never considered near expiry; the
    /// server's `token_expired` signal covers that case.
    #[must_use]
    pub fn expires_within(&self, margin: Duration) -> bool {
        let margin = self
            .lifetime
            .map_or(margin, |lifetime| margin.min(lifetime / 2));
        self.expires_at
            .is_some_and(|expires_at| expires_at <= Utc::now() + margin)
    }
}

/// Observable state of the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
}
