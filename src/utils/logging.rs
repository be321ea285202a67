// Centralized logging for session lifecycle events
//
// Token values are never logged, only their presence.
use log::{debug, error, info, warn};

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log a newly established session
    pub fn log_session_established(expires_in: Option<u64>) {
        info!(
            "🔐 Session established (expires_in={})",
            expires_in.map_or_else(|| "unknown".to_string(), |s| format!("{s}s"))
        );
    }

    /// Log a persisted session restored at startup
    pub fn log_session_restored(has_expiry: bool) {
        info!("Restored persisted session (expiry known: {})", has_expiry);
    }

    /// Log that a caller joined or started a refresh
    pub fn log_refresh_requested(joined: bool) {
        if joined {
            debug!("Joining in-flight token refresh");
        } else {
            debug!("🔄 Starting token refresh");
        }
    }

    /// Log refresh outcome
    pub fn log_refresh_completed(rotated_refresh_token: bool) {
        info!(
            "Token refresh succeeded (refresh_token={})",
            if rotated_refresh_token { "rotated" } else { "kept" }
        );
    }

    /// Log a refresh that cleared the session
    pub fn log_refresh_failed(reason: &str) {
        warn!("Token refresh failed, clearing session: {}", reason);
    }

    /// Log a refresh result that arrived after the session moved on
    pub fn log_refresh_superseded() {
        debug!("Discarding superseded refresh result");
    }

    /// Log session teardown
    pub fn log_session_cleared(reason: &str) {
        info!("Session cleared ({})", reason);
    }

    /// Log a vault failure
    pub fn log_storage_failure(operation: &str, detail: &str) {
        error!("Credential vault {} failed: {}", operation, detail);
    }

    /// Log the server-signaled expiry on a dispatched request
    pub fn log_token_expired(method: &str, path: &str, retried: bool) {
        if retried {
            warn!("{} {} still expired after refresh, re-authentication required", method, path);
        } else {
            debug!("{} {} signaled token_expired, refreshing once", method, path);
        }
    }
}
