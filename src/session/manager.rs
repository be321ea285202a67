//! Session Manager - single owner of the live session
//!
//! The `SessionManager` holds the in-memory session, persists it through the
//! [`CredentialVault`], and hands out usable access tokens. It is a cheap
//! `Clone` handle over shared state; every clone sees the same session.
//!
//! ## Refresh coordination
//!
//! At most one refresh is in flight at any time. The first caller that needs
//! one spawns it as a task and stores a shared ticket in the session state;
//! every later caller awaits the same ticket and observes the same outcome.
//! Because the refresh runs as its own task, a caller that gives up waiting
//! does not cancel it for the others.
//!
//! Every `establish()`, `restore()` and `invalidate()` bumps a generation
//! counter. A refresh only installs its result if the generation it started
//! under is still current, so newer credentials always win.
//!
//! ## Organization
//!
//! 1. **State** - Session state and refresh ticket types
//! 2. **Construction** - Building and restoring the manager
//! 3. **Access tokens** - Valid token lookup, refresh and renewal
//! 4. **Lifecycle** - Establishing and invalidating sessions
//! 5. **Identity** - Read-through identity cache
//! 6. **Tests**

use crate::auth_api::AuthClient;
use crate::claims::ClaimsDecoder;
use crate::error::SessionError;
use crate::models::{Identity, Session, SessionPhase};
use crate::utils::logging::LoggingHelper;
use crate::vault::CredentialVault;
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

// =============================================================================
// 1. State
// =============================================================================

type RefreshFuture = Shared<BoxFuture<'static, Result<String, SessionError>>>;

/// The outstanding refresh, shared by every caller waiting on it
struct RefreshTicket {
    generation: u64,
    outcome: RefreshFuture,
}

struct SessionState {
    session: Option<Session>,
    phase: SessionPhase,
    generation: u64,
    refresh: Option<RefreshTicket>,
}

struct Inner {
    state: Mutex<SessionState>,
    vault: CredentialVault,
    auth: AuthClient,
    refresh_margin: Duration,
}

/// Owner of the session state machine
///
/// `Unauthenticated → Authenticating → Authenticated → Refreshing → Authenticated | Unauthenticated`
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

// =============================================================================
// 2. Construction
// =============================================================================

impl SessionManager {
    /// Create a manager with no session
    ///
    /// Call [`SessionManager::restore`] to pick up a persisted session.
    #[must_use]
    pub fn new(vault: CredentialVault, auth: AuthClient, refresh_margin: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState {
                    session: None,
                    phase: SessionPhase::Unauthenticated,
                    generation: 0,
                    refresh: None,
                }),
                vault,
                auth,
                refresh_margin,
            }),
        }
    }

    async fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().await
    }

    /// Load the persisted session, returning whether one was found
    ///
    /// An unreadable vault counts as no session. A half-written pair is
    /// cleared.
    pub async fn restore(&self) -> bool {
        let mut state = self.state().await;

        let tokens = match self.inner.vault.load().await {
            Ok(tokens) => tokens,
            Err(e) => {
                LoggingHelper::log_storage_failure("restore", &e.to_string());
                return false;
            }
        };

        let partial = !tokens.is_empty();
        let Some((access_token, refresh_token)) = tokens.into_pair() else {
            if partial {
                log::warn!("Discarding partially persisted session");
                // Failures are logged by the vault
                let _ = self.inner.vault.clear().await;
            }
            return false;
        };

        let identity = self.inner.vault.load_identity().await.unwrap_or_else(|e| {
            LoggingHelper::log_storage_failure("identity restore", &e.to_string());
            None
        });
        let (expires_at, lifetime) = token_timing(&access_token, None);

        state.generation += 1;
        state.refresh = None;
        state.session = Some(Session {
            access_token,
            refresh_token,
            expires_at,
            lifetime,
            identity,
        });
        state.phase = SessionPhase::Authenticated;
        LoggingHelper::log_session_restored(expires_at.is_some());
        true
    }

    /// Current phase of the state machine
    pub async fn phase(&self) -> SessionPhase {
        self.state().await.phase
    }

    /// Whether a session (possibly mid-refresh) is held
    pub async fn is_authenticated(&self) -> bool {
        self.state().await.session.is_some()
    }

    /// Enter `Authenticating` while a login flow runs
    ///
    /// Has no effect when a session is already held.
    pub async fn begin_authentication(&self) {
        let mut state = self.state().await;
        if state.session.is_none() {
            state.phase = SessionPhase::Authenticating;
        }
    }

    /// Leave `Authenticating` after a login flow failed or was abandoned
    pub async fn abandon_authentication(&self) {
        let mut state = self.state().await;
        if state.phase == SessionPhase::Authenticating {
            state.phase = SessionPhase::Unauthenticated;
        }
    }

    // =========================================================================
    // 3. Access tokens
    // =========================================================================

    /// Access token usable for the next request
    ///
    /// Returns the held token unless it expires within the refresh margin, in
    /// which case the (single, shared) refresh is awaited first. A token of
    /// unknown expiry is always returned as is.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotAuthenticated`] if there is no session, or the
    ///   refresh could not reach the backend
    /// - [`SessionError::RefreshFailed`] if the backend refused the refresh
    pub async fn get_valid_access_token(&self) -> Result<String, SessionError> {
        let ticket = {
            let mut state = self.state().await;
            let margin = self.inner.refresh_margin;
            match &state.session {
                None => return Err(SessionError::NotAuthenticated),
                Some(session) if !session.expires_within(margin) => {
                    return Ok(session.access_token.clone());
                }
                Some(_) => log::debug!("Access token expires within the refresh margin"),
            }
            self.ticket(&mut state)?
        };
        ticket.await
    }

    /// Refresh the access token, joining an outstanding refresh if there is one
    ///
    /// On failure the session is cleared before the error is returned.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotAuthenticated`] without a session or when the
    ///   backend could not be reached
    /// - [`SessionError::RefreshFailed`] when the backend refused the token
    pub async fn refresh(&self) -> Result<String, SessionError> {
        let ticket = {
            let mut state = self.state().await;
            self.ticket(&mut state)?
        };
        ticket.await
    }

    /// Replace an access token the server rejected as expired
    ///
    /// If the session already moved past `rejected_token` (another caller
    /// refreshed meanwhile) the current token is returned without a new
    /// refresh.
    ///
    /// # Errors
    ///
    /// Same as [`SessionManager::refresh`].
    pub async fn renew(&self, rejected_token: &str) -> Result<String, SessionError> {
        let ticket = {
            let mut state = self.state().await;
            match &state.session {
                None => return Err(SessionError::NotAuthenticated),
                Some(session) if session.access_token != rejected_token => {
                    log::debug!("Rejected token already replaced, skipping refresh");
                    return Ok(session.access_token.clone());
                }
                Some(_) => {}
            }
            self.ticket(&mut state)?
        };
        ticket.await
    }

    /// Join the current refresh ticket or start a new one
    fn ticket(&self, state: &mut SessionState) -> Result<RefreshFuture, SessionError> {
        if let Some(ticket) = &state.refresh {
            if ticket.generation == state.generation {
                LoggingHelper::log_refresh_requested(true);
                return Ok(ticket.outcome.clone());
            }
        }

        let refresh_token = state
            .session
            .as_ref()
            .map(|session| session.refresh_token.clone())
            .ok_or(SessionError::NotAuthenticated)?;
        let generation = state.generation;
        LoggingHelper::log_refresh_requested(false);

        let manager = self.clone();
        let task = tokio::spawn(async move { manager.run_refresh(generation, refresh_token).await });
        let outcome = async move {
            task.await.unwrap_or_else(|e| {
                Err(SessionError::RefreshFailed(format!("refresh task failed: {e}")))
            })
        }
        .boxed()
        .shared();

        state.refresh = Some(RefreshTicket {
            generation,
            outcome: outcome.clone(),
        });
        state.phase = SessionPhase::Refreshing;
        Ok(outcome)
    }

    /// Body of the refresh task
    async fn run_refresh(
        &self,
        generation: u64,
        refresh_token: String,
    ) -> Result<String, SessionError> {
        let response = self.inner.auth.refresh(&refresh_token).await;

        let mut state = self.state().await;
        if state.generation != generation {
            LoggingHelper::log_refresh_superseded();
            return state
                .session
                .as_ref()
                .map(|session| session.access_token.clone())
                .ok_or(SessionError::NotAuthenticated);
        }
        state.refresh = None;

        match response {
            Ok(tokens) => {
                let rotated = tokens
                    .refresh_token
                    .as_deref()
                    .is_some_and(|token| !token.is_empty() && token != refresh_token);
                let refresh_token = tokens
                    .refresh_token
                    .filter(|token| !token.is_empty())
                    .unwrap_or(refresh_token);

                if let Err(e) = self.inner.vault.save(&tokens.access_token, &refresh_token).await {
                    // The new pair stays usable in memory for this process
                    LoggingHelper::log_storage_failure("refresh persist", &e.to_string());
                }

                let identity = state.session.take().and_then(|session| session.identity);
                let (expires_at, lifetime) = token_timing(&tokens.access_token, tokens.expires_in);
                state.session = Some(Session {
                    access_token: tokens.access_token.clone(),
                    refresh_token,
                    expires_at,
                    lifetime,
                    identity,
                });
                state.phase = SessionPhase::Authenticated;
                LoggingHelper::log_refresh_completed(rotated);
                Ok(tokens.access_token)
            }
            Err(e) => {
                LoggingHelper::log_refresh_failed(&e.to_string());
                // Failures are logged by the vault
                let _ = self.clear(&mut state, "refresh failed").await;
                Err(match e {
                    SessionError::Rejected { message, .. } => SessionError::RefreshFailed(message),
                    SessionError::InvalidResponse(message) => SessionError::RefreshFailed(message),
                    _ => SessionError::NotAuthenticated,
                })
            }
        }
    }

    // =========================================================================
    // 4. Lifecycle
    // =========================================================================

    /// Install a freshly issued token pair
    ///
    /// Supersedes any refresh in flight and drops the cached identity.
    /// `expires_in` is the access token lifetime in seconds; without it the
    /// token's `exp` claim is used.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidResponse`] if either token is empty
    /// - [`SessionError::Storage`] if the pair cannot be persisted; the
    ///   previous session (if any) stays in place
    pub async fn establish(
        &self,
        access_token: &str,
        refresh_token: &str,
        expires_in: Option<u64>,
    ) -> Result<(), SessionError> {
        if access_token.is_empty() || refresh_token.is_empty() {
            return Err(SessionError::InvalidResponse(
                "cannot establish a session without both tokens".to_string(),
            ));
        }

        let mut state = self.state().await;
        state.generation += 1;
        state.refresh = None;

        let persisted = match self.inner.vault.clear_identity().await {
            Ok(()) => self.inner.vault.save(access_token, refresh_token).await,
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            state.phase = if state.session.is_some() {
                SessionPhase::Authenticated
            } else {
                SessionPhase::Unauthenticated
            };
            return Err(e);
        }

        let (expires_at, lifetime) = token_timing(access_token, expires_in);
        state.session = Some(Session {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at,
            lifetime,
            identity: None,
        });
        state.phase = SessionPhase::Authenticated;
        LoggingHelper::log_session_established(expires_in);
        Ok(())
    }

    /// Drop the session, its identity cache and any refresh in flight
    ///
    /// The in-memory session is always cleared.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the vault could not be cleared.
    pub async fn invalidate(&self) -> Result<(), SessionError> {
        let mut state = self.state().await;
        self.clear(&mut state, "invalidated").await
    }

    /// Access token currently held, without refreshing
    pub async fn current_access_token(&self) -> Option<String> {
        self.state()
            .await
            .session
            .as_ref()
            .map(|session| session.access_token.clone())
    }

    async fn clear(&self, state: &mut SessionState, reason: &str) -> Result<(), SessionError> {
        state.generation += 1;
        state.refresh = None;
        state.session = None;
        state.phase = SessionPhase::Unauthenticated;
        LoggingHelper::log_session_cleared(reason);
        self.inner.vault.clear().await
    }

    // =========================================================================
    // 5. Identity
    // =========================================================================

    /// Identity of the signed-in user
    ///
    /// Served from memory, then from the vault, then decoded from the access
    /// token (and cached at both levels).
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotAuthenticated`] without a session
    /// - [`SessionError::Storage`] if the vault cannot be read or written
    /// - [`SessionError::Decode`] if the token does not carry an identity
    pub async fn current_identity(&self) -> Result<Identity, SessionError> {
        let mut state = self.state().await;
        let session = state.session.as_mut().ok_or(SessionError::NotAuthenticated)?;
        if let Some(identity) = &session.identity {
            return Ok(identity.clone());
        }

        let identity = match self.inner.vault.load_identity().await? {
            Some(identity) => identity,
            None => {
                let identity = ClaimsDecoder::decode(&session.access_token)?;
                self.inner.vault.cache_identity(&identity).await?;
                identity
            }
        };
        session.identity = Some(identity.clone());
        Ok(identity)
    }

    /// Drop every cached copy and re-derive the identity from the token
    ///
    /// # Errors
    ///
    /// Same as [`SessionManager::current_identity`].
    pub async fn refresh_identity(&self) -> Result<Identity, SessionError> {
        let mut state = self.state().await;
        let session = state.session.as_mut().ok_or(SessionError::NotAuthenticated)?;
        session.identity = None;
        self.inner.vault.clear_identity().await?;

        let identity = ClaimsDecoder::decode(&session.access_token)?;
        self.inner.vault.cache_identity(&identity).await?;
        session.identity = Some(identity.clone());
        Ok(identity)
    }

    /// Forget the in-memory identity; the vault copy is kept
    pub async fn clear_identity_cache(&self) {
        if let Some(session) = self.state().await.session.as_mut() {
            session.identity = None;
        }
    }

    /// Cache an identity received from the backend (e.g. a login user record)
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotAuthenticated`] without a session
    /// - [`SessionError::Storage`] if the vault cannot be written
    pub async fn cache_identity(&self, identity: Identity) -> Result<(), SessionError> {
        let mut state = self.state().await;
        let session = state.session.as_mut().ok_or(SessionError::NotAuthenticated)?;
        self.inner.vault.cache_identity(&identity).await?;
        session.identity = Some(identity);
        Ok(())
    }

    /// Id of the signed-in user
    ///
    /// # Errors
    ///
    /// Same as [`SessionManager::current_identity`].
    pub async fn current_user_id(&self) -> Result<String, SessionError> {
        Ok(self.current_identity().await?.id)
    }

    /// Username of the signed-in user
    ///
    /// # Errors
    ///
    /// Same as [`SessionManager::current_identity`], plus
    /// [`SessionError::Decode`] when the identity carries no username.
    pub async fn current_username(&self) -> Result<String, SessionError> {
        let identity = self.current_identity().await?;
        if identity.username.is_empty() {
            return Err(SessionError::Decode(
                "Username not found in token".to_string(),
            ));
        }
        Ok(identity.username)
    }
}

/// Absolute expiry and issued lifetime from a reported `expires_in`, else
/// from the token's `exp` and `iat` claims
fn token_timing(
    access_token: &str,
    expires_in: Option<u64>,
) -> (Option<DateTime<Utc>>, Option<Duration>) {
    let reported = expires_in
        .and_then(|seconds| i64::try_from(seconds).ok())
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| Some((Utc::now().checked_add_signed(lifetime)?, lifetime)));
    match reported {
        Some((expires_at, lifetime)) => (Some(expires_at), Some(lifetime)),
        None => (
            ClaimsDecoder::expiry(access_token),
            ClaimsDecoder::lifetime(access_token),
        ),
    }
}

// =============================================================================
// 6. Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_api::REFRESH_PATH;
    use crate::testing::fixtures::{TestFixtures, TestTokens};
    use crate::testing::mock::{FlakyStore, MockTransport};
    use crate::vault::{MemoryStore, SecureStore};
    use serde_json::json;
    use std::time::Duration as StdDuration;

    fn setup() -> (SessionManager, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        (TestFixtures::session_manager(transport.clone()), transport)
    }

    #[tokio::test]
    async fn test_no_session_is_not_authenticated() {
        let (manager, transport) = setup();

        assert_eq!(
            manager.get_valid_access_token().await,
            Err(SessionError::NotAuthenticated)
        );
        assert_eq!(manager.refresh().await, Err(SessionError::NotAuthenticated));
        assert_eq!(manager.phase().await, SessionPhase::Unauthenticated);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_fresh_token_returned_without_network() {
        let (manager, transport) = setup();
        let access = TestTokens::valid("a1", 3600);
        manager.establish(&access, "R1", Some(3600)).await.unwrap();

        assert_eq!(manager.get_valid_access_token().await.unwrap(), access);
        assert_eq!(manager.phase().await, SessionPhase::Authenticated);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_expiry_is_returned_as_is() {
        let (manager, transport) = setup();
        manager.establish("opaque-access", "R1", None).await.unwrap();

        assert_eq!(manager.get_valid_access_token().await.unwrap(), "opaque-access");
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_near_expiry_triggers_refresh() {
        let (manager, transport) = setup();
        let fresh = TestTokens::valid("a2", 3600);
        transport.respond(
            REFRESH_PATH,
            200,
            json!({"access_token": fresh, "refresh_token": "R2", "expires_in": 3600}),
        );
        manager
            .establish(&TestTokens::expiring("a1"), "R1", None)
            .await
            .unwrap();

        assert_eq!(manager.get_valid_access_token().await.unwrap(), fresh);
        assert_eq!(
            transport.requests_to(REFRESH_PATH)[0].body,
            Some(json!({"refreshToken": "R1"}))
        );
        // Second call is served from memory
        assert_eq!(manager.get_valid_access_token().await.unwrap(), fresh);
        assert_eq!(transport.call_count(REFRESH_PATH), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let (manager, transport) = setup();
        transport.delay(REFRESH_PATH, StdDuration::from_millis(50));
        transport.respond(REFRESH_PATH, 200, json!({"access_token": "A2", "expires_in": 900}));
        manager
            .establish(&TestTokens::expiring("a1"), "R1", None)
            .await
            .unwrap();

        let callers = (0..10).map(|_| manager.get_valid_access_token());
        let results = futures::future::join_all(callers).await;

        assert_eq!(transport.call_count(REFRESH_PATH), 1);
        assert!(results.iter().all(|result| result.as_deref() == Ok("A2")));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_failure() {
        let (manager, transport) = setup();
        transport.delay(REFRESH_PATH, StdDuration::from_millis(50));
        transport.respond(REFRESH_PATH, 401, json!({"error": "Refresh token revoked"}));
        manager
            .establish(&TestTokens::expiring("a1"), "R1", None)
            .await
            .unwrap();

        let callers = (0..5).map(|_| manager.refresh());
        let results = futures::future::join_all(callers).await;

        assert_eq!(transport.call_count(REFRESH_PATH), 1);
        let expected = Err(SessionError::RefreshFailed("Refresh token revoked".to_string()));
        assert!(results.iter().all(|result| *result == expected));
        assert!(!manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token_when_omitted() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(MockTransport::new());
        let manager = TestFixtures::session_manager_with_store(transport.clone(), store.clone());
        transport.respond(REFRESH_PATH, 200, json!({"access_token": "A2"}));
        manager.establish("A1", "R1", None).await.unwrap();

        manager.refresh().await.unwrap();
        manager.refresh().await.unwrap();

        let bodies: Vec<_> = transport
            .requests_to(REFRESH_PATH)
            .into_iter()
            .map(|request| request.body)
            .collect();
        assert_eq!(bodies, vec![Some(json!({"refreshToken": "R1"})); 2]);
        assert_eq!(store.get("access_token").await.unwrap().as_deref(), Some("A2"));
        assert_eq!(store.get("refresh_token").await.unwrap().as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_refresh_network_failure_clears_session() {
        let (manager, transport) = setup();
        transport.fail(REFRESH_PATH, SessionError::Network("request timed out".to_string()));
        manager.establish("A1", "R1", None).await.unwrap();

        assert_eq!(manager.refresh().await, Err(SessionError::NotAuthenticated));
        assert_eq!(manager.phase().await, SessionPhase::Unauthenticated);
        assert_eq!(
            manager.get_valid_access_token().await,
            Err(SessionError::NotAuthenticated)
        );
    }

    #[tokio::test]
    async fn test_establish_supersedes_in_flight_refresh() {
        let (manager, transport) = setup();
        transport.delay(REFRESH_PATH, StdDuration::from_millis(100));
        transport.respond(REFRESH_PATH, 200, json!({"access_token": "A2", "refresh_token": "R2"}));
        manager.establish("A1", "R1", None).await.unwrap();

        let refreshing = manager.clone();
        let pending = tokio::spawn(async move { refreshing.refresh().await });
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        assert_eq!(manager.phase().await, SessionPhase::Refreshing);

        manager.establish("A3", "R3", None).await.unwrap();

        // Waiters on the stale ticket see the newer session
        assert_eq!(pending.await.unwrap().unwrap(), "A3");
        assert_eq!(manager.get_valid_access_token().await.unwrap(), "A3");
        assert_eq!(manager.phase().await, SessionPhase::Authenticated);
    }

    #[tokio::test]
    async fn test_invalidate_supersedes_in_flight_refresh() {
        let (manager, transport) = setup();
        transport.delay(REFRESH_PATH, StdDuration::from_millis(100));
        transport.respond(REFRESH_PATH, 200, json!({"access_token": "A2"}));
        manager.establish("A1", "R1", None).await.unwrap();

        let refreshing = manager.clone();
        let pending = tokio::spawn(async move { refreshing.refresh().await });
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        manager.invalidate().await.unwrap();

        assert_eq!(pending.await.unwrap(), Err(SessionError::NotAuthenticated));
        assert!(!manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_cancel_refresh() {
        let (manager, transport) = setup();
        transport.delay(REFRESH_PATH, StdDuration::from_millis(50));
        transport.respond(REFRESH_PATH, 200, json!({"access_token": "A2"}));
        manager.establish("A1", "R1", None).await.unwrap();

        let abandoned = tokio::time::timeout(StdDuration::from_millis(5), manager.refresh()).await;
        assert!(abandoned.is_err());

        assert_eq!(manager.refresh().await.unwrap(), "A2");
        assert_eq!(transport.call_count(REFRESH_PATH), 1);
    }

    #[tokio::test]
    async fn test_renew_skips_refresh_when_token_already_replaced() {
        let (manager, transport) = setup();
        manager.establish("A2", "R2", None).await.unwrap();

        assert_eq!(manager.renew("A1").await.unwrap(), "A2");
        assert_eq!(transport.call_count(REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn test_restore_persisted_session() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(MockTransport::new());
        let access = TestTokens::valid("a1", 3600);

        let first = TestFixtures::session_manager_with_store(transport.clone(), store.clone());
        first.establish(&access, "R1", Some(3600)).await.unwrap();
        first.current_identity().await.unwrap();

        let second = TestFixtures::session_manager_with_store(transport, store);
        assert!(second.restore().await);
        assert_eq!(second.get_valid_access_token().await.unwrap(), access);
        assert_eq!(second.current_identity().await.unwrap(), TestFixtures::identity());
    }

    #[tokio::test]
    async fn test_restore_discards_partial_session() {
        let store = Arc::new(MemoryStore::new());
        store.set("refresh_token", "R1").await.unwrap();
        let manager = TestFixtures::session_manager_with_store(Arc::new(MockTransport::new()), store.clone());

        assert!(!manager.restore().await);
        assert_eq!(store.get("refresh_token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_restore_with_unreadable_vault() {
        let store = Arc::new(FlakyStore::new());
        store.fail_reads();
        let manager = TestFixtures::session_manager_with_store(Arc::new(MockTransport::new()), store);

        assert!(!manager.restore().await);
        assert_eq!(manager.phase().await, SessionPhase::Unauthenticated);
    }

    #[tokio::test]
    async fn test_failed_establish_keeps_previous_session() {
        let store = Arc::new(FlakyStore::new());
        let manager = TestFixtures::session_manager_with_store(Arc::new(MockTransport::new()), store.clone());
        manager.establish("A1", "R1", None).await.unwrap();

        store.fail_writes_to("refresh_token");
        let result = manager.establish("A2", "R2", None).await;

        assert!(matches!(result, Err(SessionError::Storage(_))));
        assert_eq!(manager.get_valid_access_token().await.unwrap(), "A1");
    }

    #[tokio::test]
    async fn test_identity_read_through_and_refresh() {
        let (manager, _) = setup();
        manager
            .establish(&TestTokens::valid("a1", 3600), "R1", None)
            .await
            .unwrap();

        let identity = manager.current_identity().await.unwrap();
        assert_eq!(identity, TestFixtures::identity());
        assert_eq!(manager.current_user_id().await.unwrap(), "user-123");
        assert_eq!(manager.current_username().await.unwrap(), "thandi");

        let mut edited = identity.clone();
        edited.first_name = "Edited".to_string();
        manager.cache_identity(edited).await.unwrap();
        assert_eq!(manager.current_identity().await.unwrap().first_name, "Edited");

        // Memory cleared, vault copy still wins
        manager.clear_identity_cache().await;
        assert_eq!(manager.current_identity().await.unwrap().first_name, "Edited");

        // Forced refresh goes back to the token
        assert_eq!(manager.refresh_identity().await.unwrap().first_name, "Thandi");
    }

    #[tokio::test]
    async fn test_establish_drops_previous_identity() {
        let (manager, _) = setup();
        manager
            .establish(&TestTokens::valid("a1", 3600), "R1", None)
            .await
            .unwrap();
        manager.current_identity().await.unwrap();

        let other = TestTokens::unsigned(&json!({"sub": "user-999", "email": "sipho@example.com"}));
        manager.establish(&other, "R2", None).await.unwrap();

        assert_eq!(manager.current_user_id().await.unwrap(), "user-999");
        assert!(matches!(
            manager.current_username().await,
            Err(SessionError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_identity_decode_failure_propagates() {
        let (manager, _) = setup();
        manager.establish("opaque-access", "R1", None).await.unwrap();

        assert!(matches!(
            manager.current_identity().await,
            Err(SessionError::Decode(_))
        ));
        assert_eq!(
            SessionManager::new(
                CredentialVault::new(Arc::new(MemoryStore::new())),
                AuthClient::new(Arc::new(MockTransport::new())),
                Duration::minutes(5),
            )
            .current_identity()
            .await,
            Err(SessionError::NotAuthenticated)
        );
    }

    #[tokio::test]
    async fn test_authentication_phase_transitions() {
        let (manager, _) = setup();
        manager.begin_authentication().await;
        assert_eq!(manager.phase().await, SessionPhase::Authenticating);
        manager.abandon_authentication().await;
        assert_eq!(manager.phase().await, SessionPhase::Unauthenticated);

        manager.begin_authentication().await;
        manager.establish("A1", "R1", None).await.unwrap();
        manager.abandon_authentication().await;
        assert_eq!(manager.phase().await, SessionPhase::Authenticated);
    }

    #[tokio::test]
    async fn test_establish_rejects_empty_tokens() {
        let (manager, _) = setup();
        assert!(matches!(
            manager.establish("", "R1", None).await,
            Err(SessionError::InvalidResponse(_))
        ));
        assert!(!manager.is_authenticated().await);
    }

    #[test]
    fn test_timing_prefers_reported_lifetime() {
        let token = TestTokens::valid("a1", 60);
        let (from_lifetime, lifetime) = token_timing(&token, Some(3600));
        assert!(from_lifetime.unwrap() > Utc::now() + Duration::minutes(59));
        assert_eq!(lifetime, Some(Duration::hours(1)));

        let (from_claim, _) = token_timing(&token, None);
        assert!(from_claim.unwrap() < Utc::now() + Duration::minutes(2));

        assert_eq!(token_timing("opaque", None), (None, None));
        assert_eq!(token_timing("opaque", Some(u64::MAX)), (None, None));
    }

    #[tokio::test]
    async fn test_short_lived_token_is_not_refreshed_on_every_call() {
        let (manager, transport) = setup();
        transport.respond(REFRESH_PATH, 200, json!({"access_token": "A2"}));
        manager.establish("A1", "R1", Some(300)).await.unwrap();

        for _ in 0..3 {
            assert_eq!(manager.get_valid_access_token().await.unwrap(), "A1");
        }
        assert_eq!(transport.call_count(REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn test_restored_short_lived_token_uses_issued_lifetime() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now().timestamp();
        let access = TestTokens::unsigned(&json!({
            "sub": "u1",
            "email": "a@b.com",
            "iat": now,
            "exp": now + 240,
        }));
        store.set("access_token", &access).await.unwrap();
        store.set("refresh_token", "R1").await.unwrap();
        let transport = Arc::new(MockTransport::new());
        let manager = TestFixtures::session_manager_with_store(transport.clone(), store);

        assert!(manager.restore().await);
        assert_eq!(manager.get_valid_access_token().await.unwrap(), access);
        assert!(transport.requests().is_empty());
    }
}
