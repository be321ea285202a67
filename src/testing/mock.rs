//! Mock objects and fake implementations for testing
//!
//! The mocks keep their state behind `std::sync::Mutex` and panic on a
//! poisoned lock; they are test-only.

use crate::error::SessionError;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};
use crate::vault::{MemoryStore, SecureStore};
use crate::webauthn::{
    AssertionCredential, AuthenticationOptions, PlatformAuthenticator, RegistrationCredential,
    RegistrationOptions,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::fixtures::TestFixtures;

type Handler = Arc<dyn Fn(&ApiRequest) -> Result<ApiResponse, SessionError> + Send + Sync>;

fn handler<F>(f: F) -> Handler
where
    F: Fn(&ApiRequest) -> Result<ApiResponse, SessionError> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Default)]
struct Route {
    once: VecDeque<Handler>,
    fallback: Option<Handler>,
    delay: Option<Duration>,
}

/// Scripted [`HttpTransport`] keyed by request path
///
/// One-shot responses are served first, in order; after that the sticky
/// response answers every call. Unscripted paths answer 404. Every request
/// is recorded before any configured delay.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_route(&self, path: &str, update: impl FnOnce(&mut Route)) {
        let mut routes = self.routes.lock().unwrap();
        update(routes.entry(path.to_string()).or_default());
    }

    /// Answer every call to `path` with `status` and `body`
    pub fn respond(&self, path: &str, status: u16, body: Value) {
        let response = ApiResponse::new(status, body);
        self.respond_with(path, move |_| Ok(response.clone()));
    }

    /// Answer the next unanswered call to `path` with `status` and `body`
    pub fn respond_once(&self, path: &str, status: u16, body: Value) {
        let response = ApiResponse::new(status, body);
        self.with_route(path, |route| {
            route.once.push_back(handler(move |_| Ok(response.clone())));
        });
    }

    /// Answer every call to `path` by running `f`
    pub fn respond_with<F>(&self, path: &str, f: F)
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse, SessionError> + Send + Sync + 'static,
    {
        self.with_route(path, |route| route.fallback = Some(handler(f)));
    }

    /// Fail every call to `path` with a transport error
    pub fn fail(&self, path: &str, error: SessionError) {
        self.respond_with(path, move |_| Err(error.clone()));
    }

    /// Fail the next unanswered call to `path`
    pub fn fail_once(&self, path: &str, error: SessionError) {
        self.with_route(path, |route| {
            route.once.push_back(handler(move |_| Err(error.clone())));
        });
    }

    /// Hold every call to `path` for `delay` before answering
    pub fn delay(&self, path: &str, delay: Duration) {
        self.with_route(path, |route| route.delay = Some(delay));
    }

    /// Every request received so far
    #[must_use]
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests received for one path
    #[must_use]
    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }

    /// Number of calls made to one path
    #[must_use]
    pub fn call_count(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, SessionError> {
        self.requests.lock().unwrap().push(request.clone());

        let (scripted, delay) = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&request.path) {
                Some(route) => (
                    route.once.pop_front().or_else(|| route.fallback.clone()),
                    route.delay,
                ),
                None => (None, None),
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match scripted {
            Some(respond) => respond(request),
            None => Ok(ApiResponse::new(
                404,
                json!({"error": format!("no route for {}", request.path)}),
            )),
        }
    }
}

/// [`SecureStore`] whose writes to chosen keys can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing_keys: Mutex<HashSet<String>>,
    reads_fail: Mutex<bool>,
}

impl FlakyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write (set or remove) of `key` fail
    pub fn fail_writes_to(&self, key: &str) {
        self.failing_keys.lock().unwrap().insert(key.to_string());
    }

    /// Make every read fail
    pub fn fail_reads(&self) {
        *self.reads_fail.lock().unwrap() = true;
    }

    /// Stop injecting failures
    pub fn heal(&self) {
        self.failing_keys.lock().unwrap().clear();
        *self.reads_fail.lock().unwrap() = false;
    }

    fn check_write(&self, key: &str) -> Result<(), SessionError> {
        if self.failing_keys.lock().unwrap().contains(key) {
            Err(SessionError::Storage(format!("injected write failure for '{key}'")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SecureStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        if *self.reads_fail.lock().unwrap() {
            return Err(SessionError::Storage("injected read failure".to_string()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.check_write(key)?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.check_write(key)?;
        self.inner.remove(key).await
    }
}

/// Fake [`PlatformAuthenticator`] returning fixed native credentials
///
/// Records the options it was handed so tests can check their dialect.
pub struct MockAuthenticator {
    registration: Result<RegistrationCredential, SessionError>,
    assertion: Result<AssertionCredential, SessionError>,
    registration_options: Mutex<Vec<RegistrationOptions>>,
    authentication_options: Mutex<Vec<AuthenticationOptions>>,
}

impl Default for MockAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAuthenticator {
    /// Authenticator answering with the fixture credentials
    #[must_use]
    pub fn new() -> Self {
        Self {
            registration: Ok(TestFixtures::registration_credential()),
            assertion: Ok(TestFixtures::assertion()),
            registration_options: Mutex::new(Vec::new()),
            authentication_options: Mutex::new(Vec::new()),
        }
    }

    /// Authenticator where the user cancels every prompt
    #[must_use]
    pub fn declining() -> Self {
        let cancelled = SessionError::Ceremony("User cancelled".to_string());
        Self {
            registration: Err(cancelled.clone()),
            assertion: Err(cancelled),
            ..Self::new()
        }
    }

    #[must_use]
    pub fn with_assertion(mut self, assertion: AssertionCredential) -> Self {
        self.assertion = Ok(assertion);
        self
    }

    #[must_use]
    pub fn with_registration(mut self, registration: RegistrationCredential) -> Self {
        self.registration = Ok(registration);
        self
    }

    /// Options received by `create`
    #[must_use]
    pub fn registration_options(&self) -> Vec<RegistrationOptions> {
        self.registration_options.lock().unwrap().clone()
    }

    /// Options received by `get`
    #[must_use]
    pub fn authentication_options(&self) -> Vec<AuthenticationOptions> {
        self.authentication_options.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformAuthenticator for MockAuthenticator {
    async fn create(
        &self,
        options: &RegistrationOptions,
    ) -> Result<RegistrationCredential, SessionError> {
        self.registration_options.lock().unwrap().push(options.clone());
        self.registration.clone()
    }

    async fn get(
        &self,
        options: &AuthenticationOptions,
    ) -> Result<AssertionCredential, SessionError> {
        self.authentication_options
            .lock()
            .unwrap()
            .push(options.clone());
        self.assertion.clone()
    }
}
