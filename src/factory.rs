//! Composition root
//!
//! Builds one [`SessionManager`] and hands the same instance to the
//! dispatcher and the establishment flows.

use crate::auth_api::AuthClient;
use crate::dispatcher::AuthenticatedRequestDispatcher;
use crate::error::SessionError;
use crate::establishment::SessionEstablishmentFlow;
use crate::session::SessionManager;
use crate::settings::{ClientSettings, StorageBackend};
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::vault::{CredentialVault, FileStore, MemoryStore, SecureStore};
use std::sync::Arc;

/// Every component of a configured client, sharing one session
#[derive(Clone)]
pub struct SessionClient {
    pub session: SessionManager,
    pub auth: AuthClient,
    pub dispatcher: AuthenticatedRequestDispatcher,
    pub flow: SessionEstablishmentFlow,
}

/// Factory for wiring a [`SessionClient`]
pub struct SessionClientFactory;

impl SessionClientFactory {
    /// Build a client from loaded settings
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] when the HTTP client cannot be
    /// built from the API settings.
    pub fn from_settings(settings: &ClientSettings) -> Result<SessionClient, SessionError> {
        log::info!("🏭 Building session client...");

        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(
            &settings.api.base_url,
            settings.request_timeout(),
            &settings.api.user_agent,
        )?);
        log::info!("✅ API transport configured");
        log::info!("   └─ {} (timeout {}s)", settings.api.base_url, settings.api.timeout_seconds);

        let store = Self::create_store(settings);
        let client = Self::with_parts(transport, store, settings.refresh_margin());

        log::info!("🏭 Session client ready");
        Ok(client)
    }

    fn create_store(settings: &ClientSettings) -> Arc<dyn SecureStore> {
        match settings.storage.backend {
            StorageBackend::Memory => {
                log::info!("⚠️  Using in-memory vault - sessions end with the process");
                Arc::new(MemoryStore::new())
            }
            StorageBackend::File => {
                log::info!("✅ Using encrypted file vault");
                log::info!("   └─ {}", settings.storage.path);
                Arc::new(FileStore::new(&settings.storage.path, &settings.storage.secret))
            }
        }
    }

    /// Wire a client over an explicit transport and store
    #[must_use]
    pub fn with_parts(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn SecureStore>,
        refresh_margin: chrono::Duration,
    ) -> SessionClient {
        let auth = AuthClient::new(transport.clone());
        let session = SessionManager::new(CredentialVault::new(store), auth.clone(), refresh_margin);
        let dispatcher = AuthenticatedRequestDispatcher::new(session.clone(), transport.clone());
        let flow = SessionEstablishmentFlow::new(
            session.clone(),
            auth.clone(),
            transport,
            dispatcher.clone(),
        );

        SessionClient {
            session,
            auth,
            dispatcher,
            flow,
        }
    }

    /// Client over an in-memory vault with the default refresh margin
    #[must_use]
    pub fn in_memory(transport: Arc<dyn HttpTransport>) -> SessionClient {
        Self::with_parts(
            transport,
            Arc::new(MemoryStore::new()),
            chrono::Duration::minutes(5),
        )
    }
}
