use super::store::SecureStore;
use crate::error::SessionError;
use crate::models::Identity;
use crate::utils::logging::LoggingHelper;
use std::sync::Arc;
use tokio::sync::Mutex;

const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";
const USER_INFO_KEY: &str = "user_info";

/// Tokens as found in the vault
///
/// Either field may be missing if a previous process died mid-write on a
/// store without rollback; use [`StoredTokens::into_pair`] to get a usable
/// session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl StoredTokens {
    /// Both tokens, or `None` when either is missing
    #[must_use]
    pub fn into_pair(self) -> Option<(String, String)> {
        self.access_token.zip(self.refresh_token)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// Durable storage of the access token, refresh token and cached identity
///
/// Every operation holds the vault lock, so multi-key writes are never
/// observed half done by another vault operation.
pub struct CredentialVault {
    store: Arc<dyn SecureStore>,
    lock: Mutex<()>,
}

impl CredentialVault {
    #[must_use]
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Persist a token pair
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if either write fails. The previous
    /// pair is restored on a best-effort basis so no mixed pair is left.
    pub async fn save(&self, access_token: &str, refresh_token: &str) -> Result<(), SessionError> {
        let _guard = self.lock.lock().await;

        let previous_access = self.store.get(ACCESS_TOKEN_KEY).await?;
        self.store.set(ACCESS_TOKEN_KEY, access_token).await.inspect_err(|e| {
            LoggingHelper::log_storage_failure("save", &e.to_string());
        })?;

        if let Err(e) = self.store.set(REFRESH_TOKEN_KEY, refresh_token).await {
            LoggingHelper::log_storage_failure("save", &e.to_string());
            let rollback = match previous_access {
                Some(previous) => self.store.set(ACCESS_TOKEN_KEY, &previous).await,
                None => self.store.remove(ACCESS_TOKEN_KEY).await,
            };
            if let Err(rollback_error) = rollback {
                LoggingHelper::log_storage_failure("rollback", &rollback_error.to_string());
            }
            return Err(e);
        }

        Ok(())
    }

    /// Read whatever tokens are stored
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the store cannot be read.
    pub async fn load(&self) -> Result<StoredTokens, SessionError> {
        let _guard = self.lock.lock().await;

        Ok(StoredTokens {
            access_token: self.store.get(ACCESS_TOKEN_KEY).await?,
            refresh_token: self.store.get(REFRESH_TOKEN_KEY).await?,
        })
    }

    /// Remove the tokens and the cached identity together; idempotent
    ///
    /// Every key is attempted even if an earlier removal fails.
    ///
    /// # Errors
    ///
    /// Returns the first [`SessionError::Storage`] encountered.
    pub async fn clear(&self) -> Result<(), SessionError> {
        let _guard = self.lock.lock().await;

        let mut first_error = None;
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_INFO_KEY] {
            if let Err(e) = self.store.remove(key).await {
                LoggingHelper::log_storage_failure("clear", &e.to_string());
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Cache the identity derived from the current session
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the identity cannot be written.
    pub async fn cache_identity(&self, identity: &Identity) -> Result<(), SessionError> {
        let serialized = serde_json::to_string(identity)
            .map_err(|e| SessionError::Storage(format!("cannot serialize identity: {e}")))?;

        let _guard = self.lock.lock().await;
        self.store.set(USER_INFO_KEY, &serialized).await
    }

    /// Load the cached identity
    ///
    /// An unreadable cache entry is discarded and reported as absent; the
    /// identity is then re-derived from the access token.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the store cannot be read.
    pub async fn load_identity(&self) -> Result<Option<Identity>, SessionError> {
        let _guard = self.lock.lock().await;

        let Some(serialized) = self.store.get(USER_INFO_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&serialized) {
            Ok(identity) => Ok(Some(identity)),
            Err(e) => {
                log::warn!("Discarding unreadable cached identity: {e}");
                self.store.remove(USER_INFO_KEY).await?;
                Ok(None)
            }
        }
    }

    /// Drop the cached identity only
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the entry cannot be removed.
    pub async fn clear_identity(&self) -> Result<(), SessionError> {
        let _guard = self.lock.lock().await;
        self.store.remove(USER_INFO_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::TestFixtures;
    use crate::testing::mock::FlakyStore;
    use crate::vault::MemoryStore;

    fn vault() -> (CredentialVault, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (CredentialVault::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (vault, _) = vault();
        assert!(vault.load().await.unwrap().is_empty());

        vault.save("A1", "R1").await.unwrap();
        let tokens = vault.load().await.unwrap();
        assert_eq!(tokens.into_pair(), Some(("A1".to_string(), "R1".to_string())));
    }

    #[tokio::test]
    async fn test_partial_tokens_do_not_form_a_pair() {
        let (vault, store) = vault();
        store.set(ACCESS_TOKEN_KEY, "A1").await.unwrap();

        let tokens = vault.load().await.unwrap();
        assert!(!tokens.is_empty());
        assert_eq!(tokens.into_pair(), None);
    }

    #[tokio::test]
    async fn test_clear_removes_everything_and_is_idempotent() {
        let (vault, _) = vault();
        vault.save("A1", "R1").await.unwrap();
        vault.cache_identity(&TestFixtures::identity()).await.unwrap();

        vault.clear().await.unwrap();
        vault.clear().await.unwrap();

        assert!(vault.load().await.unwrap().is_empty());
        assert_eq!(vault.load_identity().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_identity_cache_round_trip() {
        let (vault, store) = vault();
        let identity = TestFixtures::identity();
        vault.cache_identity(&identity).await.unwrap();

        let raw = store.get(USER_INFO_KEY).await.unwrap().unwrap();
        assert!(raw.contains("\"firstName\""));
        assert_eq!(vault.load_identity().await.unwrap(), Some(identity));

        vault.clear_identity().await.unwrap();
        assert_eq!(vault.load_identity().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_identity_is_discarded() {
        let (vault, store) = vault();
        store.set(USER_INFO_KEY, "{\"id\":").await.unwrap();

        assert_eq!(vault.load_identity().await.unwrap(), None);
        assert_eq!(store.get(USER_INFO_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_save_rolls_back_access_token() {
        let store = Arc::new(FlakyStore::new());
        let vault = CredentialVault::new(store.clone());
        vault.save("A1", "R1").await.unwrap();

        store.fail_writes_to(REFRESH_TOKEN_KEY);
        let result = vault.save("A2", "R2").await;
        assert!(matches!(result, Err(SessionError::Storage(_))));

        let tokens = vault.load().await.unwrap();
        assert_eq!(tokens.into_pair(), Some(("A1".to_string(), "R1".to_string())));
    }

    #[tokio::test]
    async fn test_failed_first_save_leaves_nothing() {
        let store = Arc::new(FlakyStore::new());
        store.fail_writes_to(REFRESH_TOKEN_KEY);
        let vault = CredentialVault::new(store);

        assert!(vault.save("A1", "R1").await.is_err());
        assert!(vault.load().await.unwrap().is_empty());
    }
}
