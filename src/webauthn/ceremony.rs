//! Platform authenticator seam
//!
//! The native biometric API runs outside this crate. It receives options in
//! the native dialect and hands back credentials in the native dialect; the
//! establishment flow transcodes on both sides of this call.

use super::types::{
    AssertionCredential, AuthenticationOptions, RegistrationCredential, RegistrationOptions,
};
use crate::error::SessionError;
use async_trait::async_trait;

/// Native biometric authenticator (Face ID, fingerprint, security key)
///
/// Implementations should return [`SessionError::Ceremony`] when the user
/// cancels or the device refuses.
#[async_trait]
pub trait PlatformAuthenticator: Send + Sync {
    /// Create a new credential from native-dialect registration options
    async fn create(
        &self,
        options: &RegistrationOptions,
    ) -> Result<RegistrationCredential, SessionError>;

    /// Produce an assertion from native-dialect authentication options
    async fn get(&self, options: &AuthenticationOptions)
        -> Result<AssertionCredential, SessionError>;
}
