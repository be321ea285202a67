//! Test fixtures providing pre-built test objects

use crate::auth_api::AuthClient;
use crate::models::Identity;
use crate::session::SessionManager;
use crate::transport::HttpTransport;
use crate::vault::{CredentialVault, MemoryStore, SecureStore};
use crate::webauthn::{
    AssertionCredential, AssertionResponse, AttestationResponse, RegistrationCredential,
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

use super::constants::{TEST_EMAIL, TEST_USERNAME, TEST_USER_ID};

/// Central fixture provider for test data
pub struct TestFixtures;

impl TestFixtures {
    /// The identity matching [`TestTokens::valid`]
    #[must_use]
    pub fn identity() -> Identity {
        Identity {
            id: TEST_USER_ID.to_string(),
            email: TEST_EMAIL.to_string(),
            username: TEST_USERNAME.to_string(),
            first_name: "Thandi".to_string(),
            last_name: "Khumalo".to_string(),
            contact_number: Some("0831112222".to_string()),
            id_number: None,
        }
    }

    /// Session manager over an in-memory vault and the given transport
    #[must_use]
    pub fn session_manager(transport: Arc<dyn HttpTransport>) -> SessionManager {
        Self::session_manager_with_store(transport, Arc::new(MemoryStore::new()))
    }

    /// Session manager over a caller-provided store
    #[must_use]
    pub fn session_manager_with_store(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn SecureStore>,
    ) -> SessionManager {
        SessionManager::new(
            CredentialVault::new(store),
            AuthClient::new(transport),
            Duration::minutes(5),
        )
    }

    /// Wire-dialect registration options as the backend sends them
    #[must_use]
    pub fn registration_options_body() -> Value {
        json!({
            "success": true,
            "data": {
                "challenge": "Y2hhbGxlbmdlLXJlZy0x",
                "rp": {"id": "stokvel.app", "name": "Stokvel"},
                "user": {"id": "dXNlci0xMjM", "name": TEST_USERNAME, "displayName": "Thandi Khumalo"},
                "pubKeyCredParams": [
                    {"type": "public-key", "alg": -7},
                    {"type": "public-key", "alg": -257}
                ],
                "authenticatorSelection": {
                    "authenticatorAttachment": "platform",
                    "userVerification": "required"
                },
                "timeout": 60000,
                "attestation": "none"
            }
        })
    }

    /// Wire-dialect authentication options as the backend sends them
    #[must_use]
    pub fn authentication_options_body() -> Value {
        json!({
            "success": true,
            "data": {
                "challenge": "-_8_Y2hhbA",
                "rpId": "stokvel.app",
                "timeout": 60000,
                "userVerification": "required",
                "allowCredentials": [
                    {"type": "public-key", "id": "Y3JlZC0x-_8", "transports": ["internal"]}
                ]
            }
        })
    }

    /// Native-dialect credential a platform authenticator would create
    #[must_use]
    pub fn registration_credential() -> RegistrationCredential {
        RegistrationCredential {
            id: "Y3JlZC0x+/8=".to_string(),
            r#type: Some("public-key".to_string()),
            response: AttestationResponse {
                client_data_json: "eyJ0eXBlIjoid2ViYXV0aG4uY3JlYXRlIn0=".to_string(),
                attestation_object: "o2NmbXRkbm9uZQ==".to_string(),
            },
        }
    }

    /// Native-dialect assertion a platform authenticator would produce
    #[must_use]
    pub fn assertion() -> AssertionCredential {
        AssertionCredential {
            id: "Y3JlZC0x+/8=".to_string(),
            r#type: Some("public-key".to_string()),
            response: AssertionResponse {
                client_data_json: "eyJ0eXBlIjoid2ViYXV0aG4uZ2V0In0=".to_string(),
                authenticator_data: "SZYN5YgO".to_string(),
                signature: "MEUCIQ+/".to_string(),
                user_handle: Some("dXNlci0xMjM=".to_string()),
            },
        }
    }
}

/// Unsigned bearer tokens for exercising claims decoding and expiry
pub struct TestTokens;

impl TestTokens {
    /// Build `header.payload.signature` with an arbitrary payload
    ///
    /// # Panics
    ///
    /// Panics if `claims` cannot be serialized.
    #[must_use]
    pub fn unsigned(claims: &Value) -> String {
        let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload =
            general_purpose::URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        format!("{header}.{payload}.c2lnbmF0dXJl")
    }

    /// Token for the fixture identity expiring `expires_in_seconds` from now
    ///
    /// `tag` makes otherwise identical tokens distinguishable.
    #[must_use]
    pub fn valid(tag: &str, expires_in_seconds: i64) -> String {
        let identity = TestFixtures::identity();
        Self::unsigned(&json!({
            "sub": identity.id,
            "email": identity.email,
            "username": identity.username,
            "given_name": identity.first_name,
            "family_name": identity.last_name,
            "phone_number": identity.contact_number,
            "exp": (Utc::now() + Duration::seconds(expires_in_seconds)).timestamp(),
            "jti": tag,
        }))
    }

    /// Token for the fixture identity that is already inside the refresh margin
    #[must_use]
    pub fn expiring(tag: &str) -> String {
        Self::valid(tag, 30)
    }
}
