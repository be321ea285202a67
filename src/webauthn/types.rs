//! `WebAuthn` ceremony payloads
//!
//! The same option and credential structures travel in both dialects; the
//! `to_native`/`to_wire` methods transcode every binary field and leave the
//! rest untouched. Field names follow the backend's camelCase JSON.

use super::errors::TranscodeError;
use super::transcoder::{to_native_base64, to_wire_base64url};
use serde::{Deserialize, Serialize};

/// Response envelope used by every `/webauthn` endpoint
#[derive(Deserialize, Debug)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// Which ceremony a pending challenge belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyDirection {
    Registration,
    Authentication,
}

/// Correlates a ceremony start response with its completion call
///
/// Lives for one round-trip only and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCeremony {
    /// Wire (base64url) challenge, used as the completion path segment
    pub challenge_id: String,
    pub direction: CeremonyDirection,
}

/// Registration start request
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationStartRequest {
    pub user_id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator_name: Option<String>,
}

/// `WebAuthn` registration options
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    pub challenge: String, // Binary
    pub rp: RelyingParty,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    #[serde(default)]
    pub authenticator_selection: Option<AuthenticatorSelectionCriteria>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub attestation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_credentials: Vec<PublicKeyCredentialDescriptor>,
}

/// `WebAuthn` authentication options
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptions {
    pub challenge: String, // Binary
    #[serde(default)]
    pub rp_id: Option<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub user_verification: Option<String>,
    #[serde(default)]
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,
}

/// `WebAuthn` relying party information
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RelyingParty {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

/// `WebAuthn` user entity
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    pub id: String, // Binary user handle
    pub name: String,
    pub display_name: String,
}

/// Public key credential parameters
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type")]
    pub r#type: String, // Always "public-key"
    pub alg: i32,       // -7 for ES256, -257 for RS256
}

/// Authenticator selection criteria
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelectionCriteria {
    #[serde(default)]
    pub authenticator_attachment: Option<String>, // "platform", "cross-platform"
    #[serde(default)]
    pub require_resident_key: Option<bool>,
    #[serde(default)]
    pub user_verification: Option<String>, // "required", "preferred", "discouraged"
}

/// Public key credential descriptor
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialDescriptor {
    #[serde(rename = "type")]
    pub r#type: String,
    pub id: String, // Binary credential ID
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

/// Credential created by the platform authenticator
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationCredential {
    pub id: String, // Binary
    #[serde(default)]
    pub r#type: Option<String>,
    pub response: AttestationResponse,
}

/// Authenticator attestation response
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String, // Binary
    pub attestation_object: String, // Binary
}

/// Assertion produced by the platform authenticator
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AssertionCredential {
    pub id: String, // Binary
    #[serde(default)]
    pub r#type: Option<String>,
    pub response: AssertionResponse,
}

/// Authenticator assertion response
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String, // Binary
    pub authenticator_data: String, // Binary
    pub signature: String,          // Binary
    #[serde(default)]
    pub user_handle: Option<String>, // Binary
}

/// Body of `POST /webauthn/register/complete/{challenge}`
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationCompleteRequest {
    pub credential_id: String,
    pub credential_type: String,
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub attestation_object: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator_name: Option<String>,
}

/// Body of `POST /webauthn/authenticate/complete/{challenge}`
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationCompleteRequest {
    pub credential_id: String,
    pub credential_type: String,
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

/// Session material returned by a successful authentication ceremony
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CeremonyTokens {
    pub token: String,
    #[serde(default, alias = "refresh_token")]
    pub refresh_token: Option<String>,
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Stored biometric credential as listed by the backend
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BiometricCredential {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_label: Option<String>,
}

const PUBLIC_KEY: &str = "public-key";

fn native(value: &str, field: &str) -> Result<String, TranscodeError> {
    to_native_base64(value).map_err(|e| e.in_field(field))
}

fn wire(value: &str, field: &str) -> Result<String, TranscodeError> {
    to_wire_base64url(value).map_err(|e| e.in_field(field))
}

fn descriptors_to_native(
    descriptors: &[PublicKeyCredentialDescriptor],
    field: &str,
) -> Result<Vec<PublicKeyCredentialDescriptor>, TranscodeError> {
    descriptors
        .iter()
        .map(|descriptor| {
            Ok(PublicKeyCredentialDescriptor {
                id: native(&descriptor.id, field)?,
                ..descriptor.clone()
            })
        })
        .collect()
}

impl RegistrationOptions {
    /// Transcode backend-issued options for the native biometric API
    ///
    /// # Errors
    ///
    /// Returns a [`TranscodeError`] naming the first malformed field.
    pub fn to_native(&self) -> Result<Self, TranscodeError> {
        Ok(Self {
            challenge: native(&self.challenge, "challenge")?,
            user: UserEntity {
                id: native(&self.user.id, "user.id")?,
                ..self.user.clone()
            },
            exclude_credentials: descriptors_to_native(
                &self.exclude_credentials,
                "excludeCredentials.id",
            )?,
            ..self.clone()
        })
    }
}

impl AuthenticationOptions {
    /// Transcode backend-issued options for the native biometric API
    ///
    /// # Errors
    ///
    /// Returns a [`TranscodeError`] naming the first malformed field.
    pub fn to_native(&self) -> Result<Self, TranscodeError> {
        Ok(Self {
            challenge: native(&self.challenge, "challenge")?,
            allow_credentials: descriptors_to_native(
                &self.allow_credentials,
                "allowCredentials.id",
            )?,
            ..self.clone()
        })
    }
}

impl RegistrationCredential {
    /// Build the wire completion body from a native attestation
    ///
    /// # Errors
    ///
    /// Returns a [`TranscodeError`] naming the first malformed field.
    pub fn to_wire(
        &self,
        authenticator_name: Option<String>,
    ) -> Result<RegistrationCompleteRequest, TranscodeError> {
        Ok(RegistrationCompleteRequest {
            credential_id: wire(&self.id, "credentialId")?,
            credential_type: self.r#type.clone().unwrap_or_else(|| PUBLIC_KEY.to_string()),
            client_data_json: wire(&self.response.client_data_json, "clientDataJSON")?,
            attestation_object: wire(&self.response.attestation_object, "attestationObject")?,
            authenticator_name,
        })
    }
}

impl AssertionCredential {
    /// Build the wire completion body from a native assertion
    ///
    /// # Errors
    ///
    /// Returns a [`TranscodeError`] naming the first malformed field.
    pub fn to_wire(&self) -> Result<AuthenticationCompleteRequest, TranscodeError> {
        Ok(AuthenticationCompleteRequest {
            credential_id: wire(&self.id, "credentialId")?,
            credential_type: self.r#type.clone().unwrap_or_else(|| PUBLIC_KEY.to_string()),
            client_data_json: wire(&self.response.client_data_json, "clientDataJSON")?,
            authenticator_data: wire(&self.response.authenticator_data, "authenticatorData")?,
            signature: wire(&self.response.signature, "signature")?,
            user_handle: self
                .response
                .user_handle
                .as_deref()
                .map(|handle| wire(handle, "userHandle"))
                .transpose()?,
        })
    }
}
