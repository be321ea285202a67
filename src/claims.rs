//! Bearer token claims decoding
//!
//! Reads the payload segment of an access token and maps the known claim
//! names onto an [`Identity`]. Signatures are NOT verified here: the backend
//! verifies every token it receives, and decoded claims are only used for
//! display. They must never drive an authorization decision on the client.

use crate::error::SessionError;
use crate::models::Identity;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Claim names per identity field, in priority order
const ID_CLAIMS: &[&str] = &["sub", "userId", "id"];
const EMAIL_CLAIMS: &[&str] = &["email"];
const USERNAME_CLAIMS: &[&str] = &["username", "preferred_username"];
const FIRST_NAME_CLAIMS: &[&str] = &["given_name", "firstName"];
const LAST_NAME_CLAIMS: &[&str] = &["family_name", "lastName"];
const CONTACT_NUMBER_CLAIMS: &[&str] = &["phone_number", "contactNumber"];
const ID_NUMBER_CLAIMS: &[&str] = &["idNumber"];

/// Decoder for the identity claims carried in an access token
pub struct ClaimsDecoder;

impl ClaimsDecoder {
    /// Decode a token into a normalized identity
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Decode`] if:
    /// - The token is not three dot-separated segments
    /// - The payload segment is not valid base64url
    /// - The payload is not a JSON object
    /// - `id` or `email` is missing after claim mapping
    pub fn decode(access_token: &str) -> Result<Identity, SessionError> {
        let claims = decode_payload(access_token)?;

        let id = first_claim(&claims, ID_CLAIMS);
        let email = first_claim(&claims, EMAIL_CLAIMS);
        let (Some(id), Some(email)) = (id, email) else {
            return Err(SessionError::Decode(
                "Invalid token: missing required user information".to_string(),
            ));
        };

        Ok(Identity {
            id,
            email,
            username: first_claim(&claims, USERNAME_CLAIMS).unwrap_or_default(),
            first_name: first_claim(&claims, FIRST_NAME_CLAIMS).unwrap_or_default(),
            last_name: first_claim(&claims, LAST_NAME_CLAIMS).unwrap_or_default(),
            contact_number: first_claim(&claims, CONTACT_NUMBER_CLAIMS),
            id_number: first_claim(&claims, ID_NUMBER_CLAIMS),
        })
    }

    /// Read the `exp` claim of a token, if it is a decodable JWT carrying one
    #[must_use]
    pub fn expiry(access_token: &str) -> Option<DateTime<Utc>> {
        let claims = decode_payload(access_token).ok()?;
        let exp = claims.get("exp").and_then(Value::as_i64)?;
        match Utc.timestamp_opt(exp, 0) {
            chrono::LocalResult::Single(expires_at) => Some(expires_at),
            _ => {
                log::warn!("Ignoring out of range 'exp' claim: {exp}");
                None
            }
        }
    }

    /// Issued lifetime from the `exp` and `iat` claims
    #[must_use]
    pub fn lifetime(access_token: &str) -> Option<chrono::Duration> {
        let claims = decode_payload(access_token).ok()?;
        let exp = claims.get("exp").and_then(Value::as_i64)?;
        let iat = claims.get("iat").and_then(Value::as_i64)?;
        exp.checked_sub(iat)
            .filter(|seconds| *seconds > 0)
            .and_then(chrono::Duration::try_seconds)
    }
}

/// Decode the JWT payload segment without verification
fn decode_payload(token: &str) -> Result<Value, SessionError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(SessionError::Decode(format!(
            "Invalid JWT format: expected 3 segments, found {}",
            parts.len()
        )));
    }

    // Some issuers keep the padding on the payload segment
    let payload_b64 = parts[1].trim_end_matches('=');
    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| SessionError::Decode(format!("Base64 decode failed: {e}")))?;

    let claims: Value = serde_json::from_slice(&payload_bytes)
        .map_err(|e| SessionError::Decode(format!("JSON parse failed: {e}")))?;

    if claims.is_object() {
        Ok(claims)
    } else {
        Err(SessionError::Decode(
            "JWT payload is not a JSON object".to_string(),
        ))
    }
}

/// First non-empty claim among `names`; numeric claims are rendered as strings
fn first_claim(claims: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match claims.get(*name)? {
        Value::String(value) if !value.is_empty() => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::TestTokens;
    use serde_json::json;

    #[test]
    fn test_decode_minimal_token() {
        let token = TestTokens::unsigned(&json!({"sub": "u1", "email": "a@b.com"}));

        let identity = ClaimsDecoder::decode(&token).unwrap();
        assert_eq!(identity.id, "u1");
        assert_eq!(identity.email, "a@b.com");
        assert_eq!(identity.username, "");
        assert!(identity.contact_number.is_none());
    }

    #[test]
    fn test_missing_email_fails_closed() {
        let token = TestTokens::unsigned(&json!({"sub": "u1", "username": "alice"}));

        let result = ClaimsDecoder::decode(&token);
        assert!(matches!(result, Err(SessionError::Decode(_))));
    }

    #[test]
    fn test_missing_id_fails_closed() {
        let token = TestTokens::unsigned(&json!({"email": "a@b.com"}));
        assert!(matches!(
            ClaimsDecoder::decode(&token),
            Err(SessionError::Decode(_))
        ));
    }

    #[test]
    fn test_claim_priority_first_match_wins() {
        let token = TestTokens::unsigned(&json!({
            "sub": "kc-123",
            "userId": "legacy-9",
            "email": "thandi@example.com",
            "preferred_username": "thandi_k",
            "username": "thandi",
            "given_name": "Thandi",
            "firstName": "Ignored",
            "lastName": "Khumalo",
            "contactNumber": "0831112222",
            "idNumber": "9001015800087"
        }));

        let identity = ClaimsDecoder::decode(&token).unwrap();
        assert_eq!(identity.id, "kc-123");
        assert_eq!(identity.username, "thandi");
        assert_eq!(identity.first_name, "Thandi");
        assert_eq!(identity.last_name, "Khumalo");
        assert_eq!(identity.contact_number.as_deref(), Some("0831112222"));
        assert_eq!(identity.id_number.as_deref(), Some("9001015800087"));
    }

    #[test]
    fn test_empty_claim_falls_through() {
        let token = TestTokens::unsigned(&json!({"sub": "", "userId": "u7", "email": "x@y.z"}));
        assert_eq!(ClaimsDecoder::decode(&token).unwrap().id, "u7");
    }

    #[test]
    fn test_numeric_id_claim() {
        let token = TestTokens::unsigned(&json!({"id": 42, "email": "x@y.z"}));
        assert_eq!(ClaimsDecoder::decode(&token).unwrap().id, "42");
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(ClaimsDecoder::decode("not-a-jwt").is_err());
        assert!(ClaimsDecoder::decode("only.two").is_err());
        assert!(ClaimsDecoder::decode("a.b.c.d").is_err());
        assert!(ClaimsDecoder::decode("header.!!!.signature").is_err());

        let not_json = general_purpose::URL_SAFE_NO_PAD.encode(b"not json");
        assert!(ClaimsDecoder::decode(&format!("h.{not_json}.s")).is_err());

        let not_object = general_purpose::URL_SAFE_NO_PAD.encode(b"[1,2]");
        assert!(ClaimsDecoder::decode(&format!("h.{not_object}.s")).is_err());
    }

    #[test]
    fn test_expiry_claim() {
        let token = TestTokens::unsigned(&json!({"sub": "u1", "email": "a@b.com", "exp": 1_900_000_000}));
        let expiry = ClaimsDecoder::expiry(&token).unwrap();
        assert_eq!(expiry.timestamp(), 1_900_000_000);

        assert!(ClaimsDecoder::expiry("opaque-token").is_none());
        let no_exp = TestTokens::unsigned(&json!({"sub": "u1"}));
        assert!(ClaimsDecoder::expiry(&no_exp).is_none());
    }

    #[test]
    fn test_lifetime_from_issued_at() {
        let token = TestTokens::unsigned(&json!({"exp": 1_900_000_300, "iat": 1_900_000_000}));
        assert_eq!(
            ClaimsDecoder::lifetime(&token),
            Some(chrono::Duration::seconds(300))
        );

        let no_iat = TestTokens::unsigned(&json!({"exp": 1_900_000_300}));
        assert!(ClaimsDecoder::lifetime(&no_iat).is_none());
        let inverted = TestTokens::unsigned(&json!({"exp": 1, "iat": 2}));
        assert!(ClaimsDecoder::lifetime(&inverted).is_none());
    }
}
