//! Base64 dialect transcoding for `WebAuthn` ceremonies
//!
//! The backend speaks unpadded URL-safe Base64 for every binary field while
//! the native biometric API expects padded standard Base64. Both directions
//! are pure character mappings; the input is fully validated (alphabet,
//! padding, length and decodability) first so corrupted data never reaches
//! either side.

use super::errors::{Dialect, TranscodeError};
use base64::{engine::general_purpose, Engine as _};

/// Convert a base64url (wire) value into padded standard base64 (native)
///
/// `-` becomes `+`, `_` becomes `/`, and `=` is appended up to a multiple of 4.
///
/// # Errors
///
/// Returns a [`TranscodeError`] if the input is not valid unpadded base64url.
pub fn to_native_base64(base64url: &str) -> Result<String, TranscodeError> {
    if let Some((position, character)) = base64url
        .char_indices()
        .find(|(_, c)| !is_wire_character(*c))
    {
        return Err(if character == '=' {
            TranscodeError::InvalidPadding {
                dialect: Dialect::Wire,
                detail: format!("unexpected '=' at position {position}"),
            }
        } else {
            TranscodeError::InvalidCharacter {
                dialect: Dialect::Wire,
                position,
                character,
            }
        });
    }
    validate_unpadded(base64url, Dialect::Wire)?;

    let mut native: String = base64url
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while native.len() % 4 != 0 {
        native.push('=');
    }

    Ok(native)
}

/// Convert a standard base64 (native) value into unpadded base64url (wire)
///
/// `+` becomes `-`, `/` becomes `_`, and trailing `=` are stripped. Unpadded
/// native input is accepted.
///
/// # Errors
///
/// Returns a [`TranscodeError`] if the input is not valid standard base64.
pub fn to_wire_base64url(base64: &str) -> Result<String, TranscodeError> {
    let body = base64.trim_end_matches('=');
    let padding = base64.len() - body.len();

    if let Some((position, character)) = body
        .char_indices()
        .find(|(_, c)| !is_native_character(*c))
    {
        return Err(if character == '=' {
            TranscodeError::InvalidPadding {
                dialect: Dialect::Native,
                detail: format!("misplaced '=' at position {position}"),
            }
        } else {
            TranscodeError::InvalidCharacter {
                dialect: Dialect::Native,
                position,
                character,
            }
        });
    }
    if padding > 2 || (padding > 0 && base64.len() % 4 != 0) {
        return Err(TranscodeError::InvalidPadding {
            dialect: Dialect::Native,
            detail: format!("{padding} padding characters on length {}", base64.len()),
        });
    }
    validate_unpadded(body, Dialect::Native)?;

    Ok(body
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect())
}

/// Check the length and decodability of an unpadded value
fn validate_unpadded(value: &str, dialect: Dialect) -> Result<(), TranscodeError> {
    if value.len() % 4 == 1 {
        return Err(TranscodeError::InvalidLength {
            dialect,
            length: value.len(),
        });
    }

    let engine = match dialect {
        Dialect::Wire => &general_purpose::URL_SAFE_NO_PAD,
        Dialect::Native => &general_purpose::STANDARD_NO_PAD,
    };
    engine
        .decode(value)
        .map(|_| ())
        .map_err(|e| TranscodeError::Undecodable {
            dialect,
            detail: e.to_string(),
        })
}

const fn is_wire_character(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

const fn is_native_character(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '+' || c == '/'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_native_replaces_and_pads() {
        assert_eq!(to_native_base64("ab-_").unwrap(), "ab+/");
        assert_eq!(to_native_base64("YQ").unwrap(), "YQ==");
        assert_eq!(to_native_base64("YWI").unwrap(), "YWI=");
        assert_eq!(to_native_base64("YWJj").unwrap(), "YWJj");
        assert_eq!(to_native_base64("").unwrap(), "");
    }

    #[test]
    fn test_to_wire_replaces_and_strips() {
        assert_eq!(to_wire_base64url("ab+/").unwrap(), "ab-_");
        assert_eq!(to_wire_base64url("YQ==").unwrap(), "YQ");
        assert_eq!(to_wire_base64url("YWI=").unwrap(), "YWI");
        assert_eq!(to_wire_base64url("YWI").unwrap(), "YWI");
    }

    #[test]
    fn test_round_trip_over_every_padding_remainder() {
        // Byte lengths 0..=16 cover the 0, 2 and 3 character remainders
        for length in 0..=16u8 {
            let bytes: Vec<u8> = (0..length).map(|i| i.wrapping_mul(97).wrapping_add(251)).collect();
            let wire = general_purpose::URL_SAFE_NO_PAD.encode(&bytes);

            let native = to_native_base64(&wire).unwrap();
            assert_eq!(native.len() % 4, 0);
            assert_eq!(general_purpose::STANDARD.decode(&native).unwrap(), bytes);
            assert_eq!(to_wire_base64url(&native).unwrap(), wire);
        }
    }

    #[test]
    fn test_alphabet_specific_bytes_survive() {
        // 0xfb 0xff 0xbf encodes to "-_-_" / "+/+/"
        let bytes = [0xfb, 0xff, 0xbf];
        let wire = general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        assert_eq!(wire, "-_-_");
        assert_eq!(to_native_base64(&wire).unwrap(), "+/+/");
        assert_eq!(to_wire_base64url("+/+/").unwrap(), wire);
    }

    #[test]
    fn test_rejects_foreign_alphabet() {
        assert!(matches!(
            to_native_base64("ab+c"),
            Err(TranscodeError::InvalidCharacter { character: '+', position: 2, .. })
        ));
        assert!(matches!(
            to_wire_base64url("ab-c"),
            Err(TranscodeError::InvalidCharacter { character: '-', .. })
        ));
        assert!(to_native_base64("ab c").is_err());
        assert!(to_native_base64("abé").is_err());
    }

    #[test]
    fn test_rejects_bad_padding() {
        assert!(matches!(
            to_native_base64("YQ=="),
            Err(TranscodeError::InvalidPadding { .. })
        ));
        assert!(matches!(
            to_wire_base64url("YQ=a"),
            Err(TranscodeError::InvalidPadding { .. })
        ));
        assert!(to_wire_base64url("Y===").is_err());
        assert!(to_wire_base64url("YWI==").is_err());
    }

    #[test]
    fn test_rejects_impossible_length() {
        assert!(matches!(
            to_native_base64("abcde"),
            Err(TranscodeError::InvalidLength { length: 5, .. })
        ));
        assert!(to_wire_base64url("a").is_err());
    }

    #[test]
    fn test_rejects_non_canonical_trailing_bits() {
        // "YR" carries trailing bits that no byte sequence produces
        assert!(matches!(
            to_native_base64("YR"),
            Err(TranscodeError::Undecodable { .. })
        ));
    }

    #[test]
    fn test_field_context() {
        let err = to_native_base64("a").unwrap_err().in_field("challenge");
        assert!(err.to_string().starts_with("Field 'challenge'"));
    }
}
