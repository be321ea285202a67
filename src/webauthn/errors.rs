//! `WebAuthn` ceremony error types
//!
//! This module defines the error raised when a ceremony field is not valid
//! Base64 in the dialect it is expected to be in.

use std::fmt;

/// Base64 dialects involved in a ceremony
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Standard alphabet with `=` padding, used by the native biometric API
    Native,
    /// URL-safe alphabet without padding, used by the backend and `WebAuthn`
    Wire,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Native => write!(f, "base64"),
            Dialect::Wire => write!(f, "base64url"),
        }
    }
}

/// Transcoding errors; the ceremony must be aborted when one is raised
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeError {
    /// A character outside the dialect's alphabet
    InvalidCharacter {
        dialect: Dialect,
        position: usize,
        character: char,
    },

    /// Padding that is misplaced, too long, or present where none is allowed
    InvalidPadding { dialect: Dialect, detail: String },

    /// A length no Base64 encoding can have
    InvalidLength { dialect: Dialect, length: usize },

    /// Well-formed characters that still do not decode to bytes
    Undecodable { dialect: Dialect, detail: String },

    /// A named ceremony field failed to transcode
    Field { field: String, reason: String },
}

impl TranscodeError {
    /// Attach the ceremony field name to an error
    #[must_use]
    pub fn in_field(self, field: &str) -> Self {
        match self {
            Self::Field { .. } => self,
            other => Self::Field {
                field: field.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

impl fmt::Display for TranscodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscodeError::InvalidCharacter {
                dialect,
                position,
                character,
            } => write!(
                f,
                "Invalid {dialect} character {character:?} at position {position}"
            ),
            TranscodeError::InvalidPadding { dialect, detail } => {
                write!(f, "Invalid {dialect} padding: {detail}")
            }
            TranscodeError::InvalidLength { dialect, length } => {
                write!(f, "Invalid {dialect} length: {length}")
            }
            TranscodeError::Undecodable { dialect, detail } => {
                write!(f, "Undecodable {dialect} data: {detail}")
            }
            TranscodeError::Field { field, reason } => write!(f, "Field '{field}': {reason}"),
        }
    }
}

impl std::error::Error for TranscodeError {}
