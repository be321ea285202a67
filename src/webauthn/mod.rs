//! `WebAuthn` ceremony support
//!
//! Payload types for the backend's `/webauthn` endpoints, the Base64 dialect
//! transcoder bridging them to the native biometric API, and the
//! [`PlatformAuthenticator`] seam that API is reached through.

mod ceremony;
mod errors;
pub mod transcoder;
mod types;

// Re-exports for public use
pub use ceremony::PlatformAuthenticator;
pub use errors::{Dialect, TranscodeError};
pub use transcoder::{to_native_base64, to_wire_base64url};
pub use types::*;
