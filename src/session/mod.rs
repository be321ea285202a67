//! Session Management Module
//!
//! # Modules
//!
//! - [`manager`] - Session state machine, single-flight refresh and identity cache

pub mod manager;

// Re-export commonly used items for convenience
pub use manager::SessionManager;
