//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Outgoing response (production only):
//!     → headers.rs (hardening headers, if not already set)
//! ```
//!
//! Session and allowlist enforcement live in `auth`.

pub mod headers;
