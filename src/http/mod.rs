//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → health.rs (internal header short-circuit, /healthz)
//!     → auth gate
//!     → server.rs dispatch
//!         → proxy.rs (API prefix: strip, bearer, forward)
//!         → pages (SPA shell)
//!     → response.rs (redirects, hop-by-hop stripping)
//! ```

pub mod health;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{FrontendServer, FrontendServerBuilder};
