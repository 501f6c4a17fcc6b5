//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup):
//!     [[apis]] entries + EnvSnapshot
//!     → matcher.rs (validate prefixes)
//!     → upstream.rs (resolve base URL per mode and overrides)
//!     → router.rs (freeze as immutable ApiRouter)
//!
//! Incoming Request (path)
//!     → router.rs (first matching prefix)
//!     → RouteMatch { route, remainder }
//!     → http::proxy forwards to route.upstream_url(remainder)
//! ```
//!
//! # Design Decisions
//! - Routes resolved at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same path always matches the same route

pub mod matcher;
pub mod router;
pub mod upstream;

pub use matcher::ApiPrefix;
pub use router::{ApiRouter, RouteMatch};
pub use upstream::{ResolvedApi, ServiceId};
