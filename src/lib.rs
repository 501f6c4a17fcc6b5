//! Frontend edge server library.
//!
//! Session authentication against an OpenID Connect provider, an API
//! reverse proxy with bearer token injection, and SPA shell serving in
//! production and development modes.

pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pages;
pub mod routing;
pub mod security;

pub use config::{EnvSnapshot, FrontendConfig, Settings};
pub use http::FrontendServer;
pub use lifecycle::Shutdown;
