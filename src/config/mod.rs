//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → env.rs (EnvSnapshot captured once)
//!     → settings.rs (secret rule, env overlay)
//!     → validation.rs (semantic checks, all errors at once)
//!     → Settings (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Settings are immutable once resolved; no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - The production secret rule is checked first and is always fatal

pub mod env;
pub mod loader;
pub mod schema;
pub mod settings;
pub mod validation;

pub use env::EnvSnapshot;
pub use loader::ConfigError;
pub use schema::FrontendConfig;
pub use settings::{RunMode, Settings};
