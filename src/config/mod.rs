//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EmulatorConfig (validated, immutable)
//!     → CLI overrides applied in main
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use validation::{validate_config, ValidationError};
pub use schema::{
    BackendConfig, EmulatorConfig, ExplorerConfig, LimitsConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, TimeoutConfig,
};
