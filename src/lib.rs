//! Local API gateway emulator.
//!
//! Makes incoming HTTP calls look, to a backend, like calls from the
//! production API gateway, and makes errors and CORS headers look, to the
//! caller, like production gateway responses.

pub mod backend;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::EmulatorConfig;
pub use error::{RequestError, StatusCodeMap};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
