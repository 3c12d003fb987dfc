//! Shared library for the SeventySix query layer
//!
//! This library contains the pieces every resource service depends on:
//! - Error type and result alias
//! - Configuration loaded from the environment
//! - HTTP transport and the transport trait services are injected with
//! - Common wire types

pub mod config;
pub mod error;
pub mod service_client;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
pub use service_client::{ApiRequest, ApiTransport, HttpMethod, ServiceClient};
pub use types::*;
