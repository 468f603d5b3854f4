//! keycast-core: configuration and error types shared by the keycast crates.

pub mod config;
pub mod error;

pub use config::{ConnectionsConfig, GatewayConfig, KeycastConfig};
pub use error::{KeycastError, Result};
