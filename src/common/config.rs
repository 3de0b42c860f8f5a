//! # Configuration Utilities
//!
//! Endpoint settings and the TOML loader shared by the `server` and `client`
//! binaries.
//!
//! ## Example file
//!
//! ```toml
//! address = "0.0.0.0"
//! port = 13579
//! buffer_size = 8192
//! encoding = "utf-8"
//! errors = "replace"
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;

use super::text::{ErrorPolicy, TextEncoding};
use crate::protocol::Codec;

/// Default log target used when none is configured.
pub const DEFAULT_LOG_TARGET: &str = "json_network";

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Arguments
/// - `path`: Path to the TOML configuration file
///
/// # Returns
/// - `Ok(T)`: Successfully loaded and parsed configuration
/// - `Err`: File I/O or parsing error
///
/// # Example
/// ```ignore
/// let config: EndpointConfig = load_config("config/endpoint.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)?;
    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Settings for one [`Endpoint`](crate::endpoint::Endpoint).
///
/// Every field has a default, so a config file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Address the listening socket binds to (e.g., "localhost", "0.0.0.0")
    pub address: String,
    /// Listening port; 0 picks an ephemeral port
    pub port: u16,
    /// Chunk size for each read from an inbound connection
    pub buffer_size: usize,
    /// Encoding of the JSON segment
    pub encoding: TextEncoding,
    /// What to do with text that doesn't fit `encoding`
    pub errors: ErrorPolicy,
    /// Log target every endpoint message is written under
    pub log_target: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 9999,
            buffer_size: 4096,
            encoding: TextEncoding::Utf8,
            errors: ErrorPolicy::Strict,
            log_target: DEFAULT_LOG_TARGET.to_string(),
        }
    }
}

impl EndpointConfig {
    /// Codec settings derived from this config.
    pub fn codec(&self) -> Codec {
        Codec::new(self.encoding, self.errors)
    }

    /// `address:port` string suitable for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
