//! # Common Components
//!
//! Shared utilities used by the protocol, the endpoint, and the binaries.
//!
//! ## Modules
//!
//! - [`text`]: Text encodings and error policies for the JSON segment and text blocks
//! - [`config`]: Endpoint configuration and TOML loading

pub mod config;
pub mod text;
