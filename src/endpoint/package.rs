//! Queue entries moved between the application and the endpoint's tasks.

use std::fmt;
use std::net::SocketAddr;

use crate::common::text::{ErrorPolicy, TextEncoding};
use crate::protocol::{encode, DataBlock, Message, ValidationError};

/// An encoded frame waiting in the outbound queue, plus where it goes.
///
/// Consumed by the sender loop: one connection per package, then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendPackage {
    pub address: String,
    pub port: u16,
    pub payload: Vec<u8>,
}

impl SendPackage {
    pub fn new(address: impl Into<String>, port: u16, payload: Vec<u8>) -> Self {
        Self {
            address: address.into(),
            port,
            payload,
        }
    }

    /// Encode `message` and `blocks` into a package for `address:port`.
    ///
    /// # Example
    /// ```ignore
    /// let package = SendPackage::package(
    ///     "localhost", 13579, &message, &blocks, TextEncoding::Utf8, ErrorPolicy::Strict,
    /// )?;
    /// endpoint.enqueue(package)?;
    /// ```
    pub fn package(
        address: impl Into<String>,
        port: u16,
        message: &Message,
        blocks: &[DataBlock],
        encoding: TextEncoding,
        policy: ErrorPolicy,
    ) -> Result<Self, ValidationError> {
        let payload = encode(message, blocks, encoding, policy)?;
        Ok(Self::new(address, port, payload))
    }
}

/// A decoded frame taken off the inbound queue, plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RecvPackage {
    /// Peer address of the connection that delivered the frame
    pub address: SocketAddr,
    pub message: Message,
    pub blocks: Vec<DataBlock>,
}

impl fmt::Display for RecvPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.address)?;
        writeln!(f, "{}", serde_json::Value::Object(self.message.clone()))?;
        let names: Vec<String> = self
            .blocks
            .iter()
            .map(|b| format!("{} ({} bytes)", b.name(), b.size()))
            .collect();
        write!(f, "[{}]", names.join(", "))
    }
}
