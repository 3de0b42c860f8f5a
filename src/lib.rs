//! # json-network
//!
//! Framed JSON messaging over TCP. Each frame carries a JSON message and any
//! number of named binary blocks:
//!
//! ```text
//! [4 bytes: JSON length, big-endian] [JSON segment] [block bytes...]
//! ```
//!
//! - [`protocol`]: the frame codec and [`DataBlock`]
//! - [`endpoint`]: a node that queues outbound frames and collects inbound ones
//! - [`common`]: text encodings and configuration

pub mod common;
pub mod endpoint;
pub mod protocol;

pub use common::config::EndpointConfig;
pub use common::text::{ErrorPolicy, TextEncoding};
pub use endpoint::{CloseMode, Endpoint, EndpointError, EndpointState, RecvPackage, SendPackage};
pub use protocol::{decode, encode, Codec, DataBlock, FrameError, Message, ValidationError};
