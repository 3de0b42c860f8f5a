//! # Protocol
//!
//! The wire format shared by every endpoint: a length-prefixed JSON segment
//! followed by raw data blocks.
//!
//! ## Modules
//!
//! - [`codec`]: Frame encoding and decoding
//! - [`block`]: The [`DataBlock`] value type and its metadata
//! - [`error`]: [`ValidationError`] and [`FrameError`]

pub mod block;
pub mod codec;
pub mod error;

pub use block::{BlockMetadata, DataBlock};
pub use codec::{decode, encode, Codec, Message, BLOCKS_KEY, HEADER_SIZE, MESSAGE_KEY};
pub use error::{FrameError, ValidationError};
