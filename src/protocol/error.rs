//! Error types for frame encoding and decoding.

use thiserror::Error;

use crate::common::text::TextError;

/// Raised by [`encode`](super::codec::encode) when the caller's input can't be framed.
///
/// These are recoverable: the caller fixes the input and tries again.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The message already uses a key the protocol reserves for itself.
    #[error("\"{0}\" key not allowed in message")]
    ReservedKey(&'static str),

    /// The JSON segment can't be represented in the requested text encoding.
    #[error("cannot encode JSON segment: {0}")]
    Text(#[from] TextError),

    /// The message could not be serialized to JSON.
    #[error("cannot serialize message: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON segment doesn't fit the 4-byte length header.
    #[error("JSON segment is {0} bytes, header allows at most {max}", max = u32::MAX)]
    TooLarge(usize),
}

/// Raised by [`decode`](super::codec::decode) for malformed or truncated frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Buffer is shorter than the header says it should be.
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// The JSON segment isn't valid text in the configured encoding.
    #[error("cannot decode JSON segment: {0}")]
    Text(#[from] TextError),

    /// The JSON segment doesn't parse, or has the wrong shape.
    #[error("invalid JSON segment: {0}")]
    Json(#[from] serde_json::Error),

    /// A block's declared size runs past the end of the buffer.
    #[error(
        "block '{name}' declares {size} bytes at offset {offset}, but the frame is {available} bytes"
    )]
    BlockOutOfBounds {
        name: String,
        offset: usize,
        size: u64,
        available: usize,
    },
}
