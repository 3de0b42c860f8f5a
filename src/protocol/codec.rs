//! # Frame Codec
//!
//! Encodes a JSON message plus zero or more [`DataBlock`]s into a single frame,
//! and decodes it back.
//!
//! ## Wire Format
//!
//! ```text
//! [4 bytes: JSON length, big-endian u32] [N bytes: JSON segment] [block 1][block 2]...
//! ```
//!
//! The JSON segment is an object:
//!
//! ```text
//! {"data_dict": { ...message... }, "data_blocks": [{"name": "f", "size": 4}, ...]}
//! ```
//!
//! `data_blocks` is only written when there are blocks. Its order matches the
//! order of the concatenated block bytes; each block starts where the previous
//! one ended. Bytes after the last declared block are ignored.

use serde::{Deserialize, Serialize};

use super::block::{BlockMetadata, DataBlock};
use super::error::{FrameError, ValidationError};
use crate::common::text::{ErrorPolicy, TextEncoding};

/// Size of the length header in bytes.
pub const HEADER_SIZE: usize = 4;

/// Top-level key holding the caller's message.
pub const MESSAGE_KEY: &str = "data_dict";

/// Top-level key holding block metadata; reserved for the protocol.
pub const BLOCKS_KEY: &str = "data_blocks";

/// A JSON object with string keys, the message carried by every frame.
pub type Message = serde_json::Map<String, serde_json::Value>;

#[derive(Serialize)]
struct OutgoingEnvelope<'a> {
    #[serde(rename = "data_dict")]
    message: &'a Message,
    #[serde(rename = "data_blocks", skip_serializing_if = "Vec::is_empty")]
    blocks: Vec<BlockMetadata>,
}

#[derive(Deserialize)]
struct IncomingEnvelope {
    #[serde(rename = "data_dict", default)]
    message: Message,
    #[serde(rename = "data_blocks", default)]
    blocks: Vec<BlockMetadata>,
}

/// Text settings shared by encode and decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Codec {
    pub encoding: TextEncoding,
    pub policy: ErrorPolicy,
}

impl Codec {
    pub fn new(encoding: TextEncoding, policy: ErrorPolicy) -> Self {
        Self { encoding, policy }
    }

    pub fn encode(&self, message: &Message, blocks: &[DataBlock]) -> Result<Vec<u8>, ValidationError> {
        encode(message, blocks, self.encoding, self.policy)
    }

    pub fn decode(&self, frame: &[u8]) -> Result<(Message, Vec<DataBlock>), FrameError> {
        decode(frame, self.encoding, self.policy)
    }
}

/// Serialize `message` and `blocks` into one frame.
///
/// # Errors
/// - [`ValidationError::ReservedKey`] if `message` contains [`BLOCKS_KEY`]
/// - [`ValidationError::Text`] if the JSON can't be encoded under a strict policy
/// - [`ValidationError::TooLarge`] if the JSON segment overflows the header
///
/// # Example
/// ```
/// use json_network::protocol::{decode, encode, Message};
/// use json_network::common::text::{ErrorPolicy, TextEncoding};
///
/// let mut message = Message::new();
/// message.insert("text".into(), "hi".into());
///
/// let frame = encode(&message, &[], TextEncoding::Utf8, ErrorPolicy::Strict).unwrap();
/// let (decoded, blocks) = decode(&frame, TextEncoding::Utf8, ErrorPolicy::Strict).unwrap();
/// assert_eq!(decoded, message);
/// assert!(blocks.is_empty());
/// ```
pub fn encode(
    message: &Message,
    blocks: &[DataBlock],
    encoding: TextEncoding,
    policy: ErrorPolicy,
) -> Result<Vec<u8>, ValidationError> {
    if message.contains_key(BLOCKS_KEY) {
        return Err(ValidationError::ReservedKey(BLOCKS_KEY));
    }

    let envelope = OutgoingEnvelope {
        message,
        blocks: blocks.iter().map(DataBlock::metadata).collect(),
    };
    let json = serde_json::to_string(&envelope)?;
    let json_bytes = encoding.encode_text(&json, policy)?;

    let header = u32::try_from(json_bytes.len())
        .map_err(|_| ValidationError::TooLarge(json_bytes.len()))?;

    let block_bytes: usize = blocks.iter().map(DataBlock::size).sum();
    let mut frame = Vec::with_capacity(HEADER_SIZE + json_bytes.len() + block_bytes);
    frame.extend_from_slice(&header.to_be_bytes());
    frame.extend_from_slice(&json_bytes);
    for block in blocks {
        frame.extend_from_slice(block.data());
    }

    Ok(frame)
}

/// Split a frame back into its message and blocks.
///
/// Every block's declared size is checked against the remaining buffer
/// before any bytes are copied out.
///
/// # Errors
/// - [`FrameError::Truncated`] if the buffer is shorter than header + JSON
/// - [`FrameError::Text`] / [`FrameError::Json`] if the JSON segment is malformed
/// - [`FrameError::BlockOutOfBounds`] if a block runs past the end of the buffer
pub fn decode(
    frame: &[u8],
    encoding: TextEncoding,
    policy: ErrorPolicy,
) -> Result<(Message, Vec<DataBlock>), FrameError> {
    if frame.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            needed: HEADER_SIZE,
            available: frame.len(),
        });
    }

    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&frame[..HEADER_SIZE]);
    let json_len = u32::from_be_bytes(header) as usize;

    let json_end = HEADER_SIZE.saturating_add(json_len);
    if frame.len() < json_end {
        return Err(FrameError::Truncated {
            needed: json_end,
            available: frame.len(),
        });
    }

    let json = encoding.decode_text(&frame[HEADER_SIZE..json_end], policy)?;
    let envelope: IncomingEnvelope = serde_json::from_str(&json)?;

    let mut blocks = Vec::with_capacity(envelope.blocks.len());
    let mut offset = json_end;
    for metadata in envelope.blocks {
        let end = usize::try_from(metadata.size)
            .ok()
            .and_then(|size| offset.checked_add(size))
            .filter(|&end| end <= frame.len())
            .ok_or_else(|| FrameError::BlockOutOfBounds {
                name: metadata.name.clone(),
                offset,
                size: metadata.size,
                available: frame.len(),
            })?;

        blocks.push(DataBlock::new(
            metadata.name,
            frame[offset..end].to_vec(),
            metadata.encoding,
        ));
        offset = end;
    }

    let mut message = envelope.message;
    message.remove(BLOCKS_KEY);

    Ok((message, blocks))
}
