//! # Data Blocks
//!
//! A [`DataBlock`] is a named chunk of raw bytes that rides along after the
//! JSON segment of a frame. Blocks are never interpreted by the protocol; the
//! optional `encoding` only tells the receiver how to read them back as text.

use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::path::Path;

use crate::common::text::{ErrorPolicy, TextEncoding, TextError};

/// Metadata describing one block inside the JSON segment.
///
/// Serialized as `{"name": ..., "size": ..., "encoding"?: ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// A named binary payload attached to a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    name: String,
    data: Vec<u8>,
    encoding: Option<String>,
}

impl DataBlock {
    /// Create a block from raw bytes.
    ///
    /// # Example
    /// ```
    /// use json_network::DataBlock;
    ///
    /// let block = DataBlock::new("f", b"1234".to_vec(), None);
    /// assert_eq!(block.size(), 4);
    /// ```
    pub fn new(name: impl Into<String>, data: Vec<u8>, encoding: Option<String>) -> Self {
        Self {
            name: name.into(),
            data,
            encoding,
        }
    }

    /// Create a block from the entire contents of a binary stream.
    pub fn from_reader<R: Read>(
        name: impl Into<String>,
        mut reader: R,
        encoding: Option<String>,
    ) -> io::Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::new(name, data, encoding))
    }

    /// Create a block from the entire contents of a text stream written in `encoding`.
    ///
    /// The stream's bytes are checked against `encoding` under `policy` and
    /// stored in that same encoding, which the block records so the receiver
    /// can turn it back into text.
    pub fn from_text_reader<R: Read>(
        name: impl Into<String>,
        mut reader: R,
        encoding: TextEncoding,
        policy: ErrorPolicy,
    ) -> io::Result<Self> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        let data = encoding
            .decode_text(&raw, policy)
            .and_then(|text| encoding.encode_text(&text, policy))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Self::new(name, data, Some(encoding.name().to_string())))
    }

    /// Read a whole file into a block named `name`.
    pub async fn from_file(name: impl Into<String>, path: impl AsRef<Path>) -> io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        Ok(Self::new(name, data, None))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// Number of bytes in the block.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Metadata entry for the JSON segment; `encoding` only when one is set.
    pub fn metadata(&self) -> BlockMetadata {
        BlockMetadata {
            name: self.name.clone(),
            size: self.data.len() as u64,
            encoding: self.encoding.clone(),
        }
    }

    /// Decode the block as text using its declared encoding.
    ///
    /// Returns `Ok(None)` for blocks without an encoding, which are plain binary.
    pub fn text(&self, policy: ErrorPolicy) -> Result<Option<String>, TextError> {
        match &self.encoding {
            None => Ok(None),
            Some(name) => {
                let encoding: TextEncoding = name.parse()?;
                encoding.decode_text(&self.data, policy).map(Some)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_metadata_omits_missing_encoding() {
        let block = DataBlock::new("raw", vec![1, 2, 3], None);
        let json = serde_json::to_value(block.metadata()).unwrap();
        assert_eq!(json, serde_json::json!({"name": "raw", "size": 3}));

        let block = DataBlock::new("notes", b"hi".to_vec(), Some("utf-8".to_string()));
        let json = serde_json::to_value(block.metadata()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "notes", "size": 2, "encoding": "utf-8"})
        );
    }

    #[test]
    fn test_from_reader_reads_to_end() {
        let block = DataBlock::from_reader("bin", Cursor::new(vec![0u8; 10_000]), None).unwrap();
        assert_eq!(block.size(), 10_000);
        assert_eq!(block.encoding(), None);
        assert_eq!(block.into_data(), vec![0u8; 10_000]);
    }

    #[test]
    fn test_from_text_reader_keeps_stream_encoding() {
        let block = DataBlock::from_text_reader(
            "menu",
            Cursor::new(vec![b'c', b'a', b'f', 0xe9]),
            TextEncoding::Latin1,
            ErrorPolicy::Strict,
        )
        .unwrap();

        assert_eq!(block.data(), &[b'c', b'a', b'f', 0xe9]);
        assert_eq!(block.encoding(), Some("latin-1"));
        assert_eq!(
            block.text(ErrorPolicy::Strict).unwrap().as_deref(),
            Some("caf\u{e9}")
        );
    }

    #[test]
    fn test_from_text_reader_utf8_stream() {
        let block = DataBlock::from_text_reader(
            "menu",
            Cursor::new("caf\u{e9}".as_bytes()),
            TextEncoding::Utf8,
            ErrorPolicy::Strict,
        )
        .unwrap();

        assert_eq!(block.data(), "caf\u{e9}".as_bytes());
        assert_eq!(block.encoding(), Some("utf-8"));
    }

    #[test]
    fn test_from_text_reader_strict_failure() {
        let err = DataBlock::from_text_reader(
            "menu",
            Cursor::new(vec![b'5', 0xe9]),
            TextEncoding::Ascii,
            ErrorPolicy::Strict,
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_from_text_reader_replace_policy() {
        let block = DataBlock::from_text_reader(
            "menu",
            Cursor::new(vec![b'5', 0xe9]),
            TextEncoding::Ascii,
            ErrorPolicy::Replace,
        )
        .unwrap();
        assert_eq!(block.data(), b"5?");
    }

    #[test]
    fn test_binary_block_has_no_text() {
        let block = DataBlock::new("bin", vec![0xff, 0x00], None);
        assert_eq!(block.text(ErrorPolicy::Strict).unwrap(), None);
    }

    #[tokio::test]
    async fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        std::fs::write(&path, b"file contents").unwrap();

        let block = DataBlock::from_file("payload.bin", &path).await.unwrap();
        assert_eq!(block.name(), "payload.bin");
        assert_eq!(block.data(), b"file contents");
    }
}
