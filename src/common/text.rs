//! # Text Encodings
//!
//! The JSON segment of a frame, and any block that declares an `encoding`, is
//! text carried as bytes. This module converts between Rust strings and those
//! bytes for the encodings the protocol supports, under an [`ErrorPolicy`]
//! that decides what happens to characters or bytes that don't fit.
//!
//! | Encoding | Accepted names                      |
//! |----------|-------------------------------------|
//! | UTF-8    | `utf-8`, `utf8`                     |
//! | ASCII    | `ascii`, `us-ascii`                 |
//! | Latin-1  | `latin-1`, `latin1`, `iso-8859-1`   |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Replacement used when encoding a character the target encoding can't represent.
const ENCODE_REPLACEMENT: u8 = b'?';

/// Errors raised by strict text conversion or unknown encoding names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextError {
    #[error("'{encoding}' codec can't encode character {character:?} in position {position}")]
    Unencodable {
        encoding: &'static str,
        character: char,
        position: usize,
    },

    #[error("'{encoding}' codec can't decode byte 0x{byte:02x} in position {position}")]
    Undecodable {
        encoding: &'static str,
        byte: u8,
        position: usize,
    },

    #[error("unknown text encoding '{0}'")]
    UnknownEncoding(String),
}

/// How to treat characters or bytes that the encoding can't handle.
///
/// Parsing never fails: only the exact names `strict`, `replace` and `ignore`
/// are recognized, and anything else falls back to [`ErrorPolicy::Strict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorPolicy {
    /// Fail on the first problem.
    #[default]
    Strict,
    /// Substitute `?` when encoding and U+FFFD when decoding.
    Replace,
    /// Silently drop the offending character or byte.
    Ignore,
}

impl ErrorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorPolicy::Strict => "strict",
            ErrorPolicy::Replace => "replace",
            ErrorPolicy::Ignore => "ignore",
        }
    }
}

impl From<&str> for ErrorPolicy {
    fn from(name: &str) -> Self {
        match name {
            "replace" => ErrorPolicy::Replace,
            "ignore" => ErrorPolicy::Ignore,
            _ => ErrorPolicy::Strict,
        }
    }
}

impl From<String> for ErrorPolicy {
    fn from(name: String) -> Self {
        ErrorPolicy::from(name.as_str())
    }
}

impl From<ErrorPolicy> for String {
    fn from(policy: ErrorPolicy) -> Self {
        policy.as_str().to_string()
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A text encoding understood by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TextEncoding {
    #[default]
    Utf8,
    Ascii,
    Latin1,
}

impl TextEncoding {
    /// Canonical name, as written into block metadata.
    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Ascii => "ascii",
            TextEncoding::Latin1 => "latin-1",
        }
    }

    /// Highest code point representable as a single byte, if the encoding is single-byte.
    fn single_byte_limit(&self) -> Option<u32> {
        match self {
            TextEncoding::Utf8 => None,
            TextEncoding::Ascii => Some(0x7f),
            TextEncoding::Latin1 => Some(0xff),
        }
    }

    /// Convert `text` into bytes of this encoding.
    pub fn encode_text(&self, text: &str, policy: ErrorPolicy) -> Result<Vec<u8>, TextError> {
        let limit = match self.single_byte_limit() {
            None => return Ok(text.as_bytes().to_vec()),
            Some(limit) => limit,
        };

        let mut out = Vec::with_capacity(text.len());
        for (position, character) in text.chars().enumerate() {
            let code = character as u32;
            if code <= limit {
                out.push(code as u8);
                continue;
            }
            match policy {
                ErrorPolicy::Strict => {
                    return Err(TextError::Unencodable {
                        encoding: self.name(),
                        character,
                        position,
                    })
                }
                ErrorPolicy::Replace => out.push(ENCODE_REPLACEMENT),
                ErrorPolicy::Ignore => {}
            }
        }
        Ok(out)
    }

    /// Convert bytes of this encoding back into a string.
    pub fn decode_text(&self, bytes: &[u8], policy: ErrorPolicy) -> Result<String, TextError> {
        match self {
            TextEncoding::Utf8 => decode_utf8(bytes, policy),
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
            TextEncoding::Ascii => {
                let mut out = String::with_capacity(bytes.len());
                for (position, &byte) in bytes.iter().enumerate() {
                    if byte.is_ascii() {
                        out.push(byte as char);
                        continue;
                    }
                    match policy {
                        ErrorPolicy::Strict => {
                            return Err(TextError::Undecodable {
                                encoding: self.name(),
                                byte,
                                position,
                            })
                        }
                        ErrorPolicy::Replace => out.push(char::REPLACEMENT_CHARACTER),
                        ErrorPolicy::Ignore => {}
                    }
                }
                Ok(out)
            }
        }
    }
}

fn decode_utf8(bytes: &[u8], policy: ErrorPolicy) -> Result<String, TextError> {
    match policy {
        ErrorPolicy::Replace => return Ok(String::from_utf8_lossy(bytes).into_owned()),
        ErrorPolicy::Strict => {
            return std::str::from_utf8(bytes)
                .map(str::to_string)
                .map_err(|e| TextError::Undecodable {
                    encoding: TextEncoding::Utf8.name(),
                    byte: bytes[e.valid_up_to()],
                    position: e.valid_up_to(),
                })
        }
        ErrorPolicy::Ignore => {}
    }

    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return Ok(out);
            }
            Err(e) => {
                let (valid, invalid) = rest.split_at(e.valid_up_to());
                if let Ok(valid) = std::str::from_utf8(valid) {
                    out.push_str(valid);
                }
                // A truncated sequence at the very end has no error length.
                let skip = e.error_len().unwrap_or(invalid.len());
                rest = &invalid[skip..];
            }
        }
    }
}

impl FromStr for TextEncoding {
    type Err = TextError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "ascii" | "us-ascii" => Ok(TextEncoding::Ascii),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            _ => Err(TextError::UnknownEncoding(name.to_string())),
        }
    }
}

impl TryFrom<String> for TextEncoding {
    type Error = TextError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<TextEncoding> for String {
    fn from(encoding: TextEncoding) -> Self {
        encoding.name().to_string()
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_policy_falls_back_to_strict() {
        assert_eq!(ErrorPolicy::from("replace"), ErrorPolicy::Replace);
        assert_eq!(ErrorPolicy::from("ignore"), ErrorPolicy::Ignore);
        assert_eq!(ErrorPolicy::from("strict"), ErrorPolicy::Strict);
        // Names match exactly; case or padding variants are unrecognized.
        assert_eq!(ErrorPolicy::from("IGNORE"), ErrorPolicy::Strict);
        assert_eq!(ErrorPolicy::from("Replace"), ErrorPolicy::Strict);
        assert_eq!(ErrorPolicy::from(" ignore "), ErrorPolicy::Strict);
        assert_eq!(ErrorPolicy::from("backslashreplace"), ErrorPolicy::Strict);
        assert_eq!(ErrorPolicy::from(""), ErrorPolicy::Strict);
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!("UTF8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert_eq!("iso_8859_1".parse::<TextEncoding>().unwrap(), TextEncoding::Latin1);
        assert_eq!("us-ascii".parse::<TextEncoding>().unwrap(), TextEncoding::Ascii);
        assert!(matches!(
            "ebcdic".parse::<TextEncoding>(),
            Err(TextError::UnknownEncoding(_))
        ));
    }

    #[test]
    fn test_ascii_encode_policies() {
        let ascii = TextEncoding::Ascii;
        assert!(matches!(
            ascii.encode_text("caf\u{e9}", ErrorPolicy::Strict),
            Err(TextError::Unencodable { position: 3, .. })
        ));
        assert_eq!(ascii.encode_text("caf\u{e9}", ErrorPolicy::Replace).unwrap(), b"caf?");
        assert_eq!(ascii.encode_text("caf\u{e9}", ErrorPolicy::Ignore).unwrap(), b"caf");
    }

    #[test]
    fn test_latin1_roundtrip() {
        let latin1 = TextEncoding::Latin1;
        let bytes = latin1.encode_text("caf\u{e9}", ErrorPolicy::Strict).unwrap();
        assert_eq!(bytes, vec![b'c', b'a', b'f', 0xe9]);
        assert_eq!(latin1.decode_text(&bytes, ErrorPolicy::Strict).unwrap(), "caf\u{e9}");
        assert!(latin1.encode_text("\u{20ac}", ErrorPolicy::Strict).is_err());
    }

    #[test]
    fn test_utf8_decode_policies() {
        let bytes = b"ok\xffok\xe2\x82";
        let utf8 = TextEncoding::Utf8;
        assert!(matches!(
            utf8.decode_text(bytes, ErrorPolicy::Strict),
            Err(TextError::Undecodable { byte: 0xff, position: 2, .. })
        ));
        assert_eq!(utf8.decode_text(bytes, ErrorPolicy::Ignore).unwrap(), "okok");
        assert_eq!(
            utf8.decode_text(bytes, ErrorPolicy::Replace).unwrap(),
            "ok\u{fffd}ok\u{fffd}"
        );
    }
}
