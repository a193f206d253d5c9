//! Base64 image data URLs (`data:image/png;base64,...`).

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Reasons a string is not a usable image data URL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataUrlError {
    #[error("must be a data URL")]
    NotDataUrl,

    #[error("must be base64-encoded")]
    NotBase64,

    #[error("must have an image MIME type, got '{0}'")]
    NotImage(String),

    #[error("contains invalid base64 data")]
    InvalidPayload,

    #[error("is empty")]
    Empty,
}

/// A parsed image data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    mime_type: String,
    data: String,
}

impl DataUrl {
    /// Parses and validates an image data URL.
    ///
    /// The MIME type must be `image/*`, the encoding must be base64 and the
    /// payload must decode.
    ///
    /// # Errors
    /// Returns a `DataUrlError` describing the first rule violated.
    pub fn parse_image(input: &str) -> Result<Self, DataUrlError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(DataUrlError::Empty);
        }
        let rest = input.strip_prefix("data:").ok_or(DataUrlError::NotDataUrl)?;
        let (header, data) = rest.split_once(',').ok_or(DataUrlError::NotDataUrl)?;
        let mime_type = header.strip_suffix(";base64").ok_or(DataUrlError::NotBase64)?;
        if !mime_type.starts_with("image/") || mime_type.len() <= "image/".len() {
            return Err(DataUrlError::NotImage(mime_type.to_string()));
        }
        if data.is_empty() || STANDARD.decode(data).is_err() {
            return Err(DataUrlError::InvalidPayload);
        }
        Ok(Self { mime_type: mime_type.to_string(), data: data.to_string() })
    }

    /// Builds a data URL from raw bytes.
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self { mime_type: mime_type.into(), data: STANDARD.encode(bytes) }
    }

    /// Builds a data URL from an already-encoded base64 payload.
    pub fn from_base64(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self { mime_type: mime_type.into(), data: data.into() }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The base64 payload without the `data:...;base64,` prefix.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Decodes the payload.
    ///
    /// # Errors
    /// Returns `DataUrlError::InvalidPayload` if the payload is not base64.
    pub fn decode(&self) -> Result<Vec<u8>, DataUrlError> {
        STANDARD.decode(&self.data).map_err(|_| DataUrlError::InvalidPayload)
    }

    /// Size of the decoded payload, computed from the base64 length.
    pub fn decoded_len(&self) -> usize {
        let padding = self.data.bytes().rev().take_while(|b| *b == b'=').count();
        (self.data.len() / 4 * 3).saturating_sub(padding)
    }
}

impl fmt::Display for DataUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime_type, self.data)
    }
}

impl FromStr for DataUrl {
    type Err = DataUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_image(s)
    }
}

impl Serialize for DataUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DataUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_image(&raw).map_err(serde::de::Error::custom)
    }
}
