//! Binary frame codec
//!
//! Frames are postcard-encoded `HubMessage` values behind a one-byte
//! compression flag. Bodies at or above the threshold are LZ4 block compressed
//! with the uncompressed size prepended.

use super::HubMessage;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Compression flag: body is uncompressed
pub const COMPRESSION_FLAG_NONE: u8 = 0x00;

/// Compression flag: body is LZ4 compressed
pub const COMPRESSION_FLAG_LZ4: u8 = 0x01;

/// Errors from encoding or decoding frames and payloads
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Serialization failed: {0}")]
    Encode(postcard::Error),

    #[error("Deserialization failed: {0}")]
    Decode(postcard::Error),

    #[error("Empty frame")]
    EmptyFrame,

    #[error("Unknown compression flag: 0x{0:02X}")]
    UnknownFlag(u8),

    #[error("LZ4 decompression failed: {0}")]
    Decompress(String),
}

/// Frame codec negotiated once per transport
#[derive(Debug, Clone, Copy)]
pub struct HubCodec {
    threshold: usize,
}

impl HubCodec {
    /// Create a codec compressing bodies of at least `threshold` bytes
    #[must_use]
    pub const fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    #[must_use]
    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    /// Encode a frame
    pub fn encode(&self, message: &HubMessage) -> Result<Vec<u8>, CodecError> {
        let body = postcard::to_allocvec(message).map_err(CodecError::Encode)?;

        if body.len() < self.threshold {
            let mut out = Vec::with_capacity(1 + body.len());
            out.push(COMPRESSION_FLAG_NONE);
            out.extend_from_slice(&body);
            Ok(out)
        } else {
            let compressed = compress_prepend_size(&body);
            let mut out = Vec::with_capacity(1 + compressed.len());
            out.push(COMPRESSION_FLAG_LZ4);
            out.extend_from_slice(&compressed);
            Ok(out)
        }
    }

    /// Decode a frame
    pub fn decode(&self, frame: &[u8]) -> Result<HubMessage, CodecError> {
        let (&flag, body) = frame.split_first().ok_or(CodecError::EmptyFrame)?;

        match flag {
            COMPRESSION_FLAG_NONE => postcard::from_bytes(body).map_err(CodecError::Decode),
            COMPRESSION_FLAG_LZ4 => {
                let body = decompress_size_prepended(body)
                    .map_err(|e| CodecError::Decompress(e.to_string()))?;
                postcard::from_bytes(&body).map_err(CodecError::Decode)
            }
            flag => Err(CodecError::UnknownFlag(flag)),
        }
    }

    /// Encode invocation arguments or a completion result
    pub fn encode_payload<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        postcard::to_allocvec(value).map_err(CodecError::Encode)
    }

    /// Decode invocation arguments or a completion result
    pub fn decode_payload<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        postcard::from_bytes(bytes).map_err(CodecError::Decode)
    }
}

impl Default for HubCodec {
    fn default() -> Self {
        Self::new(256)
    }
}
