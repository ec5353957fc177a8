//! Optional LZ4 compression of message payloads.
//!
//! Every payload starts with a one-byte flag naming its encoding. Snapshots
//! grow with every player and event log entry, so anything at or above
//! [`CompressionConfig::threshold`] is LZ4-compressed; small action messages
//! go out as-is.

use lz4_flex::{compress_prepend_size, decompress};

/// Payload encoding, carried as the first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    /// Raw bytes follow.
    None = 0x00,
    /// LZ4 block with a prepended uncompressed size follows.
    Lz4 = 0x01,
}

impl Compression {
    fn from_flag(flag: u8) -> Result<Self, CompressionError> {
        match flag {
            0x00 => Ok(Self::None),
            0x01 => Ok(Self::Lz4),
            other => Err(CompressionError::UnknownFlag(other)),
        }
    }
}

/// When to compress.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Smallest payload (bytes) that gets compressed. Default: 256.
    pub threshold: usize,
    /// Master switch. Default: on.
    pub enabled: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold: 256,
            enabled: true,
        }
    }
}

impl CompressionConfig {
    fn choose(&self, len: usize) -> Compression {
        if self.enabled && len >= self.threshold {
            Compression::Lz4
        } else {
            Compression::None
        }
    }
}

/// Payload decoding failures.
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    /// No flag byte.
    #[error("empty payload, no compression flag")]
    EmptyPayload,
    /// The LZ4 block is corrupt.
    #[error("LZ4 decompression failed: {0}")]
    DecompressFailed(#[from] lz4_flex::block::DecompressError),
    /// The flag byte is not a known encoding.
    #[error("unknown compression flag: 0x{0:02X}")]
    UnknownFlag(u8),
    /// An LZ4 body too short to carry its size prefix.
    #[error("LZ4 body missing its size prefix")]
    MissingSize,
    /// The declared decompressed size exceeds the payload limit.
    #[error("declared size {size} exceeds limit {max}")]
    TooLarge {
        /// Size the sender declared.
        size: usize,
        /// Largest payload accepted.
        max: usize,
    },
}

/// Prefixes `data` with its flag byte, compressing it if it is large enough.
pub fn compress_payload(data: &[u8], config: &CompressionConfig) -> Vec<u8> {
    let encoding = config.choose(data.len());
    let body = match encoding {
        Compression::None => None,
        Compression::Lz4 => Some(compress_prepend_size(data)),
    };
    let body = body.as_deref().unwrap_or(data);

    let mut out = Vec::with_capacity(1 + body.len());
    out.push(encoding as u8);
    out.extend_from_slice(body);
    out
}

/// Strips the flag byte and decompresses if needed. The size an LZ4 body
/// declares is checked against `max_size` before anything is allocated.
pub fn decompress_payload(data: &[u8], max_size: usize) -> Result<Vec<u8>, CompressionError> {
    let (&flag, body) = data.split_first().ok_or(CompressionError::EmptyPayload)?;
    match Compression::from_flag(flag)? {
        Compression::None => Ok(body.to_vec()),
        Compression::Lz4 => {
            let (prefix, block) = body
                .split_first_chunk::<4>()
                .ok_or(CompressionError::MissingSize)?;
            let size = u32::from_le_bytes(*prefix) as usize;
            if size > max_size {
                return Err(CompressionError::TooLarge { size, max: max_size });
            }
            Ok(decompress(block, size)?)
        }
    }
}
