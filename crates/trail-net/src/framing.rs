//! Length-prefixed framing for the TCP byte stream.
//!
//! ```text
//! +-------------------+--------------------+
//! | length (4 bytes)  |   payload          |
//! | u32 little-endian |   (length bytes)   |
//! +-------------------+--------------------+
//! ```
//!
//! The prefix counts payload bytes only. A zero-length frame is a valid
//! keepalive and carries no message.
//!
//! Two readers are provided. [`read_frame`] awaits one complete frame from a
//! stream. [`FrameDecoder`] accumulates whatever bytes arrive and yields
//! frames as they complete; it never loses data when the read that fed it
//! is cancelled inside a `select!`.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Framing limits.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest accepted payload in bytes. Default: 1 MiB.
    pub max_payload_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 1_048_576,
        }
    }
}

/// Framing failures. All of them end the connection.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A frame announced (or would need) more bytes than allowed.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// Announced payload size.
        size: u64,
        /// Configured maximum.
        max: u32,
    },

    /// The peer closed the stream, possibly mid-frame.
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn check_size(size: u64, config: &FrameConfig) -> Result<(), FrameError> {
    if size > u64::from(config.max_payload_size) {
        return Err(FrameError::PayloadTooLarge {
            size,
            max: config.max_payload_size,
        });
    }
    Ok(())
}

/// Prepends the length prefix to `payload`.
pub fn encode_frame(payload: &[u8], config: &FrameConfig) -> Result<Vec<u8>, FrameError> {
    check_size(payload.len() as u64, config)?;
    let mut out = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Awaits one complete frame and returns its payload.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<Vec<u8>, FrameError> {
    let closed_on_eof = |e: std::io::Error| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FrameError::ConnectionClosed
        } else {
            FrameError::Io(e)
        }
    };

    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut prefix).await.map_err(closed_on_eof)?;
    let len = u32::from_le_bytes(prefix);
    check_size(u64::from(len), config)?;

    let mut payload = vec![0u8; len as usize];
    if len > 0 {
        reader
            .read_exact(&mut payload)
            .await
            .map_err(closed_on_eof)?;
    }
    Ok(payload)
}

/// Writes one frame and flushes.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let frame = encode_frame(payload, config)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// FrameDecoder
// ---------------------------------------------------------------------------

/// Receive buffer that reassembles frames from arbitrary read boundaries.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    config: FrameConfig,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    pub fn new(config: FrameConfig) -> Self {
        Self {
            buf: Vec::new(),
            config,
        }
    }

    /// Appends freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops the next complete frame, if one is buffered. An oversized length
    /// prefix is reported as soon as the prefix itself is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let Some(prefix) = self.buf.first_chunk::<LENGTH_PREFIX_SIZE>() else {
            return Ok(None);
        };
        let len = u32::from_le_bytes(*prefix) as usize;
        check_size(len as u64, &self.config)?;

        let end = LENGTH_PREFIX_SIZE + len;
        if self.buf.len() < end {
            return Ok(None);
        }
        let payload = self.buf[LENGTH_PREFIX_SIZE..end].to_vec();
        self.buf.drain(..end);
        Ok(Some(payload))
    }

    /// Bytes buffered but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_frames_survive_a_tiny_pipe() {
        let (mut client, mut server) = duplex(8);
        let config = FrameConfig::default();
        let payload = b"a frame far larger than the pipe buffer";

        let write_config = config.clone();
        let writer = tokio::spawn(async move {
            write_frame(&mut client, payload, &write_config).await.unwrap();
            write_frame(&mut client, b"next", &write_config).await.unwrap();
        });

        assert_eq!(read_frame(&mut server, &config).await.unwrap(), payload);
        assert_eq!(read_frame(&mut server, &config).await.unwrap(), b"next");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_prefix_rejected_on_read() {
        let (mut client, mut server) = duplex(64);
        let config = FrameConfig {
            max_payload_size: 16,
        };
        client.write_all(&1024u32.to_le_bytes()).await.unwrap();

        let result = read_frame(&mut server, &config).await;
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { size: 1024, .. })));
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected_on_write() {
        let (mut client, _server) = duplex(64);
        let config = FrameConfig {
            max_payload_size: 16,
        };
        let result = write_frame(&mut client, &[0u8; 17], &config).await;
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_connection_closed() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&10u32.to_le_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);

        let result = read_frame(&mut server, &FrameConfig::default()).await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn test_prefix_is_little_endian() {
        let frame = encode_frame(b"hello", &FrameConfig::default()).unwrap();
        assert_eq!(&frame[..4], &[5, 0, 0, 0]);
        assert_eq!(&frame[4..], b"hello");
    }

    #[test]
    fn test_decoder_reassembles_split_frames() {
        let config = FrameConfig::default();
        let mut wire = encode_frame(b"first", &config).unwrap();
        wire.extend(encode_frame(b"second", &config).unwrap());

        let mut decoder = FrameDecoder::new(config);
        let mut frames = Vec::new();
        for byte in &wire {
            decoder.extend(std::slice::from_ref(byte));
            while let Some(frame) = decoder.next_frame().unwrap() {
                frames.push(frame);
            }
        }
        assert_eq!(frames, vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_splits_coalesced_frames() {
        let config = FrameConfig::default();
        let mut wire = Vec::new();
        for payload in [&b"aaa"[..], b"", b"bbb"] {
            wire.extend(encode_frame(payload, &config).unwrap());
        }

        let mut decoder = FrameDecoder::new(config);
        decoder.extend(&wire);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"aaa");
        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"");
        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"bbb");
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_decoder_rejects_oversized_prefix_early() {
        let mut decoder = FrameDecoder::new(FrameConfig {
            max_payload_size: 8,
        });
        decoder.extend(&100u32.to_le_bytes());
        assert!(matches!(
            decoder.next_frame(),
            Err(FrameError::PayloadTooLarge { size: 100, max: 8 })
        ));
    }

    #[test]
    fn test_decoder_waits_for_partial_prefix() {
        let mut decoder = FrameDecoder::default();
        decoder.extend(&[3, 0]);
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.extend(&[0, 0, b'x', b'y']);
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.extend(b"z");
        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"xyz");
    }
}
