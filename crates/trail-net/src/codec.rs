//! Message ⇄ wire bytes.
//!
//! A frame on the wire is `[len: u32 LE] [flag: u8] [body]`, where the body
//! is the versioned postcard message, LZ4-compressed when the flag says so.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::compression::{CompressionConfig, compress_payload, decompress_payload};
use crate::framing::{FrameConfig, FrameDecoder, FrameError, encode_frame, read_frame};
use crate::messages::{Message, MessageError, deserialize_message, serialize_message};

/// Errors from sending or receiving a whole message.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The byte stream itself failed. Fatal to the connection.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// One message was malformed. The connection may continue.
    #[error("malformed message: {0}")]
    Malformed(#[from] MessageError),
}

/// Encodes and decodes [`Message`]s with a fixed framing and compression
/// policy.
#[derive(Debug, Clone, Default)]
pub struct WireCodec {
    frame: FrameConfig,
    compression: CompressionConfig,
}

impl WireCodec {
    /// Creates a codec.
    pub fn new(frame: FrameConfig, compression: CompressionConfig) -> Self {
        Self { frame, compression }
    }

    /// The framing limits in force.
    pub fn frame_config(&self) -> &FrameConfig {
        &self.frame
    }

    /// Encodes a message into a frame payload (no length prefix).
    pub fn encode(&self, msg: &Message) -> Result<Vec<u8>, MessageError> {
        let versioned = serialize_message(msg)?;
        Ok(compress_payload(&versioned, &self.compression))
    }

    /// Decodes a frame payload. The compression flag is the sender's
    /// choice and is not part of the message: any known flag is accepted,
    /// while the versioned body must be in canonical form.
    pub fn decode(&self, payload: &[u8]) -> Result<Message, MessageError> {
        let versioned = decompress_payload(payload, self.frame.max_payload_size as usize)?;
        deserialize_message(&versioned)
    }

    /// Encodes a message into a complete length-prefixed frame.
    pub fn encode_frame(&self, msg: &Message) -> Result<Vec<u8>, CodecError> {
        let payload = self.encode(msg)?;
        Ok(encode_frame(&payload, &self.frame)?)
    }

    /// A receive buffer with this codec's framing limits.
    pub fn decoder(&self) -> FrameDecoder {
        FrameDecoder::new(self.frame.clone())
    }

    /// Writes one message and flushes.
    pub async fn send<W: AsyncWriteExt + Unpin>(
        &self,
        writer: &mut W,
        msg: &Message,
    ) -> Result<(), CodecError> {
        let frame = self.encode_frame(msg)?;
        writer.write_all(&frame).await.map_err(FrameError::from)?;
        writer.flush().await.map_err(FrameError::from)?;
        Ok(())
    }

    /// Reads one message.
    pub async fn recv<R: AsyncReadExt + Unpin>(&self, reader: &mut R) -> Result<Message, CodecError> {
        let payload = read_frame(reader, &self.frame).await?;
        Ok(self.decode(&payload)?)
    }
}
