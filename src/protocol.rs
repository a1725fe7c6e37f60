//! Wire messages exchanged on one logical recording stream.
//!
//! Each message is sent as one frame:
//!
//! ```text
//! u32 BE   body length (tag + payload)
//! u8       tag (1 = header, 2 = sample block)
//! payload  header: i32 LE channel count, f32 LE sample rate
//!          sample block: packed f32 LE samples
//! ```
//!
//! A stream carries one header followed by any number of sample blocks. There is
//! no terminator; the stream ends when the sender shuts down its write half.

use crate::error::{ProtocolError, TransportError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const TAG_HEADER: u8 = 1;
const TAG_SAMPLES: u8 = 2;
const HEADER_PAYLOAD_LEN: usize = 8;
const SAMPLE_SIZE: usize = std::mem::size_of::<f32>();

/// Largest accepted frame body (tag + payload)
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// Audio format for every sample block that follows on the same stream
    Header { channel_count: i32, sample_rate: f32 },
    /// Interleaved samples
    SampleBlock(Vec<f32>),
}

impl StreamMessage {
    /// Encode tag and payload, without the length prefix
    pub fn encode_body(&self) -> Vec<u8> {
        match self {
            StreamMessage::Header {
                channel_count,
                sample_rate,
            } => {
                let mut body = Vec::with_capacity(1 + HEADER_PAYLOAD_LEN);
                body.push(TAG_HEADER);
                body.extend_from_slice(&channel_count.to_le_bytes());
                body.extend_from_slice(&sample_rate.to_le_bytes());
                body
            }
            StreamMessage::SampleBlock(samples) => {
                let mut body = Vec::with_capacity(1 + samples.len() * SAMPLE_SIZE);
                body.push(TAG_SAMPLES);
                for sample in samples {
                    body.extend_from_slice(&sample.to_le_bytes());
                }
                body
            }
        }
    }

    pub fn decode_body(body: &[u8]) -> Result<Self, ProtocolError> {
        let (&tag, payload) = body.split_first().ok_or(ProtocolError::EmptyFrame)?;
        match tag {
            TAG_HEADER => {
                if payload.len() != HEADER_PAYLOAD_LEN {
                    return Err(ProtocolError::Truncated {
                        what: "header",
                        expected: HEADER_PAYLOAD_LEN,
                        actual: payload.len(),
                    });
                }
                let (channels, rate) = payload.split_at(4);
                Ok(StreamMessage::Header {
                    channel_count: i32::from_le_bytes([channels[0], channels[1], channels[2], channels[3]]),
                    sample_rate: f32::from_le_bytes([rate[0], rate[1], rate[2], rate[3]]),
                })
            }
            TAG_SAMPLES => {
                if payload.len() % SAMPLE_SIZE != 0 {
                    return Err(ProtocolError::MisalignedSamples(payload.len()));
                }
                let samples = payload
                    .chunks_exact(SAMPLE_SIZE)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                Ok(StreamMessage::SampleBlock(samples))
            }
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }

    /// Size of the full frame on the wire, length prefix included
    pub fn frame_len(&self) -> usize {
        let payload = match self {
            StreamMessage::Header { .. } => HEADER_PAYLOAD_LEN,
            StreamMessage::SampleBlock(samples) => samples.len() * SAMPLE_SIZE,
        };
        4 + 1 + payload
    }
}

/// Write one framed message. The caller decides when to flush.
pub async fn write_message<W>(writer: &mut W, message: &StreamMessage) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let body = message.encode_body();
    if body.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len: body.len(),
            max: MAX_FRAME_LEN,
        }
        .into());
    }
    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(&body).await?;
    Ok(())
}

/// Read one framed message.
///
/// Returns `Ok(None)` on a clean end of stream at a frame boundary. End of
/// stream in the middle of a frame is an error.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<StreamMessage>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let first = reader.read(&mut len_buf).await?;
    if first == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut len_buf[first..]).await?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        }
        .into());
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(StreamMessage::decode_body(&body)?))
}
