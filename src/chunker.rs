//! Client-side stream rotation.
//!
//! Capture buffers are forwarded as sample blocks on the current stream. Once
//! the audio already sent on a stream plus the incoming buffer would exceed the
//! configured chunk length, the stream is closed and a fresh one is opened
//! with its own header, so the server starts a new file.

use crate::audio::AudioFormat;
use crate::error::{ChunkError, TransportError};
use crate::protocol::StreamMessage;
use crate::transport::{SendChannel, StreamOpener};
use std::time::Duration;

/// Counters kept across the chunker's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkStats {
    pub streams_opened: u64,
    pub samples_sent: u64,
    pub buffers_dropped: u64,
}

pub struct StreamChunker<O> {
    opener: O,
    format: AudioFormat,
    max_length: Duration,
    current: Option<Box<dyn SendChannel>>,
    samples_in_current: u64,
    stats: ChunkStats,
}

impl<O: StreamOpener> StreamChunker<O> {
    pub fn new(opener: O, format: AudioFormat, max_length: Duration) -> Self {
        Self {
            opener,
            format,
            max_length,
            current: None,
            samples_in_current: 0,
            stats: ChunkStats::default(),
        }
    }

    pub fn stats(&self) -> ChunkStats {
        self.stats
    }

    pub fn has_open_stream(&self) -> bool {
        self.current.is_some()
    }

    /// Forward one capture buffer, rotating to a new stream first if needed.
    ///
    /// On a rotation failure the buffer is dropped and the next call retries.
    /// A send failure on an open stream keeps that stream for later buffers; a
    /// transport that cannot recover reports those sends as failed until the
    /// next rotation.
    pub async fn on_buffer(&mut self, buffer: Vec<f32>) -> Result<(), ChunkError> {
        if !self.format.is_frame_aligned(buffer.len()) {
            self.stats.buffers_dropped += 1;
            return Err(ChunkError::MisalignedBuffer {
                len: buffer.len(),
                channels: self.format.channels,
            });
        }
        if buffer.is_empty() {
            return Ok(());
        }

        let len = buffer.len() as u64;
        let projected = self.samples_in_current + len;
        if self.current.is_none() || self.format.exceeds(projected, self.max_length) {
            tracing::info!(
                "Rotating stream: {} samples sent, {:?} projected",
                self.samples_in_current,
                self.format.duration_of(projected)
            );
            if let Err(e) = self.rotate().await {
                self.stats.buffers_dropped += 1;
                return Err(e);
            }
        }

        self.samples_in_current += len;
        tracing::debug!("IN: {} samples", len);

        let Some(stream) = self.current.as_mut() else {
            return Err(ChunkError::Send(TransportError::Closed));
        };
        stream
            .send(&StreamMessage::SampleBlock(buffer))
            .await
            .map_err(ChunkError::Send)?;
        self.stats.samples_sent += len;
        Ok(())
    }

    /// Close the current stream's send side, if any. Calling it again is a no-op.
    pub async fn close(&mut self) -> Result<(), ChunkError> {
        self.samples_in_current = 0;
        match self.current.take() {
            Some(mut stream) => stream.close_send().await.map_err(ChunkError::Close),
            None => Ok(()),
        }
    }

    async fn rotate(&mut self) -> Result<(), ChunkError> {
        if let Err(e) = self.close().await {
            tracing::error!("Couldn't close stream: {}", e);
        }

        let mut stream = self.opener.open().await.map_err(ChunkError::Rotation)?;
        let (channel_count, sample_rate) = self.format.header_fields();
        let header = StreamMessage::Header {
            channel_count,
            sample_rate,
        };
        if let Err(e) = stream.send(&header).await {
            // Never leave a headerless stream behind
            if let Err(close_err) = stream.close_send().await {
                tracing::debug!("Close after failed header also failed: {}", close_err);
            }
            return Err(ChunkError::Rotation(e));
        }

        self.stats.streams_opened += 1;
        self.current = Some(stream);
        Ok(())
    }
}
