//! Server-side handling of one incoming stream.
//!
//! A stream opens with a header, which creates exactly one output file; every
//! sample block after it is appended to that file in receive order. When the
//! stream ends (cleanly or through a transport error) the file is finalized.

use crate::audio::{AudioFormat, AudioSink, SinkFactory};
use crate::error::SessionError;
use crate::protocol::StreamMessage;
use crate::transport::ReceiveChannel;
use std::path::PathBuf;

/// What a finished session wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub path: PathBuf,
    pub format: AudioFormat,
    pub blocks: u64,
    pub frames: u64,
}

struct RecordingSession {
    path: PathBuf,
    format: AudioFormat,
    sink: Box<dyn AudioSink>,
    blocks: u64,
    frames: u64,
}

impl RecordingSession {
    fn append(&mut self, samples: Vec<f32>) -> Result<(), SessionError> {
        if samples.is_empty() {
            return Ok(());
        }
        if !self.format.is_frame_aligned(samples.len()) {
            return Err(SessionError::MisalignedBlock {
                len: samples.len(),
                channels: self.format.channels,
            });
        }
        let frames = (samples.len() / usize::from(self.format.channels)) as u64;
        self.sink
            .write_chunk(samples)
            .map_err(|e| SessionError::Write {
                path: self.path.display().to_string(),
                message: format!("{:#}", e),
            })?;
        self.blocks += 1;
        self.frames += frames;
        Ok(())
    }

    fn check_repeated_header(&self, channel_count: i32, sample_rate: f32) -> Result<(), SessionError> {
        if AudioFormat::from_header(channel_count, sample_rate) == Some(self.format) {
            tracing::debug!("Ignoring repeated header on {:?}", self.path);
            return Ok(());
        }
        Err(SessionError::HeaderMismatch {
            expected_channels: self.format.channels,
            expected_rate: self.format.sample_rate,
            channel_count,
            sample_rate,
        })
    }

    /// Receive until the stream ends. Transport errors end the stream.
    async fn pump<C>(&mut self, channel: &mut C) -> Result<(), SessionError>
    where
        C: ReceiveChannel + ?Sized,
    {
        loop {
            let message = match channel.receive().await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    tracing::debug!("Stream closed by client");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Stream error: {}", e);
                    return Ok(());
                }
            };

            tracing::debug!("Got message: {} bytes", message.frame_len());
            match message {
                StreamMessage::SampleBlock(samples) => self.append(samples)?,
                StreamMessage::Header {
                    channel_count,
                    sample_rate,
                } => self.check_repeated_header(channel_count, sample_rate)?,
            }
        }
    }

    async fn finish(mut self) -> Result<SessionSummary, SessionError> {
        self.sink
            .finalize()
            .await
            .map_err(|e| SessionError::Finalize {
                path: self.path.display().to_string(),
                message: format!("{:#}", e),
            })?;
        Ok(SessionSummary {
            path: self.path,
            format: self.format,
            blocks: self.blocks,
            frames: self.frames,
        })
    }
}

/// Serve one stream to completion, writing it to a new file from `files`.
///
/// No file is created unless the first message is a valid header. Once
/// created, the file is finalized on every exit path.
pub async fn serve<C>(channel: &mut C, files: &dyn SinkFactory) -> Result<SessionSummary, SessionError>
where
    C: ReceiveChannel + ?Sized,
{
    let format = match channel.receive().await {
        Ok(Some(StreamMessage::Header {
            channel_count,
            sample_rate,
        })) => AudioFormat::from_header(channel_count, sample_rate).ok_or(
            SessionError::InvalidHeader {
                channel_count,
                sample_rate,
            },
        )?,
        Ok(Some(StreamMessage::SampleBlock(_))) | Ok(None) => {
            return Err(SessionError::MissingHeader);
        }
        Err(e) => return Err(SessionError::Receive(e)),
    };

    let (path, sink) = files.create(format).map_err(|e| SessionError::CreateFile {
        message: format!("{:#}", e),
    })?;

    let mut session = RecordingSession {
        path,
        format,
        sink,
        blocks: 0,
        frames: 0,
    };

    let received = session.pump(channel).await;
    let path = session.path.clone();
    let finished = session.finish().await;

    match received {
        Ok(()) => finished,
        Err(e) => {
            if let Err(finalize_err) = finished {
                tracing::error!("{} (after {:?})", finalize_err, path);
            }
            Err(e)
        }
    }
}
