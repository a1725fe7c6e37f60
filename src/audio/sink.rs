use super::format::AudioFormat;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// Trait for streaming audio encoding
///
/// Implementations append interleaved samples to one output file as they
/// arrive, rather than buffering the whole recording.
#[async_trait]
pub trait AudioSink: Send {
    /// Write audio samples (streaming, called repeatedly during recording)
    /// The Vec is moved to avoid copying
    fn write_chunk(&mut self, samples: Vec<f32>) -> Result<()>;

    /// Finalize and close the sink
    async fn finalize(&mut self) -> Result<()>;
}

/// Creates one new sink per recording
pub trait SinkFactory: Send + Sync {
    /// Create a sink for a recording in `format`, returning where it writes to
    fn create(&self, format: AudioFormat) -> Result<(PathBuf, Box<dyn AudioSink>)>;
}
