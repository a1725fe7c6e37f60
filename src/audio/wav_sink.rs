use super::format::AudioFormat;
use super::sink::AudioSink;
use anyhow::Result;
use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// Sample encoding used inside the WAV container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WavEncoding {
    /// 16-bit signed PCM, samples clamped to [-1.0, 1.0]
    #[default]
    Pcm16,
    /// 32-bit IEEE float, samples stored unchanged
    Float32,
}

impl WavEncoding {
    fn spec(self, format: AudioFormat) -> WavSpec {
        let (bits_per_sample, sample_format) = match self {
            WavEncoding::Pcm16 => (16, SampleFormat::Int),
            WavEncoding::Float32 => (32, SampleFormat::Float),
        };
        WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample,
            sample_format,
        }
    }
}

enum WavCommand {
    WriteChunk(Vec<f32>),
    Finalize { reply: oneshot::Sender<Result<()>> },
}

/// WAV encoder using a dedicated blocking thread for I/O
///
/// All file I/O happens on a separate thread so the receive loop never blocks
/// on disk. Chunks are sent to the thread via a channel and written
/// sequentially. The first write error stops the thread and is reported by
/// every later call.
pub struct WavSink {
    tx: mpsc::UnboundedSender<WavCommand>,
    failure: Arc<Mutex<Option<String>>>,
}

impl WavSink {
    pub fn create(path: &Path, format: AudioFormat, encoding: WavEncoding) -> Result<Self> {
        let writer = WavWriter::create(path, encoding.spec(format))
            .map_err(|e| anyhow::anyhow!("Failed to create WAV writer for {:?}: {}", path, e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let failure = Arc::new(Mutex::new(None));
        let thread_failure = failure.clone();

        std::thread::spawn(move || Self::writer_thread(writer, encoding, rx, thread_failure));

        Ok(Self { tx, failure })
    }

    fn writer_thread(
        mut writer: WavWriter<BufWriter<File>>,
        encoding: WavEncoding,
        mut rx: mpsc::UnboundedReceiver<WavCommand>,
        failure: Arc<Mutex<Option<String>>>,
    ) {
        while let Some(cmd) = rx.blocking_recv() {
            match cmd {
                WavCommand::WriteChunk(samples) => {
                    if let Err(e) = write_samples(&mut writer, encoding, &samples) {
                        if let Ok(mut slot) = failure.lock() {
                            *slot = Some(e.to_string());
                        }
                        break;
                    }
                }
                WavCommand::Finalize { reply } => {
                    let result = writer
                        .finalize()
                        .map_err(|e| anyhow::anyhow!("Failed to finalize WAV: {}", e));
                    let _ = reply.send(result);
                    return;
                }
            }
        }
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure.lock() {
            Ok(slot) => match slot.as_ref() {
                Some(message) => Err(anyhow::anyhow!("Failed to write samples: {}", message)),
                None => Ok(()),
            },
            Err(_) => Err(anyhow::anyhow!("WAV writer thread panicked")),
        }
    }
}

fn write_samples(
    writer: &mut WavWriter<BufWriter<File>>,
    encoding: WavEncoding,
    samples: &[f32],
) -> hound::Result<()> {
    match encoding {
        WavEncoding::Pcm16 => {
            for sample in samples {
                // Convert f32 (-1.0 to 1.0) to i16
                let amplitude = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer.write_sample(amplitude)?;
            }
        }
        WavEncoding::Float32 => {
            for sample in samples {
                writer.write_sample(*sample)?;
            }
        }
    }
    Ok(())
}

#[async_trait]
impl AudioSink for WavSink {
    fn write_chunk(&mut self, samples: Vec<f32>) -> Result<()> {
        self.check_failure()?;
        self.tx
            .send(WavCommand::WriteChunk(samples))
            .map_err(|e| anyhow::anyhow!("Failed to send write command: {}", e))
    }

    async fn finalize(&mut self) -> Result<()> {
        self.check_failure()?;
        let (reply, rx) = oneshot::channel();
        if let Err(e) = self.tx.send(WavCommand::Finalize { reply }) {
            self.check_failure()?;
            return Err(anyhow::anyhow!("Failed to send finalize command: {}", e));
        }

        match rx.await {
            Ok(result) => result,
            // The thread stopped on a write error before seeing the finalize command
            Err(_) => {
                self.check_failure()?;
                Err(anyhow::anyhow!("WAV writer thread exited before finalizing"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_float32_round_trip_preserves_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let format = AudioFormat::new(11025, 2);

        let mut sink = WavSink::create(&path, format, WavEncoding::Float32).unwrap();
        sink.write_chunk(vec![0.0, 10.0, -3.5, 0.25]).unwrap();
        sink.write_chunk(vec![300.0, 1.0]).unwrap();
        sink.finalize().await.unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 11025);
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0.0, 10.0, -3.5, 0.25, 300.0, 1.0]);
    }

    #[tokio::test]
    async fn test_pcm16_clamps_out_of_range_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pcm.wav");

        let mut sink = WavSink::create(&path, AudioFormat::new(8000, 1), WavEncoding::Pcm16).unwrap();
        sink.write_chunk(vec![0.0, 2.0, -2.0, 0.5]).unwrap();
        sink.finalize().await.unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, i16::MAX, -i16::MAX, i16::MAX / 2]);
    }

    #[test]
    fn test_create_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.wav");
        assert!(WavSink::create(&path, AudioFormat::default(), WavEncoding::Pcm16).is_err());
    }
}
