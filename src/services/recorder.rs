use crate::audio::CaptureSource;
use crate::chunker::StreamChunker;
use crate::messages::{RecorderCommand, RecordingStats};
use crate::transport::StreamOpener;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Buffers queued between the capture bridge and the chunker
const AUDIO_QUEUE_CAPACITY: usize = 32;

/// Upper bound on waiting for the capture bridge to flush after stop
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Coordinates audio capture and chunked streaming
///
/// This service:
/// - Manages the CaptureSource lifecycle
/// - Receives capture buffers via channel
/// - Feeds them to the StreamChunker, which rotates network streams
/// - Handles start/stop commands
///
/// Stop always stops capture first, drains what was already captured, and
/// only then closes the last stream, so no buffer races the final close.
///
/// Note: the cpal-backed source holds a !Send stream, so this service must be
/// spawned on a LocalSet using tokio::task::spawn_local.
pub struct Recorder<S, O> {
    source: S,
    chunker: StreamChunker<O>,
    cmd_rx: mpsc::Receiver<RecorderCommand>,
    audio_rx: Option<mpsc::Receiver<Vec<f32>>>,
}

impl<S: CaptureSource, O: StreamOpener> Recorder<S, O> {
    pub fn new(source: S, chunker: StreamChunker<O>, cmd_rx: mpsc::Receiver<RecorderCommand>) -> Self {
        Self {
            source,
            chunker,
            cmd_rx,
            audio_rx: None,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                // Handle commands from coordinator
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },

                // Receive and stream capture buffers (only when recording)
                buffer = next_buffer(&mut self.audio_rx), if self.audio_rx.is_some() => match buffer {
                    Some(buffer) => self.forward(buffer).await,
                    None => {
                        tracing::warn!("Capture ended unexpectedly");
                        self.audio_rx = None;
                        if let Err(e) = self.chunker.close().await {
                            tracing::error!("Stream error (cleanup): {}", e);
                        }
                    }
                },
            }
        }

        // Coordinator went away, don't leave a stream or device open
        if self.audio_rx.is_some() {
            if let Err(e) = self.stop_recording().await {
                tracing::error!("Failed to stop recording: {}", e);
            }
        }
    }

    async fn forward(&mut self, buffer: Vec<f32>) {
        if let Err(e) = self.chunker.on_buffer(buffer).await {
            tracing::error!("{}", e);
        }
    }

    async fn handle_command(&mut self, cmd: RecorderCommand) {
        match cmd {
            RecorderCommand::Start(reply) => {
                let _ = reply.send(self.start_recording());
            }
            RecorderCommand::Stop(reply) => {
                let _ = reply.send(self.stop_recording().await);
            }
        }
    }

    fn start_recording(&mut self) -> Result<()> {
        if self.audio_rx.is_some() {
            anyhow::bail!("Recording already in progress");
        }
        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_QUEUE_CAPACITY);
        self.source.start(audio_tx)?;
        self.audio_rx = Some(audio_rx);
        tracing::info!("Recording started");
        Ok(())
    }

    async fn stop_recording(&mut self) -> Result<RecordingStats> {
        let mut audio_rx = self
            .audio_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("Not recording"))?;

        self.source.stop();

        // Drain captured audio until the source drops its sender
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while let Some(buffer) = audio_rx.recv().await {
                self.forward(buffer).await;
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!("Timed out draining capture buffers");
        }

        if let Err(e) = self.chunker.close().await {
            tracing::error!("Stream error (cleanup): {}", e);
        }

        let stats = RecordingStats {
            chunks: self.chunker.stats(),
            lost_samples: self.source.lost_samples(),
        };
        tracing::info!("Recording stopped: {:?}", stats);
        Ok(stats)
    }
}

async fn next_buffer(audio_rx: &mut Option<mpsc::Receiver<Vec<f32>>>) -> Option<Vec<f32>> {
    match audio_rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Handle for communicating with the Recorder
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<RecorderCommand>,
}

impl RecorderHandle {
    pub fn new(tx: mpsc::Sender<RecorderCommand>) -> Self {
        Self { tx }
    }

    pub async fn start(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RecorderCommand::Start(reply))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send start command: {}", e))?;

        rx.await
            .map_err(|e| anyhow::anyhow!("Failed to receive start response: {}", e))?
    }

    pub async fn stop(&self) -> Result<RecordingStats> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RecorderCommand::Stop(reply))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send stop command: {}", e))?;

        rx.await
            .map_err(|e| anyhow::anyhow!("Failed to receive stop response: {}", e))?
    }
}
