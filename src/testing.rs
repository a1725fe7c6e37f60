//! In-memory fakes for the transport and sink seams.

use crate::audio::{AudioFormat, AudioSink, SinkFactory};
use crate::error::TransportError;
use crate::protocol::StreamMessage;
use crate::transport::{ReceiveChannel, SendChannel, StreamOpener};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default, Clone)]
pub struct FakeStream {
    pub sent: Vec<StreamMessage>,
    pub close_calls: usize,
}

#[derive(Default)]
struct NetworkState {
    streams: Vec<FakeStream>,
    failed_opens: usize,
    fail_opens: usize,
    fail_headers: usize,
    fail_samples: bool,
}

/// Records every stream opened through it
#[derive(Clone, Default)]
pub struct FakeNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` open attempts
    pub fn fail_next_opens(&self, n: usize) {
        self.state.lock().unwrap().fail_opens = n;
    }

    /// Fail the header send on the next `n` opened streams
    pub fn fail_next_headers(&self, n: usize) {
        self.state.lock().unwrap().fail_headers = n;
    }

    pub fn fail_sample_sends(&self, fail: bool) {
        self.state.lock().unwrap().fail_samples = fail;
    }

    pub fn streams(&self) -> Vec<FakeStream> {
        self.state.lock().unwrap().streams.clone()
    }

    pub fn failed_opens(&self) -> usize {
        self.state.lock().unwrap().failed_opens
    }

    /// Sample payloads per stream, header excluded
    pub fn payloads(&self) -> Vec<Vec<f32>> {
        self.streams()
            .iter()
            .map(|stream| {
                stream
                    .sent
                    .iter()
                    .filter_map(|m| match m {
                        StreamMessage::SampleBlock(samples) => Some(samples.clone()),
                        StreamMessage::Header { .. } => None,
                    })
                    .flatten()
                    .collect()
            })
            .collect()
    }
}

#[async_trait]
impl StreamOpener for FakeNetwork {
    async fn open(&self) -> Result<Box<dyn SendChannel>, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_opens > 0 {
            state.fail_opens -= 1;
            state.failed_opens += 1;
            return Err(TransportError::Connect {
                address: "fake".to_string(),
                message: "connection refused".to_string(),
            });
        }
        let fail_header = state.fail_headers > 0;
        if fail_header {
            state.fail_headers -= 1;
        }
        state.streams.push(FakeStream::default());
        Ok(Box::new(FakeChannel {
            state: self.state.clone(),
            index: state.streams.len() - 1,
            fail_header,
        }))
    }
}

struct FakeChannel {
    state: Arc<Mutex<NetworkState>>,
    index: usize,
    fail_header: bool,
}

#[async_trait]
impl SendChannel for FakeChannel {
    async fn send(&mut self, message: &StreamMessage) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        let failing = match message {
            StreamMessage::Header { .. } => self.fail_header,
            StreamMessage::SampleBlock(_) => state.fail_samples,
        };
        if failing {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }
        state.streams[self.index].sent.push(message.clone());
        Ok(())
    }

    async fn close_send(&mut self) -> Result<(), TransportError> {
        self.state.lock().unwrap().streams[self.index].close_calls += 1;
        Ok(())
    }
}

/// Receiving end replaying a scripted sequence
pub struct ScriptedReceiver {
    script: VecDeque<Result<Option<StreamMessage>, TransportError>>,
}

impl ScriptedReceiver {
    /// Deliver `messages` then a clean end of stream
    pub fn new(messages: Vec<StreamMessage>) -> Self {
        Self {
            script: messages.into_iter().map(|m| Ok(Some(m))).collect(),
        }
    }

    /// Deliver `messages` then a transport error
    pub fn failing_after(messages: Vec<StreamMessage>) -> Self {
        let mut receiver = Self::new(messages);
        receiver.script.push_back(Err(TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ))));
        receiver
    }
}

#[async_trait]
impl ReceiveChannel for ScriptedReceiver {
    async fn receive(&mut self) -> Result<Option<StreamMessage>, TransportError> {
        self.script.pop_front().unwrap_or(Ok(None))
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryRecording {
    pub path: PathBuf,
    pub format: Option<AudioFormat>,
    pub samples: Vec<f32>,
    pub finalized: bool,
}

#[derive(Default)]
struct SinkState {
    recordings: Vec<MemoryRecording>,
    fail_create: bool,
    fail_writes: bool,
}

/// Sink factory keeping recordings in memory
#[derive(Clone, Default)]
pub struct MemorySinks {
    state: Arc<Mutex<SinkState>>,
}

impl MemorySinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(&self) {
        self.state.lock().unwrap().fail_create = true;
    }

    pub fn fail_writes(&self) {
        self.state.lock().unwrap().fail_writes = true;
    }

    pub fn recordings(&self) -> Vec<MemoryRecording> {
        self.state.lock().unwrap().recordings.clone()
    }
}

impl SinkFactory for MemorySinks {
    fn create(&self, format: AudioFormat) -> anyhow::Result<(PathBuf, Box<dyn AudioSink>)> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create {
            anyhow::bail!("disk full");
        }
        let path = PathBuf::from(format!("memory-{:03}.wav", state.recordings.len()));
        state.recordings.push(MemoryRecording {
            path: path.clone(),
            format: Some(format),
            ..Default::default()
        });
        let sink = MemorySink {
            state: self.state.clone(),
            index: state.recordings.len() - 1,
        };
        Ok((path, Box::new(sink)))
    }
}

struct MemorySink {
    state: Arc<Mutex<SinkState>>,
    index: usize,
}

#[async_trait]
impl AudioSink for MemorySink {
    fn write_chunk(&mut self, samples: Vec<f32>) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            anyhow::bail!("disk full");
        }
        state.recordings[self.index].samples.extend(samples);
        Ok(())
    }

    async fn finalize(&mut self) -> anyhow::Result<()> {
        self.state.lock().unwrap().recordings[self.index].finalized = true;
        Ok(())
    }
}
