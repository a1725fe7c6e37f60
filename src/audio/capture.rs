use super::format::AudioFormat;
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use ringbuf::{HeapRb, traits::*};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

/// Capture buffers the ring can hold before the callback starts dropping samples
const RING_BUFFERS: usize = 8;

/// Something that delivers fixed-size buffers of interleaved samples
pub trait CaptureSource {
    /// Start delivering buffers on `buffers` until `stop` is called.
    fn start(&mut self, buffers: mpsc::Sender<Vec<f32>>) -> Result<()>;

    /// Stop capturing. Buffers already captured are still delivered, then
    /// the sender is dropped.
    fn stop(&mut self);

    /// Samples lost because the consumer fell behind
    fn lost_samples(&self) -> u64 {
        0
    }
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub format: AudioFormat,
    /// Substring of the input device name; empty selects the default device
    pub device: String,
    /// Audio covered by each delivered buffer
    pub buffer_duration: Duration,
}

struct RunningCapture {
    stream: cpal::Stream,
    stopping: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

/// cpal input stream feeding a lock-free ring buffer
///
/// The real-time callback only pushes into the ring and wakes the bridge task,
/// which cuts the ring into buffers of `buffer_duration` and forwards them.
///
/// Note: cpal::Stream is !Send, so this must be used from a LocalSet.
pub struct AudioCapture {
    config: CaptureConfig,
    running: Option<RunningCapture>,
    lost: Arc<AtomicU64>,
}

impl AudioCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            running: None,
            lost: Arc::new(AtomicU64::new(0)),
        }
    }

    async fn bridge_task(
        mut consumer: impl Consumer<Item = f32>,
        tx: mpsc::Sender<Vec<f32>>,
        chunk_size: usize,
        channels: usize,
        notify: Arc<Notify>,
        stopping: Arc<AtomicBool>,
        lost: Arc<AtomicU64>,
    ) {
        let mut reported_lost = 0;
        loop {
            notify.notified().await;

            while consumer.occupied_len() >= chunk_size {
                let mut chunk = vec![0.0f32; chunk_size];
                let n = consumer.pop_slice(&mut chunk);
                chunk.truncate(n);

                if tx.send(chunk).await.is_err() {
                    return;
                }
            }

            let total_lost = lost.load(Ordering::Relaxed);
            if total_lost > reported_lost {
                tracing::warn!(
                    "Capture ring overflowed, {} samples lost so far",
                    total_lost
                );
                reported_lost = total_lost;
            }

            if stopping.load(Ordering::Acquire) {
                // Flush the partial tail, whole frames only
                let tail = consumer.occupied_len() / channels * channels;
                if tail > 0 {
                    let mut chunk = vec![0.0f32; tail];
                    let n = consumer.pop_slice(&mut chunk);
                    chunk.truncate(n);
                    let _ = tx.send(chunk).await;
                }
                tracing::debug!("Capture bridge finished");
                return;
            }
        }
    }
}

impl CaptureSource for AudioCapture {
    fn start(&mut self, buffers: mpsc::Sender<Vec<f32>>) -> Result<()> {
        if self.running.is_some() {
            anyhow::bail!("Audio capture already running");
        }

        let format = self.config.format;
        let chunk_size = format
            .samples_for_duration(self.config.buffer_duration)
            .max(usize::from(format.channels));
        let ring = HeapRb::<f32>::new(chunk_size * RING_BUFFERS);
        let (mut producer, consumer) = ring.split();

        let host = cpal::default_host();
        let device = find_input_device(&host, &self.config.device)?;
        tracing::info!(
            "IN: {} ({} channel(s), {} Hz, {} samples per buffer)",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            format.channels,
            format.sample_rate,
            chunk_size
        );

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let notify = Arc::new(Notify::new());
        let notify_callback = notify.clone();
        let lost_callback = self.lost.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let pushed = producer.push_slice(data);
                    if pushed < data.len() {
                        lost_callback.fetch_add((data.len() - pushed) as u64, Ordering::Relaxed);
                    }
                    notify_callback.notify_one();
                },
                move |err| {
                    tracing::error!("Audio stream error: {}", err);
                },
                None,
            )
            .context("Failed to build input stream")?;

        stream.play().context("Failed to start audio stream")?;

        let stopping = Arc::new(AtomicBool::new(false));
        tokio::task::spawn_local(Self::bridge_task(
            consumer,
            buffers,
            chunk_size,
            usize::from(format.channels),
            notify.clone(),
            stopping.clone(),
            self.lost.clone(),
        ));

        self.running = Some(RunningCapture {
            stream,
            stopping,
            notify,
        });

        tracing::info!("Audio capture started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            // Dropping the stream stops the callback before the bridge flushes
            drop(running.stream);
            running.stopping.store(true, Ordering::Release);
            running.notify.notify_one();
            tracing::info!("Audio capture stopped");
        }
    }

    fn lost_samples(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }
}

/// Names of all available input devices
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .context("Failed to enumerate input devices")?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Find an input device by name.
///
/// Matching order: exact, case-insensitive, then case-insensitive substring.
/// An empty search string selects the host's default input device.
fn find_input_device(host: &cpal::Host, search: &str) -> Result<cpal::Device> {
    if search.is_empty() {
        return host
            .default_input_device()
            .context("No input audio device available");
    }

    let devices: Vec<(String, cpal::Device)> = host
        .input_devices()
        .context("Failed to enumerate input devices")?
        .filter_map(|d| d.name().ok().map(|name| (name, d)))
        .collect();

    for (name, _) in &devices {
        tracing::debug!("Device: {}", name);
    }

    let names: Vec<&str> = devices.iter().map(|(name, _)| name.as_str()).collect();
    match match_device_name(&names, search) {
        Some(index) => devices
            .into_iter()
            .nth(index)
            .map(|(_, device)| device)
            .context("Device vanished during lookup"),
        None => anyhow::bail!(
            "No input device matching {:?}. Available devices: {}",
            search,
            names.join(", ")
        ),
    }
}

fn match_device_name(names: &[&str], search: &str) -> Option<usize> {
    let search_lower = search.to_lowercase();
    names
        .iter()
        .position(|name| *name == search)
        .or_else(|| names.iter().position(|name| name.to_lowercase() == search_lower))
        .or_else(|| {
            names
                .iter()
                .position(|name| name.to_lowercase().contains(&search_lower))
        })
}
