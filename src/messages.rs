use crate::chunker::ChunkStats;
use anyhow::Result;
use tokio::sync::oneshot;

/// Commands for the Recorder service
pub enum RecorderCommand {
    Start(oneshot::Sender<Result<()>>),
    Stop(oneshot::Sender<Result<RecordingStats>>),
}

/// Totals reported when a recording stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingStats {
    pub chunks: ChunkStats,
    /// Samples dropped by the capture ring because the consumer fell behind
    pub lost_samples: u64,
}
