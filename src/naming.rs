use crate::audio::{AudioFormat, AudioSink, SinkFactory, WavEncoding, WavSink};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out `<prefix>-<YYYY-MM-DD-HH-MM-SS>-<seq>.wav` names.
///
/// The sequence number is shared by every session of the process, so two
/// recordings started within the same second still get distinct names.
#[derive(Debug)]
pub struct RecordingNamer {
    dir: PathBuf,
    prefix: String,
    sequence: AtomicU64,
}

impl RecordingNamer {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn next_path(&self) -> PathBuf {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let timestamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S");
        self.dir
            .join(format!("{}-{}-{:03}.wav", self.prefix, timestamp, sequence))
    }
}

/// Creates one WAV file per recording under a [`RecordingNamer`]
pub struct WavFiles {
    namer: RecordingNamer,
    encoding: WavEncoding,
}

impl WavFiles {
    pub fn new(namer: RecordingNamer, encoding: WavEncoding) -> Self {
        Self { namer, encoding }
    }
}

impl SinkFactory for WavFiles {
    fn create(&self, format: AudioFormat) -> Result<(PathBuf, Box<dyn AudioSink>)> {
        let path = self.namer.next_path();
        let sink = WavSink::create(&path, format, self.encoding)?;
        tracing::info!(
            "Created {:?} ({} channel(s), {} Hz)",
            path,
            format.channels,
            format.sample_rate
        );
        Ok((path, Box::new(sink)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_follow_pattern() {
        let namer = RecordingNamer::new("/data", "rec");
        let name = namer.next_path();
        let file = name.file_name().unwrap().to_str().unwrap();

        // rec-YYYY-MM-DD-HH-MM-SS-000.wav
        assert!(file.starts_with("rec-"));
        assert!(file.ends_with("-000.wav"));
        assert_eq!(file.len(), "rec-2024-01-01-00-00-00-000.wav".len());
        assert_eq!(name.parent(), Some(Path::new("/data")));
    }

    #[test]
    fn test_names_are_unique_across_threads() {
        let namer = std::sync::Arc::new(RecordingNamer::new("out", "rec"));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let namer = namer.clone();
                std::thread::spawn(move || (0..50).map(|_| namer.next_path()).collect::<Vec<_>>())
            })
            .collect();

        let mut names = HashSet::new();
        for handle in handles {
            for name in handle.join().unwrap() {
                assert!(names.insert(name));
            }
        }
        assert_eq!(names.len(), 200);
    }

    #[tokio::test]
    async fn test_wav_files_creates_one_file_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let files = WavFiles::new(RecordingNamer::new(dir.path(), "rec"), WavEncoding::Pcm16);

        let (first, mut sink) = files.create(AudioFormat::new(8000, 1)).unwrap();
        sink.finalize().await.unwrap();
        let (second, mut sink) = files.create(AudioFormat::new(8000, 1)).unwrap();
        sink.finalize().await.unwrap();

        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());
    }
}
