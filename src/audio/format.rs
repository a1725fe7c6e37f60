use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Channel layout and rate shared by a capture device and every stream it feeds.
///
/// Samples are always interleaved f32, so a "sample count" covers
/// `channels` values per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Build a format from header fields, rejecting non-positive or non-finite values.
    pub fn from_header(channel_count: i32, sample_rate: f32) -> Option<Self> {
        let channels = u16::try_from(channel_count).ok().filter(|c| *c > 0)?;
        // Whole rates only; a fractional rate cannot be stored in a WAV header
        if !sample_rate.is_finite()
            || sample_rate < 1.0
            || sample_rate >= u32::MAX as f32
            || sample_rate.fract() != 0.0
        {
            return None;
        }
        Some(Self {
            sample_rate: sample_rate as u32,
            channels,
        })
    }

    /// Header fields as they travel on the wire
    pub fn header_fields(&self) -> (i32, f32) {
        (i32::from(self.channels), self.sample_rate as f32)
    }

    /// Interleaved samples per second of audio
    pub fn samples_per_second(&self) -> u64 {
        u64::from(self.sample_rate) * u64::from(self.channels)
    }

    /// Calculate number of interleaved samples for a given duration
    pub fn samples_for_duration(&self, duration: Duration) -> usize {
        (duration.as_nanos() * u128::from(self.samples_per_second()) / NANOS_PER_SEC) as usize
    }

    /// Duration covered by `samples` interleaved samples
    pub fn duration_of(&self, samples: u64) -> Duration {
        let per_second = self.samples_per_second().max(1);
        let nanos = u128::from(samples) * NANOS_PER_SEC / u128::from(per_second);
        Duration::from_nanos(nanos.min(u128::from(u64::MAX)) as u64)
    }

    /// Whether `samples` interleaved samples last strictly longer than `limit`.
    ///
    /// Compared in integers so a buffer landing exactly on the limit is never
    /// counted as exceeding it.
    pub fn exceeds(&self, samples: u64, limit: Duration) -> bool {
        u128::from(samples) * NANOS_PER_SEC > limit.as_nanos() * u128::from(self.samples_per_second())
    }

    pub fn is_frame_aligned(&self, samples: usize) -> bool {
        self.channels > 0 && samples % usize::from(self.channels) == 0
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exceeds_is_strict_at_boundary() {
        let format = AudioFormat::new(11025, 1);
        let limit = Duration::from_secs(2);
        assert!(!format.exceeds(22050, limit));
        assert!(format.exceeds(22051, limit));
    }

    #[test]
    fn test_exceeds_counts_all_channels() {
        let format = AudioFormat::new(8000, 2);
        assert!(!format.exceeds(16000, Duration::from_secs(1)));
        assert!(format.exceeds(16002, Duration::from_secs(1)));
    }

    #[test]
    fn test_exceeds_with_fractional_limit() {
        let format = AudioFormat::new(48000, 1);
        let limit = Duration::from_millis(1500);
        assert!(!format.exceeds(72000, limit));
        assert!(format.exceeds(72001, limit));
    }

    #[test]
    fn test_samples_for_duration() {
        let format = AudioFormat::new(16000, 2);
        assert_eq!(format.samples_for_duration(Duration::from_millis(500)), 16000);
        assert_eq!(format.duration_of(64000), Duration::from_secs(2));
    }

    #[test]
    fn test_from_header_rejects_invalid_values() {
        assert_eq!(
            AudioFormat::from_header(2, 44100.0),
            Some(AudioFormat::new(44100, 2))
        );
        assert_eq!(AudioFormat::from_header(0, 44100.0), None);
        assert_eq!(AudioFormat::from_header(-1, 44100.0), None);
        assert_eq!(AudioFormat::from_header(1, 0.0), None);
        assert_eq!(AudioFormat::from_header(1, f32::NAN), None);
        assert_eq!(AudioFormat::from_header(70000, 8000.0), None);
    }

    #[test]
    fn test_from_header_rejects_fractional_rate() {
        assert_eq!(AudioFormat::from_header(1, 22050.5), None);
        assert_eq!(AudioFormat::from_header(1, 0.5), None);
        assert_eq!(
            AudioFormat::from_header(1, 22050.0),
            Some(AudioFormat::new(22050, 1))
        );
    }

    #[test]
    fn test_frame_alignment() {
        let stereo = AudioFormat::new(8000, 2);
        assert!(stereo.is_frame_aligned(4));
        assert!(!stereo.is_frame_aligned(3));
    }
}
