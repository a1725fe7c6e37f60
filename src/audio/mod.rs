pub mod capture;
pub mod format;
pub mod sink;
pub mod wav_sink;

pub use capture::{AudioCapture, CaptureConfig, CaptureSource};
pub use format::AudioFormat;
pub use sink::{AudioSink, SinkFactory};
pub use wav_sink::{WavEncoding, WavSink};
