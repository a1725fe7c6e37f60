pub mod recorder;
pub mod server;

pub use recorder::{Recorder, RecorderHandle};
pub use server::{RecordingServer, SessionEvent};
