//! Chunked audio streaming.
//!
//! The client captures audio and sends it over short-lived streams, rotating
//! to a new stream whenever the configured chunk length would be exceeded.
//! The server writes every stream it accepts to its own WAV file.

pub mod audio;
pub mod chunker;
pub mod cli;
pub mod config;
pub mod error;
pub mod messages;
pub mod naming;
pub mod protocol;
pub mod services;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;
