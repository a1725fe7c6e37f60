//! Error types for the streaming core.

use std::time::Duration;
use thiserror::Error;

/// Malformed bytes on the wire.
#[derive(Error, Debug, PartialEq)]
pub enum ProtocolError {
    #[error("Frame is empty")]
    EmptyFrame,

    #[error("Unknown message tag: {0}")]
    UnknownTag(u8),

    #[error("Truncated {what}: expected {expected} bytes, got {actual}")]
    Truncated {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Sample payload of {0} bytes is not a whole number of f32 values")]
    MisalignedSamples(usize),

    #[error("Frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },
}

/// Failures of the message channel carrying one logical stream.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to {address}: {message}")]
    Connect { address: String, message: String },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Stream already closed")]
    Closed,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by the client-side chunker for a single buffer.
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Buffer of {len} samples is not a multiple of {channels} channels")]
    MisalignedBuffer { len: usize, channels: u16 },

    #[error("Could not open a new stream, dropping buffer: {0}")]
    Rotation(#[source] TransportError),

    #[error("Failed to send samples: {0}")]
    Send(#[source] TransportError),

    #[error("Failed to close stream: {0}")]
    Close(#[source] TransportError),
}

/// Failures that terminate one server-side recording session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("Stream did not start with a header")]
    MissingHeader,

    #[error("Invalid header: {channel_count} channels at {sample_rate} Hz")]
    InvalidHeader { channel_count: i32, sample_rate: f32 },

    #[error(
        "Header mismatch: stream opened with {expected_channels} channels at {expected_rate} Hz, got {channel_count} channels at {sample_rate} Hz"
    )]
    HeaderMismatch {
        expected_channels: u16,
        expected_rate: u32,
        channel_count: i32,
        sample_rate: f32,
    },

    #[error("Sample block of {len} samples is not a multiple of {channels} channels")]
    MisalignedBlock { len: usize, channels: u16 },

    #[error("Receive failed before header: {0}")]
    Receive(#[source] TransportError),

    #[error("Failed to create recording: {message}")]
    CreateFile { message: String },

    #[error("Failed to write to {path}: {message}")]
    Write { path: String, message: String },

    #[error("Failed to finalize {path}: {message}")]
    Finalize { path: String, message: String },
}
