//! Message channels carrying one logical recording stream each.
//!
//! The client opens a fresh stream for every chunk and closes its send side
//! on rotation; the server sees each stream as an independent receiver.

pub mod tcp;
pub mod tls;

pub use tcp::{Connection, TcpOpener, TcpReceiveChannel, TcpSendChannel};

use crate::error::TransportError;
use crate::protocol::StreamMessage;
use async_trait::async_trait;

/// Opens new outgoing streams
#[async_trait]
pub trait StreamOpener: Send + Sync {
    async fn open(&self) -> Result<Box<dyn SendChannel>, TransportError>;
}

/// Sending end of one stream
#[async_trait]
pub trait SendChannel: Send {
    async fn send(&mut self, message: &StreamMessage) -> Result<(), TransportError>;

    /// Signal end of stream to the receiver
    async fn close_send(&mut self) -> Result<(), TransportError>;
}

/// Receiving end of one stream
#[async_trait]
pub trait ReceiveChannel: Send {
    /// Next message, or `None` once the sender has closed the stream
    async fn receive(&mut self) -> Result<Option<StreamMessage>, TransportError>;
}
