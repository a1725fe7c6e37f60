use crate::audio::SinkFactory;
use crate::error::SessionError;
use crate::session::{self, SessionSummary};
use crate::transport::TcpReceiveChannel;
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

/// Time a client gets to complete the TLS handshake
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one accepted stream
#[derive(Debug)]
pub struct SessionEvent {
    pub peer: SocketAddr,
    pub result: Result<SessionSummary, SessionError>,
}

/// Accepts streams and serves each one as an independent session
///
/// Sessions share nothing but the sink factory, whose naming counter is atomic.
pub struct RecordingServer {
    listener: TcpListener,
    files: Arc<dyn SinkFactory>,
    tls: Option<TlsAcceptor>,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl RecordingServer {
    pub async fn bind(address: &str, files: Arc<dyn SinkFactory>) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("could not listen on {:?}", address))?;
        Ok(Self::from_listener(listener, files))
    }

    pub fn from_listener(listener: TcpListener, files: Arc<dyn SinkFactory>) -> Self {
        Self {
            listener,
            files,
            tls: None,
            events: None,
        }
    }

    /// Require TLS on every accepted connection
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// Report every finished session on `events`
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("failed to read local listener address")
    }

    /// Accept streams until `shutdown` resolves, then wait for in-flight
    /// sessions so their files are finalized.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::info!("Accepted stream from {}", peer);
                        let files = self.files.clone();
                        let tls = self.tls.clone();
                        let events = self.events.clone();
                        sessions.spawn(serve_connection(stream, peer, tls, files, events));
                    }
                    Err(e) => {
                        tracing::warn!("Failed to accept connection: {}", e);
                    }
                },

                // Reap finished sessions so the set does not grow unbounded
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("Session task failed: {}", e);
                    }
                }

                _ = &mut shutdown => break,
            }
        }

        tracing::info!("Waiting for {} active session(s)", sessions.len());
        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Session task failed: {}", e);
            }
        }
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    tls: Option<TlsAcceptor>,
    files: Arc<dyn SinkFactory>,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
) {
    let result = match open_channel(stream, peer, tls).await {
        Ok(mut channel) => session::serve(&mut channel, files.as_ref()).await,
        Err(e) => Err(e),
    };

    match &result {
        Ok(summary) => tracing::info!(
            "Stream from {} done: {} blocks, {} frames written to {:?}",
            peer,
            summary.blocks,
            summary.frames,
            summary.path
        ),
        Err(e) => tracing::error!("Stream from {} failed: {}", peer, e),
    }

    if let Some(events) = events {
        let _ = events.send(SessionEvent { peer, result });
    }
}

async fn open_channel(
    stream: TcpStream,
    peer: SocketAddr,
    tls: Option<TlsAcceptor>,
) -> Result<TcpReceiveChannel, SessionError> {
    let Some(acceptor) = tls else {
        return Ok(TcpReceiveChannel::new(stream, peer));
    };
    let stream = tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream))
        .await
        .map_err(|_| SessionError::Handshake(format!("timed out after {:?}", HANDSHAKE_TIMEOUT)))?
        .map_err(|e| SessionError::Handshake(e.to_string()))?;
    Ok(TcpReceiveChannel::new(stream, peer))
}
