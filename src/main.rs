use chunkrec::audio::{AudioCapture, CaptureConfig, capture};
use chunkrec::chunker::StreamChunker;
use chunkrec::cli::{Cli, ClientArgs, Commands, ServerArgs};
use chunkrec::config::Config;
use chunkrec::naming::{RecordingNamer, WavFiles};
use chunkrec::services::{Recorder, RecorderHandle, RecordingServer};
use chunkrec::transport::{TcpOpener, tls};

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("chunkrec={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // Load configuration
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Client(args) => {
            // Create LocalSet for !Send futures (needed for Recorder which holds cpal::Stream)
            let local = tokio::task::LocalSet::new();
            local
                .run_until(async move { run_client(config, args).await })
                .await
        }
        Commands::Server(args) => run_server(&mut config, args).await,
        Commands::Devices => {
            for name in capture::list_input_devices()? {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

async fn run_client(mut config: Config, args: ClientArgs) -> Result<()> {
    args.apply(&mut config);
    let client = &config.client;
    client.validate()?;

    let format = client.format();
    let chunk_length = client.chunk_length()?;
    let length = client.length()?;

    tracing::info!(
        "Streaming to {} in chunks of {:?} ({} channel(s), {} Hz)",
        client.address,
        chunk_length,
        format.channels,
        format.sample_rate
    );

    let source = AudioCapture::new(CaptureConfig {
        format,
        device: client.input.clone(),
        buffer_duration: client.buffer_duration()?,
    });
    let mut opener = TcpOpener::new(client.address.clone());
    if let Some(cert) = &client.cert {
        opener = opener.with_tls(tls::client_connector(cert)?);
        tracing::info!("Using TLS, trusting certificates from {:?}", cert);
    }
    let chunker = StreamChunker::new(opener, format, chunk_length);

    // Create and spawn Recorder (using spawn_local because it's !Send)
    let (recorder_tx, recorder_rx) = mpsc::channel(10);
    let recorder = Recorder::new(source, chunker, recorder_rx);
    let recorder_handle = RecorderHandle::new(recorder_tx);
    tokio::task::spawn_local(recorder.run());

    recorder_handle.start().await?;

    match length {
        Some(length) => {
            tokio::select! {
                _ = tokio::time::sleep(length) => {
                    tracing::info!("Recorded for {:?}, stopping", length);
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl+C, stopping");
                }
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            tracing::info!("Received Ctrl+C, stopping");
        }
    }

    let stats = recorder_handle.stop().await?;
    tracing::info!(
        "Sent {} samples over {} stream(s), {} buffer(s) dropped, {} samples lost in capture",
        stats.chunks.samples_sent,
        stats.chunks.streams_opened,
        stats.chunks.buffers_dropped,
        stats.lost_samples
    );
    Ok(())
}

async fn run_server(config: &mut Config, args: ServerArgs) -> Result<()> {
    args.apply(config);
    let server_config = &config.server;
    server_config.validate()?;

    let files = WavFiles::new(
        RecordingNamer::new(&server_config.output_dir, &server_config.prefix),
        server_config.encoding,
    );
    let mut server = RecordingServer::bind(&server_config.bind, Arc::new(files)).await?;
    if let Some(cert) = &server_config.cert {
        server = server.with_tls(tls::server_acceptor(cert)?);
        tracing::info!("Using TLS with certificate {:?}", cert);
    }
    tracing::info!(
        "Listening on {}, writing {:?} recordings to {:?}",
        server.local_addr()?,
        server_config.encoding,
        server_config.output_dir
    );

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Received Ctrl+C, shutting down");
        })
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}
