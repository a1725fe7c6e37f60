// Command-line interface definitions for chunkrec

use crate::audio::WavEncoding;
use crate::config::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chunkrec")]
#[command(author, version, about = "Stream live audio to a server in rotating chunks")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture audio and stream it to a server
    Client(ClientArgs),

    /// Receive streams and write one WAV file per stream
    Server(ServerArgs),

    /// List audio input devices
    Devices,
}

#[derive(clap::Args, Debug, Default)]
pub struct ClientArgs {
    /// Address to send the recording to
    #[arg(long)]
    pub address: Option<String>,

    /// Audio per stream before rotating, e.g. "30s"
    #[arg(long, value_name = "DURATION")]
    pub chunk_length: Option<String>,

    /// How long to record, "0s" for until Ctrl+C
    #[arg(long, value_name = "DURATION")]
    pub length: Option<String>,

    /// String to match in input device name
    #[arg(long)]
    pub input: Option<String>,

    /// How many channels to record
    #[arg(long)]
    pub num_channels: Option<u16>,

    /// What sample rate to record at
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// PEM certificate(s) to trust, enables TLS
    #[arg(long, value_name = "FILE")]
    pub cert: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Default)]
pub struct ServerArgs {
    /// Address to bind to
    #[arg(long)]
    pub bind: Option<String>,

    /// Directory for recordings
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Recording file name prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Sample encoding inside the WAV files
    #[arg(long, value_enum)]
    pub encoding: Option<WavEncoding>,

    /// PEM file with certificate chain and key, enables TLS
    #[arg(long, value_name = "FILE")]
    pub cert: Option<PathBuf>,
}

impl ClientArgs {
    /// Apply command-line overrides on top of the loaded config
    pub fn apply(self, config: &mut Config) {
        let client = &mut config.client;
        if let Some(address) = self.address {
            client.address = address;
        }
        if let Some(chunk_length) = self.chunk_length {
            client.chunk_length = chunk_length;
        }
        if let Some(length) = self.length {
            client.length = length;
        }
        if let Some(input) = self.input {
            client.input = input;
        }
        if let Some(channels) = self.num_channels {
            client.channels = channels;
        }
        if let Some(sample_rate) = self.sample_rate {
            client.sample_rate = sample_rate;
        }
        if let Some(cert) = self.cert {
            client.cert = Some(cert);
        }
    }
}

impl ServerArgs {
    /// Apply command-line overrides on top of the loaded config
    pub fn apply(self, config: &mut Config) {
        let server = &mut config.server;
        if let Some(bind) = self.bind {
            server.bind = bind;
        }
        if let Some(output_dir) = self.output_dir {
            server.output_dir = output_dir;
        }
        if let Some(prefix) = self.prefix {
            server.prefix = prefix;
        }
        if let Some(encoding) = self.encoding {
            server.encoding = encoding;
        }
        if let Some(cert) = self.cert {
            server.cert = Some(cert);
        }
    }
}
