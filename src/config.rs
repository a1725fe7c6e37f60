use crate::audio::{AudioFormat, WavEncoding};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Address to send the recording to
    #[serde(default = "default_address")]
    pub address: String,

    /// Audio per stream before rotating to a new one, e.g. "30s"
    #[serde(default = "default_chunk_length")]
    pub chunk_length: String,

    /// How long to record; "0s" records until interrupted
    #[serde(default = "default_length")]
    pub length: String,

    /// String to match in the input device name
    #[serde(default)]
    pub input: String,

    #[serde(default = "default_channels")]
    pub channels: u16,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Audio per capture buffer
    #[serde(default = "default_buffer_duration")]
    pub buffer_duration: String,

    /// PEM file with the certificates to trust; plain TCP when unset
    #[serde(default)]
    pub cert: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub encoding: WavEncoding,

    /// PEM file with the certificate chain and private key; plain TCP when unset
    #[serde(default)]
    pub cert: Option<PathBuf>,
}

fn default_address() -> String {
    "localhost:9876".to_string()
}

fn default_chunk_length() -> String {
    "1m".to_string()
}

fn default_length() -> String {
    "5s".to_string()
}

fn default_channels() -> u16 {
    1
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_buffer_duration() -> String {
    "1s".to_string()
}

fn default_bind() -> String {
    "localhost:9876".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_prefix() -> String {
    "rec".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            chunk_length: default_chunk_length(),
            length: default_length(),
            input: String::new(),
            channels: default_channels(),
            sample_rate: default_sample_rate(),
            buffer_duration: default_buffer_duration(),
            cert: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            output_dir: default_output_dir(),
            prefix: default_prefix(),
            encoding: WavEncoding::default(),
            cert: None,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location
    /// (~/.config/chunkrec/config.json) when no path is given.
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// explicit path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default_path = Self::config_path()?;
                if !default_path.exists() {
                    tracing::debug!("No config file at {:?}, using defaults", default_path);
                    return Ok(Self::default());
                }
                default_path
            }
        };

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        tracing::info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(dir)
        } else {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            PathBuf::from(home).join(".config")
        };

        Ok(config_dir.join("chunkrec").join("config.json"))
    }
}

impl ClientConfig {
    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.channels)
    }

    pub fn chunk_length(&self) -> Result<Duration> {
        parse_duration("chunk_length", &self.chunk_length)
    }

    /// Total recording time, `None` to record until interrupted
    pub fn length(&self) -> Result<Option<Duration>> {
        let length = parse_duration("length", &self.length)?;
        Ok((!length.is_zero()).then_some(length))
    }

    pub fn buffer_duration(&self) -> Result<Duration> {
        parse_duration("buffer_duration", &self.buffer_duration)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(anyhow::anyhow!("address cannot be empty"));
        }

        if self.channels == 0 {
            return Err(anyhow::anyhow!("channels must be at least 1"));
        }

        if self.sample_rate == 0 {
            return Err(anyhow::anyhow!("sample_rate must be positive"));
        }

        if self.chunk_length()?.is_zero() {
            return Err(anyhow::anyhow!("chunk_length must be positive"));
        }

        self.length()?;

        if self.format().samples_for_duration(self.buffer_duration()?) < usize::from(self.channels) {
            return Err(anyhow::anyhow!("buffer_duration must cover at least one frame"));
        }

        validate_cert(self.cert.as_deref())
    }
}

impl ServerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.bind.is_empty() {
            return Err(anyhow::anyhow!("bind cannot be empty"));
        }

        if self.prefix.is_empty() || self.prefix.contains(std::path::MAIN_SEPARATOR) {
            return Err(anyhow::anyhow!(
                "prefix must be a non-empty file name component"
            ));
        }

        if !self.output_dir.is_dir() {
            return Err(anyhow::anyhow!(
                "output_dir {:?} is not a directory",
                self.output_dir
            ));
        }

        validate_cert(self.cert.as_deref())
    }
}

fn validate_cert(cert: Option<&Path>) -> Result<()> {
    match cert {
        Some(path) if !path.is_file() => Err(anyhow::anyhow!("cert {:?} is not a file", path)),
        _ => Ok(()),
    }
}

fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .with_context(|| format!("Invalid duration for {}: {:?}", key, value))
}
