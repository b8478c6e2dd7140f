//! Worker configuration
//!
//! Defines all configurable parameters for the worker: store connection,
//! working directory, retry ceiling, external tools and their timings.
//! Upload and mail credentials are read by the client crate.

use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;

/// Timings and tool names used while recording
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Sequencer playback tool (`aplaymidi` compatible)
    pub playback_tool: String,

    /// Audio capture tool (`arecord` compatible)
    pub capture_tool: String,

    /// How often the playback and capture processes are checked
    pub poll_interval: Duration,

    /// Pause after the device reset before anything is started
    pub settle_delay: Duration,

    /// Extra time playback may run past the score's length
    pub playback_grace: Duration,

    /// How long a signalled process gets to exit before it is killed
    pub terminate_grace: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            playback_tool: "aplaymidi".to_string(),
            capture_tool: "arecord".to_string(),
            poll_interval: Duration::from_secs(1),
            settle_delay: Duration::from_secs(1),
            playback_grace: Duration::from_secs(30),
            terminate_grace: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// `sox` compatible encoder
    pub tool: String,
    pub timeout: Duration,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            tool: "sox".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string
    pub database_url: String,

    /// Directory holding each job's score, capture and encoded files
    pub media_path: PathBuf,

    /// How long one fetch blocks before the loop pulses the supervisor
    pub fetch_timeout: Duration,

    /// Attempts allowed at one status before the job is failed
    pub max_retries: u32,

    /// Storage account recordings are published to
    pub blob_account: String,
    pub blob_container: String,

    pub recorder: RecorderConfig,
    pub encoder: EncoderConfig,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(database_url: String, media_path: PathBuf) -> Self {
        Self {
            database_url,
            media_path,
            fetch_timeout: Duration::from_secs(900),
            max_retries: 3,
            blob_account: String::new(),
            blob_container: "recordings".to_string(),
            recorder: RecorderConfig::default(),
            encoder: EncoderConfig::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - DATABASE_URL (required)
    /// - MEDIA_PATH (required)
    /// - BLOB_ACCOUNT (required)
    /// - BLOB_CONTAINER (optional, default: recordings)
    /// - FETCH_TIMEOUT (optional, seconds, default: 900)
    /// - MAX_RETRIES (optional, default: 3)
    /// - POLL_INTERVAL_MS (optional, default: 1000)
    /// - SETTLE_DELAY_MS (optional, default: 1000)
    /// - PLAYBACK_GRACE (optional, seconds, default: 30)
    /// - TERMINATE_GRACE (optional, seconds, default: 10)
    /// - ENCODE_TIMEOUT (optional, seconds, default: 60)
    /// - PLAYBACK_TOOL / CAPTURE_TOOL / ENCODE_TOOL (optional)
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL environment variable not set")?;
        let media_path = std::env::var("MEDIA_PATH")
            .map(PathBuf::from)
            .context("MEDIA_PATH environment variable not set")?;

        let mut config = Self::new(database_url, media_path);

        config.blob_account =
            std::env::var("BLOB_ACCOUNT").context("BLOB_ACCOUNT environment variable not set")?;
        if let Ok(container) = std::env::var("BLOB_CONTAINER") {
            config.blob_container = container;
        }

        if let Some(timeout) = env_parse::<u64>("FETCH_TIMEOUT") {
            config.fetch_timeout = Duration::from_secs(timeout);
        }
        if let Some(max_retries) = env_parse::<u32>("MAX_RETRIES") {
            config.max_retries = max_retries;
        }

        let recorder = &mut config.recorder;
        if let Some(ms) = env_parse::<u64>("POLL_INTERVAL_MS") {
            recorder.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("SETTLE_DELAY_MS") {
            recorder.settle_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("PLAYBACK_GRACE") {
            recorder.playback_grace = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("TERMINATE_GRACE") {
            recorder.terminate_grace = Duration::from_secs(secs);
        }
        if let Ok(tool) = std::env::var("PLAYBACK_TOOL") {
            recorder.playback_tool = tool;
        }
        if let Ok(tool) = std::env::var("CAPTURE_TOOL") {
            recorder.capture_tool = tool;
        }

        if let Some(secs) = env_parse::<u64>("ENCODE_TIMEOUT") {
            config.encoder.timeout = Duration::from_secs(secs);
        }
        if let Ok(tool) = std::env::var("ENCODE_TOOL") {
            config.encoder.tool = tool;
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("database_url cannot be empty");
        }

        if !self.database_url.starts_with("postgres://")
            && !self.database_url.starts_with("postgresql://")
        {
            anyhow::bail!("database_url must start with postgres:// or postgresql://");
        }

        if !self.media_path.is_dir() {
            anyhow::bail!("media_path {} is not a directory", self.media_path.display());
        }

        if self.blob_account.is_empty() || self.blob_container.is_empty() {
            anyhow::bail!("blob_account and blob_container cannot be empty");
        }

        if self.fetch_timeout.is_zero() {
            anyhow::bail!("fetch_timeout must be greater than 0");
        }

        if self.max_retries == 0 {
            anyhow::bail!("max_retries must be greater than 0");
        }

        if self.recorder.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse::<T>().ok())
}
