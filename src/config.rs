//! Configuration for the RAX FTP client
//!
//! Buffer thresholds and transfer tuning, loadable from `client.toml` with
//! `RAX_FTP_CLIENT`-prefixed environment overrides. Library consumers can
//! rely on `Default` and never touch a config file.

use config::{Config, Environment, File};
use serde::Deserialize;

/// Client tuning knobs.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClientConfig {
    /// Pending-write size above which the socket stops coalescing small
    /// writes and flushes immediately.
    pub flush_threshold: usize,

    /// Cap on buffered unread bytes per socket; 0 means unbounded.
    pub read_buffer_limit: usize,

    /// Fixed block size for chunked uploads.
    pub transfer_block_size: usize,

    /// Control-connection port used when the caller does not specify one.
    pub default_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            flush_threshold: crate::socket::buffered::DEFAULT_FLUSH_THRESHOLD,
            read_buffer_limit: 0,
            transfer_block_size: 1024,
            default_port: 21,
        }
    }
}

impl ClientConfig {
    /// Load configuration from client.toml (optional) with environment
    /// overrides.
    pub fn load() -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("client").required(false))
            .add_source(Environment::with_prefix("RAX_FTP_CLIENT").separator("_"))
            .build()?;

        let config: ClientConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.transfer_block_size == 0 {
            return Err(config::ConfigError::Message(
                "transfer_block_size must be greater than 0".into(),
            ));
        }
        if self.flush_threshold == 0 {
            return Err(config::ConfigError::Message(
                "flush_threshold must be greater than 0".into(),
            ));
        }
        if self.default_port == 0 {
            return Err(config::ConfigError::Message(
                "default_port cannot be 0".into(),
            ));
        }
        Ok(())
    }
}
