//! Command-line interface.
//!
//! Flags override values from the optional config file, which override the
//! built-in defaults.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{read_config, validate_config, ConfigError, ProxyConfig};

#[derive(Debug, Parser)]
#[command(name = "hop-proxy")]
#[command(about = "Single-hop HTTP forwarding proxy", long_about = None)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Gzip responses for clients that accept it.
    #[arg(long, value_name = "BOOL")]
    pub gzip: Option<bool>,

    /// Keep-alive toggle (accepted, currently no effect).
    #[arg(long, value_name = "BOOL")]
    pub keepalive: Option<bool>,

    /// Forward If-Modified-Since / If-None-Match to backends.
    #[arg(long, value_name = "BOOL")]
    pub local_caching: Option<bool>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Build the effective configuration. Validation runs once, after the
    /// flags are applied.
    pub fn load(&self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => ProxyConfig::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Apply flag overrides on top of `config`.
    pub fn apply(&self, config: &mut ProxyConfig) {
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(gzip) = self.gzip {
            config.features.compression = gzip;
        }
        if let Some(keepalive) = self.keepalive {
            config.features.keepalive = keepalive;
        }
        if let Some(local_caching) = self.local_caching {
            config.features.local_caching = local_caching;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}
