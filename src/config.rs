//! Configuration file loader for procwatch
//!
//! Loads and parses ~/.config/procwatch/config.toml configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use log::{debug, warn};
use serde::Deserialize;

use crate::codec::layout::EVENT_FRAME_LEN;
use crate::error::ProcwatchError;

/// Default receive buffer size in bytes
pub const DEFAULT_RECEIVE_BUFFER: usize = 4096;

/// Largest accepted receive buffer size in bytes
pub const MAX_RECEIVE_BUFFER: usize = 1024 * 1024;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// How events are written to stdout
    pub output: Option<OutputConfig>,
    /// Netlink channel tuning
    pub channel: Option<ChannelConfig>,
}

/// `[output]` section
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

/// `[channel]` section
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Size of the buffer each datagram is received into
    #[serde(default = "default_receive_buffer")]
    pub receive_buffer: usize,
}

fn default_receive_buffer() -> usize {
    DEFAULT_RECEIVE_BUFFER
}

/// Event line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One human-readable line per event
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl Config {
    /// Load configuration from ~/.config/procwatch/config.toml
    ///
    /// Returns default config if file doesn't exist.
    /// Returns default config with warning on parse error.
    pub fn load() -> Self {
        Self::load_from_path(Self::config_path())
    }

    /// Load configuration from a specific path, falling back to defaults
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            debug!("no config file at {}", path.display());
            return Self::default();
        }

        match Self::load_explicit(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load a file the user named explicitly; it must exist and parse
    pub fn load_explicit(path: &Path) -> Result<Self, ProcwatchError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ProcwatchError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config = toml::from_str::<Config>(&content).map_err(|e| {
            ProcwatchError::ConfigError(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        if config.receive_buffer() > MAX_RECEIVE_BUFFER {
            return Err(ProcwatchError::ConfigError(format!(
                "Invalid config file {}: receive_buffer {} exceeds the maximum of {} bytes",
                path.display(),
                config.receive_buffer(),
                MAX_RECEIVE_BUFFER
            )));
        }

        Ok(config)
    }

    /// Get the default config file path (XDG-compliant)
    ///
    /// Returns `~/.config/procwatch/config.toml` on Linux
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|config_dir| config_dir.join("procwatch"))
    }

    /// Configured output format
    pub fn output_format(&self) -> OutputFormat {
        self.output
            .as_ref()
            .map(|output| output.format)
            .unwrap_or_default()
    }

    /// Configured receive buffer size
    pub fn receive_buffer(&self) -> usize {
        self.channel
            .as_ref()
            .map(|channel| channel.receive_buffer)
            .unwrap_or(DEFAULT_RECEIVE_BUFFER)
    }
}

/// Raise a requested buffer size to at least one full event frame
pub fn effective_buffer_len(requested: usize) -> usize {
    if requested < EVENT_FRAME_LEN {
        warn!(
            "receive buffer of {} bytes is smaller than an event frame, using {}",
            requested, EVENT_FRAME_LEN
        );
        EVENT_FRAME_LEN
    } else {
        requested
    }
}
