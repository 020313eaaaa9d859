//! CLI argument parser for procwatch
//!
//! Provides type-safe argument parsing using clap derive.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use log::LevelFilter;

use crate::config::{Config, OutputFormat, MAX_RECEIVE_BUFFER};
use crate::error::ProcwatchError;

/// Execution mode determined from CLI arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Subscribe and print process events until interrupted
    Listen,
    /// Write a sample configuration file
    InitConfig { force: bool },
}

/// CLI arguments for procwatch
#[derive(Parser, Debug)]
#[command(
    name = "procwatch",
    version,
    about = "Print Linux process lifecycle events as they happen",
    long_about = "Subscribes to the kernel's process event connector and prints one line\n\
                  per fork, exec, uid/gid change, exit and related event.\n\
                  Requires root or CAP_NET_ADMIN. Stop with Ctrl-C."
)]
pub struct CliArgs {
    /// Output format for events
    #[arg(short, long, value_enum, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Configuration file to use instead of the default location
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Receive buffer size in bytes (at most 1 MiB)
    #[arg(
        short,
        long,
        value_name = "BYTES",
        value_parser = clap::value_parser!(u32).range(1..=MAX_RECEIVE_BUFFER as i64)
    )]
    pub buffer_size: Option<u32>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Write a sample configuration file and exit
    #[arg(long)]
    pub init: bool,

    /// Overwrite an existing configuration file without asking (with --init)
    #[arg(long)]
    pub force: bool,
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments and determine execution mode
    pub fn validate(&self) -> Result<ExecutionMode, ProcwatchError> {
        if self.init {
            if self.format.is_some() || self.buffer_size.is_some() {
                return Err(ProcwatchError::InvalidArgs(
                    "--init cannot be combined with --format or --buffer-size".to_string(),
                ));
            }
            return Ok(ExecutionMode::InitConfig { force: self.force });
        }

        if self.force {
            return Err(ProcwatchError::InvalidArgs(
                "--force requires --init".to_string(),
            ));
        }

        Ok(ExecutionMode::Listen)
    }

    /// Load the configuration named by `--config`, or the default file
    pub fn load_config(&self) -> Result<Config, ProcwatchError> {
        match &self.config {
            Some(path) => Config::load_explicit(path),
            None => Ok(Config::load()),
        }
    }

    /// Output format, command line first, then config
    pub fn output_format(&self, config: &Config) -> OutputFormat {
        self.format.unwrap_or_else(|| config.output_format())
    }

    /// Receive buffer size, command line first, then config
    pub fn buffer_size(&self, config: &Config) -> usize {
        self.buffer_size
            .map(|bytes| bytes as usize)
            .unwrap_or_else(|| config.receive_buffer())
    }

    /// Log level selected by `-v`
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}
