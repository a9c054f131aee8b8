//! Command-line surface, in the teacher's clap-derive style.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "bncs-lobbyd", version, about = "BNCS-style game lobby server")]
pub struct Args {
    /// Path to a TOML settings file. Missing fields fall back to defaults.
    #[arg(short, long, env = "BNCS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Overrides `listen_addr` from the config file.
    #[arg(long, env = "BNCS_LISTEN_ADDR")]
    pub listen_addr: Option<String>,

    /// `error`, `warn`, `info`, `debug`, or `trace`; also settable via
    /// `RUST_LOG` for per-module filtering.
    #[arg(long, env = "BNCS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Output format for log records.
    #[arg(long, env = "BNCS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Disable ANSI color codes in log output, for terminals or log
    /// collectors that don't handle them.
    #[arg(long, env = "BNCS_NO_COLOR")]
    pub no_color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable, single line per record.
    Text,
    /// Newline-delimited JSON, for shipping to a log aggregator.
    Json,
    /// Multi-line, human-readable with full span context.
    Pretty,
}
