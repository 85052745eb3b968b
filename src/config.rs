//! Server configuration
//!
//! Values come from, in increasing priority: built-in defaults, an optional
//! YAML file, environment variables and command-line flags.
//!
//! ```yaml
//! server:
//!   listen_addr: "0.0.0.0:4221"
//!   max_connections: 512
//! files:
//!   directory: "/srv/courier"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

use crate::http::connection::DEFAULT_MAX_REQUEST_BYTES;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:4221";

/// Command-line flags for the `courier` binary.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "courier")]
#[command(about = "Minimal HTTP/1.1 server with echo and file routes")]
pub struct Cli {
    /// Directory served by the /files/ routes
    #[arg(long, env = "COURIER_DIRECTORY")]
    pub directory: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "LISTEN")]
    pub listen: Option<String>,

    /// YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum number of connections served at once (unbounded if unset)
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Maximum bytes buffered for a single request
    #[arg(long)]
    pub max_request_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub files: FilesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub max_connections: Option<usize>,
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            max_connections: None,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub directory: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Defaults overridden by the `LISTEN` and `COURIER_DIRECTORY` environment variables.
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(listen_addr) = std::env::var("LISTEN") {
            cfg.server.listen_addr = listen_addr;
        }
        if let Ok(directory) = std::env::var("COURIER_DIRECTORY") {
            cfg.files.directory = PathBuf::from(directory);
        }

        cfg
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("Invalid configuration YAML")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&yaml)
            .with_context(|| format!("Failed to load config file {}", path.display()))
    }

    /// Builds the configuration from parsed flags, layering them over the
    /// config file when one is given.
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let mut cfg = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(listen_addr) = cli.listen {
            cfg.server.listen_addr = listen_addr;
        }
        if let Some(directory) = cli.directory {
            cfg.files.directory = directory;
        }
        if cli.max_connections.is_some() {
            cfg.server.max_connections = cli.max_connections;
        }
        if let Some(limit) = cli.max_request_bytes {
            cfg.server.max_request_bytes = limit;
        }

        if cfg.server.max_connections == Some(0) {
            anyhow::bail!("max_connections must be at least 1");
        }

        Ok(cfg)
    }
}
