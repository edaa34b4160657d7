//! Configuration for the nbzip server.
//!
//! Layers, lowest priority first:
//! - Built-in defaults
//! - TOML file: `--config <file>`, else `<config dir>/nbzip/config.toml`
//! - Environment / CLI flags

use crate::cli::Cli;
use crate::error::{Error, Result};
use crate::streaming::target::{ArchiveTarget, DEFAULT_ARCHIVE_NAME};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_BIND: &str = "127.0.0.1:8888";

// =============================================================================
// File layer
// =============================================================================

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: ServerSection,
    pub archive: ArchiveSection,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind: Option<SocketAddr>,
    pub base_path: Option<String>,
    pub keep_alive_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveSection {
    /// Directory to walk
    pub root: Option<PathBuf>,
    /// Archive file name inside the root
    pub name: Option<String>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading config: {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| Error::filesystem(path, e))?;
        Self::parse(&text)
    }

    /// Overlay values set on the command line or in the environment.
    fn merge_cli(&mut self, cli: &Cli) {
        self.server.bind = cli.bind.or(self.server.bind);
        self.server.base_path = cli.base_path.clone().or(self.server.base_path.take());
        self.server.keep_alive_secs = cli.keep_alive_secs.or(self.server.keep_alive_secs);
        self.archive.root = cli.root.clone().or(self.archive.root.take());
        self.archive.name = cli.archive_name.clone().or(self.archive.name.take());
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("nbzip").join("config.toml"))
}

// =============================================================================
// Resolved config
// =============================================================================

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Route prefix, `/` or `/something` without a trailing slash
    pub base_path: String,
    pub keep_alive: Option<Duration>,
    pub target: ArchiveTarget,
}

impl ServerConfig {
    /// Resolve all layers for `cli`.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => FileConfig::load(&path)?,
                other => {
                    debug!(path = ?other, "No config file");
                    FileConfig::default()
                }
            },
        };
        Self::from_layers(file, cli)
    }

    pub fn from_layers(mut file: FileConfig, cli: &Cli) -> Result<Self> {
        file.merge_cli(cli);

        let bind = match file.server.bind {
            Some(bind) => bind,
            None => DEFAULT_BIND
                .parse()
                .map_err(|e| Error::Config(format!("bad default bind address: {e}")))?,
        };

        let base_path = normalize_base_path(file.server.base_path.as_deref().unwrap_or("/"))?;

        let keep_alive = match file.server.keep_alive_secs {
            Some(0) => {
                return Err(Error::Config(
                    "keep_alive_secs must be greater than 0".to_string(),
                ))
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        let name = file.archive.name.as_deref().unwrap_or(DEFAULT_ARCHIVE_NAME);
        validate_archive_name(name)?;
        let root = file.archive.root.unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            bind,
            base_path,
            keep_alive,
            target: ArchiveTarget::new(root, name),
        })
    }
}

/// The archive name must be a plain file name inside the root.
fn validate_archive_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::Config(format!(
            "archive name must be a plain file name, got {name:?}"
        )));
    }
    Ok(())
}

fn normalize_base_path(path: &str) -> Result<String> {
    if !path.starts_with('/') {
        return Err(Error::Config(format!(
            "base_path must start with '/', got {path:?}"
        )));
    }
    let trimmed = path.trim_end_matches('/');
    Ok(if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    })
}
