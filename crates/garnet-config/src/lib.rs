//! Configuration management for Garnet
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (GARNET_* prefix, highest precedence)
//! 2. garnet.local.toml (gitignored, local overrides)
//! 3. garnet.toml (git-tracked, project config)
//! 4. ~/.config/garnet/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)
//!
//! The configuration names a backend kind and its settings; the facade
//! turns a loaded [`GarnetConfig`] into a live backend, so the storage
//! choice stays in configuration rather than in code.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main Garnet configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GarnetConfig {
    pub project: ProjectConfig,
    pub backend: BackendConfig,
    pub sqlite: SqliteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "garnet-project".to_string(),
        }
    }
}

/// Which storage engine the facade should construct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Memory,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Memory,
    Sqlite,
}

/// Settings for the SQLite backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    pub path: PathBuf,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".garnet/garnet.db"),
        }
    }
}

impl GarnetConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Parse a single TOML file, ignoring the layered sources.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// A configuration for the in-memory backend
    pub fn in_memory() -> Self {
        Self {
            backend: BackendConfig {
                kind: BackendKind::Memory,
            },
            ..Default::default()
        }
    }

    /// A configuration for the SQLite backend at `path`
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendConfig {
                kind: BackendKind::Sqlite,
            },
            sqlite: SqliteConfig { path: path.into() },
            ..Default::default()
        }
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();
        if self.sqlite.path.is_relative() {
            self.sqlite.path = base.join(&self.sqlite.path);
        }
    }
}
