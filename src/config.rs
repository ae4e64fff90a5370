//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/fmeta.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:8077"
//!
//! [store]
//! default_created_by = "system"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8077".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Recorded as `created_by` when a create carries no caller identity.
    #[serde(default = "default_created_by")]
    pub default_created_by: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_created_by: default_created_by(),
        }
    }
}

fn default_created_by() -> String {
    "system".to_string()
}

impl Config {
    /// Config with every section at its default and the database at `db_path`.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
                max_connections: default_max_connections(),
            },
            server: ServerConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be > 0");
    }

    if config.store.default_created_by.trim().is_empty() {
        anyhow::bail!("store.default_created_by must not be empty");
    }

    Ok(config)
}
