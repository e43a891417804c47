//! Layered server configuration: optional `cape.toml`, environment
//! variables, CLI flags. Flags win over environment, environment wins
//! over the file.

use std::path::{Path, PathBuf};
use std::{env, fs};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub db: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl Config {
    /// Load from `CAPE_CONFIG`, or `./cape.toml` when present; an absent
    /// file is an empty config.
    pub fn load() -> Result<Self> {
        let path = env::var("CAPE_CONFIG").map(PathBuf::from).ok().or_else(|| {
            let local = PathBuf::from("cape.toml");
            local.exists().then_some(local)
        });

        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Database path: flag → `CAPE_DB` → config file → data dir default.
    pub fn db_path(&self, flag: Option<&Path>) -> PathBuf {
        if let Some(path) = flag {
            return path.to_path_buf();
        }
        if let Ok(path) = env::var("CAPE_DB") {
            return PathBuf::from(path);
        }
        if let Some(path) = &self.db {
            return path.clone();
        }
        default_data_dir().join("cape.db")
    }

    pub fn host(&self, flag: Option<&str>) -> String {
        if let Some(host) = flag {
            return host.to_string();
        }
        if let Ok(host) = env::var("CAPE_HOST") {
            return host;
        }
        self.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string())
    }

    pub fn port(&self, flag: Option<u16>) -> u16 {
        flag.or_else(|| env::var("CAPE_PORT").ok().and_then(|v| v.parse().ok()))
            .or(self.port)
            .unwrap_or(DEFAULT_PORT)
    }
}

/// Base directory for cape storage: `CAPE_DATA_DIR` or `~/.cape`.
pub fn default_data_dir() -> PathBuf {
    env::var("CAPE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".cape"))
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
