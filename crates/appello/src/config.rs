//! Configuration loading from environment variables.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::setup::DEFAULT_MAX_CLASSES;
use crate::store::Backend;

pub const BACKEND_VAR: &str = "APPELLO_BACKEND";
pub const DATA_DIR_VAR: &str = "APPELLO_DATA_DIR";
pub const MAX_CLASSES_VAR: &str = "APPELLO_MAX_CLASSES";

/// Runtime settings shared by the server and the CLI commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backend: Backend,
    pub data_dir: PathBuf,
    pub max_classes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Json,
            data_dir: PathBuf::from("data"),
            max_classes: DEFAULT_MAX_CLASSES,
        }
    }
}

impl Config {
    /// Load settings from the environment, reading a `.env` file if present.
    ///
    /// Unset variables fall back to the defaults; set but malformed ones
    /// are an error.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(backend) = lookup(BACKEND_VAR) {
            config.backend = backend
                .parse()
                .with_context(|| format!("{BACKEND_VAR} is invalid"))?;
        }
        if let Some(dir) = lookup(DATA_DIR_VAR).filter(|d| !d.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(max) = lookup(MAX_CLASSES_VAR) {
            config.max_classes = max
                .trim()
                .parse()
                .with_context(|| format!("{MAX_CLASSES_VAR} must be a number, got {max:?}"))?;
        }

        Ok(config)
    }

    /// Apply command line overrides on top of the environment
    pub fn with_overrides(mut self, backend: Option<Backend>, data_dir: Option<PathBuf>) -> Self {
        if let Some(backend) = backend {
            self.backend = backend;
        }
        if let Some(dir) = data_dir {
            self.data_dir = dir;
        }
        self
    }
}
