//! Layered configuration: defaults, optional file, then `STARNOTARY_*` env.

use anyhow::{Context, Result};
use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;
use starnotary_registry::RegistryConfig;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "starnotary.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// JSON document holding registry and ledger state.
    pub state_path: PathBuf,
    pub log_level: String,
    /// `pretty` or `compact`.
    pub log_format: String,
    pub registry: RegistryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("starnotary-state.json"),
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
            registry: RegistryConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(config_path_override: Option<&Path>) -> Result<Self> {
        let resolved_path = match config_path_override {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!(
                        "Configuration file {} not found (specified via --config)",
                        path.display()
                    );
                }
                Some(path.to_path_buf())
            }
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                path.exists().then_some(path)
            }
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(
            Environment::with_prefix("STARNOTARY")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()?
            .try_deserialize()
            .context("Failed to parse star notary configuration")
    }
}
