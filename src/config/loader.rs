//! Configuration Loader
//!
//! Layers configuration sources with the `config` crate:
//!
//! 1. Built-in defaults ([`ClientConfig::default`])
//! 2. TOML file: `CREAM_CONFIG_PATH`, `./cream-client.toml` or
//!    `./config/cream-client.toml`
//! 3. `CREAM_` environment variables, nested keys joined by `__`
//!    (`CREAM_SERVERS=a:11211,b:11211`, `CREAM_FAILOVER__COOLDOWN_MS=500`)

use super::ClientConfig;
use crate::error::{CacheError, CacheResult};
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

const ENV_PREFIX: &str = "CREAM";
const CONFIG_PATH_VAR: &str = "CREAM_CONFIG_PATH";

impl ClientConfig {
    /// Load configuration from the default file locations and environment
    pub fn load() -> CacheResult<Self> {
        let path = Self::find_config_file();
        if let Some(path) = &path {
            debug!(path = %path.display(), "Loading cache client config file");
        }
        Self::load_layered(path.as_deref(), true)
    }

    /// Load configuration from a specific file, then apply environment overrides
    pub fn load_from_file(path: &Path) -> CacheResult<Self> {
        if !path.is_file() {
            return Err(CacheError::config_error(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Self::load_layered(Some(path), true)
    }

    /// Layer defaults, an optional file and (optionally) the environment
    pub fn load_layered(path: Option<&Path>, with_env: bool) -> CacheResult<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&ClientConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()).format(FileFormat::Toml));
        }

        if with_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("servers")
                    .try_parsing(true),
            );
        }

        let config: ClientConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            servers = ?config.servers,
            codec = %config.codec,
            pool_size = config.pool.size,
            fallback_depth = config.failover.fallback_depth,
            "Cache client configuration loaded"
        );
        Ok(config)
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(explicit) = std::env::var(CONFIG_PATH_VAR) {
            let path = PathBuf::from(explicit);
            return path.is_file().then_some(path);
        }

        [
            Path::new("./cream-client.toml"),
            Path::new("./config/cream-client.toml"),
        ]
        .into_iter()
        .find(|path| path.is_file())
        .map(Path::to_path_buf)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> CacheResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::config_error(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| CacheError::config_error(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| CacheError::config_error(format!("Failed to write config file: {e}")))?;

        Ok(())
    }
}

impl From<config::ConfigError> for CacheError {
    fn from(error: config::ConfigError) -> Self {
        CacheError::config_error(error.to_string())
    }
}
