//! Configuration management with environment variable support.
//!
//! [`Config`] is loaded from a JSON file, then environment overrides are
//! applied, then values are validated.
//!
//! ## Environment Variables
//!
//! - `AXCRYPT_CONFIG`: Override config file path
//! - `AXCRYPT_KEY_STORE_DIR`: Directory holding `Keys-*.axx` key files
//! - `AXCRYPT_SUITE`: Display name of the suite used for new files
//! - `AXCRYPT_ITERATIONS`: PBKDF2 iteration count for new files
//! - `AXCRYPT_COMPRESS`: `true`/`false`, compress payloads by default

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::kdf::{DEFAULT_ITERATIONS, MAX_ITERATIONS};
use crate::suite::CryptoRegistry;

/// Environment variable names for configuration overrides
pub const ENV_CONFIG_PATH: &str = "AXCRYPT_CONFIG";
pub const ENV_KEY_STORE_DIR: &str = "AXCRYPT_KEY_STORE_DIR";
pub const ENV_SUITE: &str = "AXCRYPT_SUITE";
pub const ENV_ITERATIONS: &str = "AXCRYPT_ITERATIONS";
pub const ENV_COMPRESS: &str = "AXCRYPT_COMPRESS";

/// Below this a warning is logged
const WEAK_ITERATIONS: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub key_store_dir: String,
    pub default_suite: String,
    pub iterations: u32,
    pub compress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_store_dir: "./keys".to_string(),
            default_suite: "AES-256".to_string(),
            iterations: DEFAULT_ITERATIONS,
            compress: false,
        }
    }
}

impl Config {
    /// Load config from file path
    pub fn load(path: &str) -> Result<Self> {
        let s =
            fs::read_to_string(path).with_context(|| format!("reading config file {}", path))?;
        let mut config: Config =
            serde_json::from_str(&s).with_context(|| format!("parsing config file {}", path))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load config with environment variable overrides.
    /// Priority: ENV vars > config file > defaults
    pub fn load_with_env(path: Option<&str>) -> Result<Self> {
        let config_path = path
            .map(String::from)
            .or_else(|| env::var(ENV_CONFIG_PATH).ok());

        let mut config = match config_path {
            Some(ref p) if Path::new(p).exists() => {
                info!(path = p, "loading config from file");
                let s = fs::read_to_string(p)
                    .with_context(|| format!("reading config file {}", p))?;
                serde_json::from_str(&s).with_context(|| format!("parsing config file {}", p))?
            }
            _ => {
                debug!("using default configuration");
                Config::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| env::var(name).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup(ENV_KEY_STORE_DIR) {
            debug!(key_store_dir = %dir, "overriding key_store_dir from environment");
            self.key_store_dir = dir;
        }

        if let Some(suite) = lookup(ENV_SUITE) {
            debug!(suite = %suite, "overriding default_suite from environment");
            self.default_suite = suite;
        }

        if let Some(raw) = lookup(ENV_ITERATIONS) {
            self.iterations = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be an integer, got {:?}", ENV_ITERATIONS, raw))?;
            debug!(iterations = self.iterations, "overriding iterations from environment");
        }

        if let Some(raw) = lookup(ENV_COMPRESS) {
            self.compress = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => bail!("{} must be a boolean, got {:?}", ENV_COMPRESS, raw),
            };
            debug!(compress = self.compress, "overriding compress from environment");
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.key_store_dir.trim().is_empty() {
            bail!("key_store_dir cannot be empty");
        }

        if self.iterations == 0 || self.iterations > MAX_ITERATIONS {
            bail!(
                "iterations must be between 1 and {}, got {}",
                MAX_ITERATIONS,
                self.iterations
            );
        }
        if self.iterations < WEAK_ITERATIONS {
            warn!(
                iterations = self.iterations,
                "iteration count is low - passphrase keys will be cheap to brute force"
            );
        }

        if self.registry().is_err() {
            bail!("unknown default suite {:?}", self.default_suite);
        }

        Ok(())
    }

    /// The standard suites with this config's iteration count and default.
    pub fn registry(&self) -> Result<CryptoRegistry> {
        let mut registry = CryptoRegistry::standard(self.iterations);
        let id = registry
            .by_name(&self.default_suite)
            .map(|suite| suite.id())
            .with_context(|| format!("no crypto suite named {:?}", self.default_suite))?;
        registry.set_default(id)?;
        Ok(registry)
    }

    /// Create a new config with an explicit key store directory
    pub fn new(key_store_dir: impl Into<String>) -> Self {
        Self {
            key_store_dir: key_store_dir.into(),
            ..Self::default()
        }
    }
}
