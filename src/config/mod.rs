//! Configuration loading.
//!
//! Search order: explicit `--config` path → `~/.vless-convert/config.toml` →
//! built-in defaults. An explicit path that does not exist is an error; a
//! missing default file is not.

pub mod schema;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;

pub use schema::{ClientIdentity, Config, FetchConfig};

impl Config {
    /// Load and validate configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.is_file() {
                    bail!("config file not found: {}", path.display());
                }
                Some(path.to_path_buf())
            }
            None => Self::default_path().filter(|p| p.is_file()),
        };

        let config = match path {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("no config file found, using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file without validating it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse {} as TOML", path.display()))?;
        debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Default config path: `~/.vless-convert/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::BaseDirs::new()
            .map(|d| d.home_dir().join(".vless-convert").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[fetch]\ntimeout_secs = 2\nurl_suffixes = []\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.fetch.timeout_secs, 2);
        assert!(config.fetch.url_suffixes.is_empty());
    }

    #[test]
    fn load_missing_explicit_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn load_invalid_toml_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[fetch\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[fetch]\nidentities = []\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn default_path_ends_with_config_toml() {
        if let Some(path) = Config::default_path() {
            assert!(path.ends_with(".vless-convert/config.toml"));
        }
    }
}
