//! Resolution of the active [`CacheConfig`].
//!
//! Sources are consulted in order and the first one present wins:
//!
//! 1. an explicit path (the CLI `--config` flag)
//! 2. `IMGSTASH_CONFIG_PATH`
//! 3. `IMGSTASH_CONFIG_JSON`, an inline JSON document
//! 4. `imgstash.toml`, `imgstash.json`, `config/imgstash.toml`,
//!    `config/imgstash.json` relative to the working directory
//! 5. built-in defaults
//!
//! A `.env` file is read first so the variables above can live there.

pub mod error;

use std::{
    env, fmt,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::models::CacheConfig;
use error::ConfigLoadError;

pub const CONFIG_PATH_ENV: &str = "IMGSTASH_CONFIG_PATH";
pub const CONFIG_JSON_ENV: &str = "IMGSTASH_CONFIG_JSON";

const DEFAULT_CANDIDATES: &[&str] = &[
    "imgstash.toml",
    "imgstash.json",
    "config/imgstash.toml",
    "config/imgstash.json",
];

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Explicit(path) => {
                write!(f, "--config {}", path.display())
            }
            ConfigSource::EnvPath(path) => {
                write!(f, "{CONFIG_PATH_ENV}={}", path.display())
            }
            ConfigSource::EnvInline => f.write_str(CONFIG_JSON_ENV),
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Default => f.write_str("built-in defaults"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: CacheConfig,
    pub source: ConfigSource,
    pub env_file_loaded: bool,
}

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    explicit_path: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    read_env_file: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            explicit_path: None,
            base_dir: None,
            read_env_file: true,
        }
    }

    pub fn with_path(mut self, path: Option<PathBuf>) -> Self {
        self.explicit_path = path;
        self
    }

    /// Resolve the default candidate files against `dir` instead of the
    /// working directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn without_env_file(mut self) -> Self {
        self.read_env_file = false;
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = if self.read_env_file {
            load_env_file()?
        } else {
            false
        };

        let (config, source) = self.resolve()?;
        config.validate()?;

        info!("cache configuration loaded from {}", source);
        Ok(ConfigLoad {
            config,
            source,
            env_file_loaded,
        })
    }

    fn resolve(&self) -> Result<(CacheConfig, ConfigSource), ConfigLoadError> {
        if let Some(path) = &self.explicit_path {
            let config = read_file(path)?;
            return Ok((config, ConfigSource::Explicit(path.clone())));
        }

        if let Some(path) = non_empty_env(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            let config = read_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Some(raw) = non_empty_env(CONFIG_JSON_ENV) {
            let config = CacheConfig::parse_json(&raw)
                .map_err(ConfigLoadError::InlineJson)?;
            return Ok((config, ConfigSource::EnvInline));
        }

        for candidate in DEFAULT_CANDIDATES {
            let path = match &self.base_dir {
                Some(base) => base.join(candidate),
                None => PathBuf::from(candidate),
            };
            if path.is_file() {
                let config = read_file(&path)?;
                return Ok((config, ConfigSource::File(path)));
            }
        }

        debug!("no cache configuration found; using defaults");
        Ok((CacheConfig::default(), ConfigSource::Default))
    }
}

fn read_file(path: &Path) -> Result<CacheConfig, ConfigLoadError> {
    CacheConfig::load_from_file(path).map_err(|source| ConfigLoadError::File {
        path: path.to_path_buf(),
        source,
    })
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_env_file() -> Result<bool, ConfigLoadError> {
    match dotenvy::dotenv() {
        Ok(path) => {
            debug!("loaded environment from {}", path.display());
            Ok(true)
        }
        Err(err) if err.not_found() => Ok(false),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgstash_core::DedupPolicy;
    use std::fs;

    #[test]
    fn explicit_toml_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "dedup_policy = \"reject\"\nverify_on_hit = true\n")
            .unwrap();

        let load = ConfigLoader::new()
            .with_path(Some(path.clone()))
            .without_env_file()
            .load()
            .unwrap();

        assert_eq!(load.source, ConfigSource::Explicit(path));
        assert_eq!(load.config.dedup_policy, DedupPolicy::Reject);
        assert!(load.config.verify_on_hit);
        assert!(!load.env_file_loaded);
    }

    #[test]
    fn explicit_json_path_is_parsed_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        fs::write(&path, r#"{ "request_timeout": "5s" }"#).unwrap();

        let load = ConfigLoader::new()
            .with_path(Some(path))
            .without_env_file()
            .load()
            .unwrap();

        assert_eq!(
            load.config.request_timeout().unwrap(),
            std::time::Duration::from_secs(5)
        );
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigLoader::new()
            .with_path(Some(dir.path().join("absent.toml")))
            .without_env_file()
            .load()
            .unwrap_err();

        assert!(matches!(err, ConfigLoadError::File { .. }), "{err:?}");
    }

    #[test]
    fn invalid_values_fail_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "request_timeout = \"eventually\"\n").unwrap();

        let err = ConfigLoader::new()
            .with_path(Some(path))
            .without_env_file()
            .load()
            .unwrap_err();

        assert!(
            matches!(err, ConfigLoadError::InvalidTimeout { .. }),
            "{err:?}"
        );
    }

    #[test]
    fn source_display_names_the_origin() {
        assert_eq!(ConfigSource::Default.to_string(), "built-in defaults");
        assert_eq!(ConfigSource::EnvInline.to_string(), CONFIG_JSON_ENV);
        assert_eq!(
            ConfigSource::EnvPath(PathBuf::from("/etc/imgstash.toml"))
                .to_string(),
            "IMGSTASH_CONFIG_PATH=/etc/imgstash.toml"
        );
    }
}
