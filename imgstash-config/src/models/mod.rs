use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, anyhow};
use directories::ProjectDirs;
use imgstash_core::{DedupPolicy, KeyOptions, StoreSettings};
use serde::{Deserialize, Serialize};

use crate::loader::error::ConfigLoadError;

fn default_cache_dir() -> PathBuf {
    ProjectDirs::from("", "imgstash", "imgstash")
        .map(|dirs| dirs.cache_dir().join("images"))
        .unwrap_or_else(|| PathBuf::from("imgstash-cache"))
}

fn default_request_timeout() -> String {
    "30s".to_string()
}

/// Cache settings. Every field has a default, so an empty file is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the cached files, named `<key>.<suffix>`.
    pub cache_dir: PathBuf,
    /// Directory for the persistent key -> path index. Defaults to
    /// `<cache_dir>/index`.
    pub index_dir: Option<PathBuf>,
    /// Whether `?w=185` and `?w=500` are different resources. Off by default:
    /// only the URL path identifies a resource.
    pub include_query_in_key: bool,
    /// `join` hands a duplicate request the in-flight result; `reject` fails
    /// it with "already in progress".
    pub dedup_policy: DedupPolicy,
    /// Suffix to use when a response has no usable `Content-Type`. Unset
    /// means such responses fail the fetch.
    pub fallback_suffix: Option<String>,
    /// Stat the cached file on every hit and refetch it if it disappeared.
    pub verify_on_hit: bool,
    /// Per-request timeout in humantime form, e.g. `30s` or `2m`.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
    pub user_agent: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            index_dir: None,
            include_query_in_key: false,
            dedup_policy: DedupPolicy::Join,
            fallback_suffix: None,
            verify_on_hit: false,
            request_timeout: default_request_timeout(),
            user_agent: None,
        }
    }
}

impl CacheConfig {
    pub fn index_dir(&self) -> PathBuf {
        self.index_dir
            .clone()
            .unwrap_or_else(|| self.cache_dir.join("index"))
    }

    pub fn request_timeout(&self) -> Result<Duration, ConfigLoadError> {
        humantime::parse_duration(self.request_timeout.trim()).map_err(
            |source| ConfigLoadError::InvalidTimeout {
                value: self.request_timeout.clone(),
                source,
            },
        )
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        self.request_timeout()?;

        if let Some(suffix) = &self.fallback_suffix
            && (suffix.is_empty()
                || !suffix.chars().all(|c| c.is_ascii_alphanumeric()))
        {
            return Err(ConfigLoadError::InvalidFallbackSuffix {
                suffix: suffix.clone(),
            });
        }
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<(), ConfigLoadError> {
        for dir in [self.cache_dir.clone(), self.index_dir()] {
            fs::create_dir_all(&dir).map_err(|source| {
                ConfigLoadError::Filesystem { path: dir, source }
            })?;
        }
        Ok(())
    }

    pub fn to_store_settings(&self) -> Result<StoreSettings, ConfigLoadError> {
        self.validate()?;

        let mut settings = StoreSettings::new(self.cache_dir.clone());
        settings.index_dir = self.index_dir();
        settings.key_options = KeyOptions {
            include_query: self.include_query_in_key,
        };
        settings.dedup_policy = self.dedup_policy;
        settings.fallback_suffix = self.fallback_suffix.clone();
        settings.verify_on_hit = self.verify_on_hit;
        settings.request_timeout = self.request_timeout()?;
        if let Some(user_agent) = &self.user_agent {
            settings.user_agent = user_agent.clone();
        }
        Ok(settings)
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read cache config from {}", path.display())
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents).with_context(|| {
                format!("invalid cache config {}", path.display())
            }),
            Some("toml") | Some("tml") => {
                toml::from_str(&contents).map_err(|err| {
                    anyhow!("invalid cache config {}: {}", path.display(), err)
                })
            }
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    pub fn parse_from_str(
        contents: &str,
        origin: &str,
    ) -> anyhow::Result<Self> {
        // Try TOML first, then JSON for convenience.
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse cache config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| anyhow!("invalid cache config json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_all_defaults() {
        let config = CacheConfig::parse_from_str("", "test").unwrap();
        assert_eq!(config, CacheConfig::default());
        assert_eq!(config.dedup_policy, DedupPolicy::Join);
        assert_eq!(config.request_timeout().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn toml_overrides_map_onto_store_settings() {
        let raw = r#"
            cache_dir = "/var/cache/imgstash"
            include_query_in_key = true
            dedup_policy = "reject"
            fallback_suffix = "bin"
            request_timeout = "2m"
            user_agent = "poster-wall/1.0"
        "#;
        let config = CacheConfig::parse_from_str(raw, "inline").unwrap();
        let settings = config.to_store_settings().unwrap();

        assert_eq!(settings.cache_dir, PathBuf::from("/var/cache/imgstash"));
        assert_eq!(
            settings.index_dir,
            PathBuf::from("/var/cache/imgstash/index")
        );
        assert!(settings.key_options.include_query);
        assert_eq!(settings.dedup_policy, DedupPolicy::Reject);
        assert_eq!(settings.fallback_suffix.as_deref(), Some("bin"));
        assert_eq!(settings.request_timeout, Duration::from_secs(120));
        assert_eq!(settings.user_agent, "poster-wall/1.0");
    }

    #[test]
    fn json_is_accepted_when_toml_fails() {
        let raw = r#"{ "verify_on_hit": true, "index_dir": "/tmp/idx" }"#;
        let config = CacheConfig::parse_from_str(raw, "inline").unwrap();
        assert!(config.verify_on_hit);
        assert_eq!(config.index_dir(), PathBuf::from("/tmp/idx"));
    }

    #[test]
    fn bad_values_fail_validation() {
        let config = CacheConfig {
            request_timeout: "soon".into(),
            ..CacheConfig::default()
        };
        assert!(matches!(
            config.to_store_settings(),
            Err(ConfigLoadError::InvalidTimeout { .. })
        ));

        let config = CacheConfig {
            fallback_suffix: Some("../x".into()),
            ..CacheConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigLoadError::InvalidFallbackSuffix { .. })
        ));
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let err = CacheConfig::parse_from_str(
            "dedup_policy = \"maybe\"",
            "inline",
        )
        .unwrap_err();
        assert!(err.to_string().contains("failed to parse cache config"));
    }
}
