use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to load cache configuration from {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to parse IMGSTASH_CONFIG_JSON: {0}")]
    InlineJson(#[source] anyhow::Error),
    #[error("invalid request timeout '{value}'")]
    InvalidTimeout {
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("invalid fallback suffix '{suffix}' (expected ASCII letters and digits)")]
    InvalidFallbackSuffix { suffix: String },
    #[error("failed to create directory {path}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}
