//! Configuration for imgstash: the [`CacheConfig`] model and the
//! [`ConfigLoader`] that finds it on disk or in the environment.

pub mod loader;
pub mod models;

pub use loader::{
    CONFIG_JSON_ENV, CONFIG_PATH_ENV, ConfigLoad, ConfigLoader, ConfigSource,
    error::ConfigLoadError,
};
pub use models::CacheConfig;
