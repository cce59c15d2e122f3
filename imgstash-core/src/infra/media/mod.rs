//! Image fetching and the cache store built on top of it.

pub mod cache_store;
pub mod image_fetcher;

pub use cache_store::*;
pub use image_fetcher::*;
