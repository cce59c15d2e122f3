use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use url::Url;

use crate::error::{CacheError, Result};

/// Controls which parts of a URL participate in key derivation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct KeyOptions {
    /// Include the query string, so `?w=185` and `?w=500` cache separately.
    pub include_query: bool,
}

/// Stable key for locating a cached resource.
///
/// Always a 40 character lowercase hex SHA-1 of the canonical address.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for an already parsed URL.
    pub fn for_url(url: &Url, options: KeyOptions) -> Self {
        Self::from_canonical(&canonical_address(url, options))
    }

    /// Parse `uri` and derive its key.
    pub fn from_uri(uri: &str, options: KeyOptions) -> Result<Self> {
        let url = Url::parse(uri).map_err(|err| CacheError::InvalidUri {
            uri: uri.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self::for_url(&url, options))
    }

    pub fn from_canonical(canonical: &str) -> Self {
        let digest = Sha1::digest(canonical.as_bytes());
        Self(hex::encode(digest))
    }

    pub fn is_valid(key: &str) -> bool {
        key.len() == 40
            && key
                .as_bytes()
                .iter()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheKey").field(&self.0).finish()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The part of a URL that identifies the resource: its path, plus the query
/// when `options.include_query` is set. Scheme, host and fragment never
/// participate.
pub fn canonical_address(url: &Url, options: KeyOptions) -> String {
    match url.query() {
        Some(query) if options.include_query => {
            format!("{}?{}", url.path(), query)
        }
        _ => url.path().to_string(),
    }
}
