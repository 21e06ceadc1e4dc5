//! Reversible cache key encoding
//!
//! The cache deliberately keeps no in-memory index: charthaul runs as a
//! short-lived process once per build, so any map held in memory would be
//! gone on the next invocation. Instead, each cache entry's *filename* is a
//! reversible encoding of its key, making the filesystem itself the index.
//! A second process with the same cache root recovers every key by listing
//! the directory.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Identity of a cached artifact
///
/// Field order is part of the encoding: two keys are equal iff all four
/// fields are equal, and equal keys always encode to the same segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Chart name
    pub chart: String,

    /// Project the fetch was made for (disambiguates per-project overrides)
    pub project: String,

    /// Repository source URL
    pub url: String,

    /// Chart version
    pub version: String,
}

impl CacheKey {
    pub fn new(
        chart: impl Into<String>,
        project: impl Into<String>,
        url: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            chart: chart.into(),
            project: project.into(),
            url: url.into(),
            version: version.into(),
        }
    }

    /// Encode this key as a single filesystem-safe path segment
    ///
    /// The segment uses the URL-safe base64 alphabet, so it can never
    /// contain a path separator or `.` sequences.
    pub fn encode(&self) -> String {
        // Serialization of a plain struct is deterministic: fields are
        // emitted in declaration order.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a path segment produced by [`CacheKey::encode`]
    ///
    /// Fails with [`CoreError::Decode`] for segments this codec did not
    /// produce, e.g. a foreign file found during a cache scan.
    pub fn decode(segment: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|_| CoreError::Decode {
                segment: segment.to_string(),
            })?;
        serde_json::from_slice(&bytes).map_err(|_| CoreError::Decode {
            segment: segment.to_string(),
        })
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{} ({})", self.chart, self.version, self.url)
    }
}
