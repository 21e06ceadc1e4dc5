//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to initialize cache root at {path}: {message}")]
    CacheInit { path: String, message: String },

    #[error("Not a cache entry name: {segment}")]
    Decode { segment: String },

    #[error("Archive entry escapes extraction directory: {entry}")]
    PathEscape { entry: String },

    #[error("Decompressed archive exceeds size limit of {limit} bytes")]
    SizeLimit { limit: u64 },

    #[error("Archive error: {message}")]
    Archive { message: String },

    #[error("Chart not found: {path}")]
    ChartNotFound { path: String },

    #[error("Invalid chart metadata: {message}")]
    InvalidChart { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
