//! Error types for tandem-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning wire records into domain values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A record from an adapter does not have the expected shape.
    #[error("schema violation in {record} '{key}': {reason}")]
    Schema {
        record: &'static str,
        key: String,
        reason: String,
    },

    /// A bookkeeping field holds a value that cannot be parsed.
    #[error("malformed extension field {field}: {reason} (raw: {raw:?})")]
    Extension {
        field: &'static str,
        raw: String,
        reason: String,
    },

    /// An attachment envelope did not carry valid base64 content.
    #[error("invalid attachment payload for '{attachment}': {reason}")]
    Payload { attachment: String, reason: String },
}

/// All errors that can arise while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the path being read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`; cannot locate `~/.tandem/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// A setting is missing or out of range.
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
