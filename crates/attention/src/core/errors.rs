//! Error types emitted by the variational attention unit.

use super::config::DistKind;

/// Attention-specific error category.
#[derive(Debug)]
pub enum AttentionError {
    /// Query, memory, lengths, or distribution parameters disagree on a
    /// dimension. Signals a caller bug.
    ShapeMismatch { context: String },
    /// The distribution kind cannot be used where it was requested.
    UnsupportedDistribution {
        kind: DistKind,
        context: &'static str,
    },
    /// The requested calling mode is disabled.
    UnsupportedMode { context: String },
    /// Distribution parameters or configuration values are out of range.
    InvalidParameters { context: String },
    /// The kernel does not support the requested data type.
    UnsupportedDType { requested: String },
    /// A backend-specific failure propagated to the caller.
    Backend { message: String },
    /// Configuration files could not be read or parsed.
    Config { message: String },
}

impl AttentionError {
    pub(crate) fn shape(context: impl Into<String>) -> Self {
        AttentionError::ShapeMismatch {
            context: context.into(),
        }
    }

    pub(crate) fn invalid(context: impl Into<String>) -> Self {
        AttentionError::InvalidParameters {
            context: context.into(),
        }
    }
}

impl std::fmt::Display for AttentionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttentionError::ShapeMismatch { context } => {
                write!(f, "size mismatch: {context}")
            }
            AttentionError::UnsupportedDistribution { kind, context } => {
                write!(f, "unsupported distribution '{kind}': {context}")
            }
            AttentionError::UnsupportedMode { context } => {
                write!(f, "unsupported mode: {context}")
            }
            AttentionError::InvalidParameters { context } => {
                write!(f, "invalid parameters: {context}")
            }
            AttentionError::UnsupportedDType { requested } => {
                write!(f, "unsupported dtype {requested}")
            }
            AttentionError::Backend { message } => f.write_str(message),
            AttentionError::Config { message } => write!(f, "configuration error: {message}"),
        }
    }
}

impl std::error::Error for AttentionError {}

impl From<candle_core::Error> for AttentionError {
    fn from(err: candle_core::Error) -> Self {
        AttentionError::Backend {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AttentionError {
    fn from(err: std::io::Error) -> Self {
        AttentionError::Config {
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for AttentionError {
    fn from(err: toml::de::Error) -> Self {
        AttentionError::Config {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AttentionError {
    fn from(err: serde_json::Error) -> Self {
        AttentionError::Config {
            message: err.to_string(),
        }
    }
}
