//! Per-capture failure taxonomy.

use std::path::PathBuf;

/// How a failed capture affects the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Remote or transient: log, report and wait for the next tick.
    Soft,
    /// Points at misconfiguration or a broken local environment.
    Hard,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("unsupported content type {0:?}")]
    UnsupportedFormat(String),

    #[error("cannot decode {format} image: {source}")]
    Decode {
        format: &'static str,
        #[source]
        source: image::ImageError,
    },

    #[error("cannot encode {format}: {reason}")]
    Encode { format: &'static str, reason: String },

    #[error("cannot write {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CaptureError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Network(_) | Self::Decode { .. } => Severity::Soft,
            Self::UnsupportedFormat(_) | Self::Encode { .. } | Self::Persist { .. } => {
                Severity::Hard
            }
        }
    }

    /// Short identifier reported as the `FailureKind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::Decode { .. } => "decode",
            Self::Encode { .. } => "encode",
            Self::Persist { .. } => "persist",
        }
    }
}
