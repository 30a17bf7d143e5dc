// GNU AGPL v3 License

use std::{io, path::PathBuf};
use thiserror::Error;

/// Failures of a single remix run.
#[derive(Debug, Error)]
pub(crate) enum RemixError {
    #[error("no silent frames found (peak threshold {threshold}); try a higher threshold")]
    InsufficientSilence { threshold: f64 },

    #[error("silence produced {boundaries} cut point(s), at least 2 are needed")]
    DegenerateSegmentation { boundaries: usize },

    #[error("only the first and last segments exist, there is nothing to shuffle")]
    NoInteriorSegments,

    #[error("gave up after {attempts} draws without finding a segment outside the last {window} picks")]
    SelectionRetryExhausted { attempts: usize, window: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("`melt` not found in PATH")]
    MeltNotFound,

    #[error(
        "melt failed to render {}{}",
        .path.display(),
        .stderr.as_deref().map(|s| format!(":\n{}", s)).unwrap_or_default()
    )]
    RenderFailed {
        path: PathBuf,
        stderr: Option<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RemixError {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}
