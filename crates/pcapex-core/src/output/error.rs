use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no such file or directory: '{}'", .0.display())]
    InputNotFound(PathBuf),
    #[error("output format unspecified")]
    FormatUnspecified,
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
    #[error("output already finished")]
    Finished,
}
