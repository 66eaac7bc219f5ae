use std::path::PathBuf;

use thiserror::Error;

use crate::frame::DecodeError;
use crate::output::OutputError;
use crate::source::SourceError;

/// Errors returned by an [`Extractor`](super::Extractor).
///
/// End of capture is not an error; reads report it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("capture source error: {0}")]
    Source(#[from] SourceError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("output error: {0}")]
    Output(OutputError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("extractor is closed")]
    Closed,
    #[error("frames are not stored (store disabled)")]
    FramesNotStored,
    #[error("flow tracing is disabled")]
    TraceDisabled,
    #[error("no such file or directory: '{}'", .0.display())]
    InputNotFound(PathBuf),
    #[error("output format unspecified")]
    FormatUnspecified,
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
}

impl From<OutputError> for ExtractError {
    fn from(value: OutputError) -> Self {
        match value {
            OutputError::InputNotFound(path) => ExtractError::InputNotFound(path),
            OutputError::FormatUnspecified => ExtractError::FormatUnspecified,
            OutputError::UnsupportedFormat(name) => ExtractError::UnsupportedFormat(name),
            other => ExtractError::Output(other),
        }
    }
}

impl From<serde_json::Error> for ExtractError {
    fn from(value: serde_json::Error) -> Self {
        ExtractError::Output(OutputError::Json(value))
    }
}
