use thiserror::Error;

/// Errors returned by frame decoding.
///
/// Every variant carries the number of the frame that failed.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame {frame}: packet slice error: {message}")]
    Slice { frame: u64, message: String },
    #[error("frame {frame}: link header too short: need {needed} bytes, got {actual}")]
    LinkTooShort {
        frame: u64,
        needed: usize,
        actual: usize,
    },
}
