use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputWatchError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("several devices map to the same input path: {0}")]
    DuplicateDevicePath(PathBuf),
    #[error("truncated input event: expected {expected} bytes, got {actual}")]
    TruncatedEvent { expected: usize, actual: usize },
    #[error("monitoring requires a running tokio runtime")]
    NoRuntime,
}
