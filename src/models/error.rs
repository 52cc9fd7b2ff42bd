use std::path::PathBuf;
use thiserror::Error;

use super::job::FrameStatus;

#[derive(Error, Debug)]
pub enum FarmError {
    #[error("No master server on network")]
    NoMasterFound,

    #[error("Incorrect master version (expected {expected}, received {received})")]
    VersionMismatch { expected: String, received: String },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Frame {frame} not part of job {job_id}")]
    FrameNotFound { job_id: String, frame: i32 },

    #[error("File index {index} not part of job {job_id}")]
    FileNotFound { job_id: String, index: usize },

    #[error("Hash mismatch for {} (expected {expected}, actual {actual})", path.display())]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Frame {frame} of job {job_id} cannot move from {from} to {to}")]
    InvalidFrameTransition {
        job_id: String,
        frame: i32,
        from: FrameStatus,
        to: FrameStatus,
    },

    #[error("Result for job {0} is not ready")]
    ResultNotReady(String),

    #[error("Archive error: {0}")]
    Archive(String),
}

// ureq wraps everything transport level (refused, unreachable, timed out)
// under one error type; all of it is retryable with backoff on our side.
impl From<ureq::Error> for FarmError {
    fn from(err: ureq::Error) -> Self {
        FarmError::Connection(err.to_string())
    }
}

impl From<zip::result::ZipError> for FarmError {
    fn from(err: zip::result::ZipError) -> Self {
        FarmError::Archive(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FarmError>;
