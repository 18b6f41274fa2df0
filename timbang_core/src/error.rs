use thiserror::Error;

/// Errors raised while acquiring or capturing a live reading.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AcquireError {
    #[error("no subject selected")]
    NoSubjectSelected,
    #[error("device is not streaming")]
    NotConnected,
    #[error("reading has not stabilized")]
    NotStable,
    #[error("a capture is already pending")]
    CaptureInProgress,
    #[error("connection lost")]
    ConnectionLost,
    #[error("device error: {0}")]
    Device(String),
    #[error("invalid state: {0}")]
    State(&'static str),
}

/// Errors raised while committing a captured reading as a durable record.
///
/// `InvalidMeasurement` is the 400-class rejection; the *NotFound variants
/// are the 404-class ones. Only `Storage` is non-recoverable locally and is
/// surfaced to the operator verbatim.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("invalid measurement: {0}")]
    InvalidMeasurement(&'static str),
    #[error("subject {0} not found or inactive")]
    SubjectNotFound(i64),
    #[error("operator {0} not found or inactive")]
    OperatorNotFound(i64),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
