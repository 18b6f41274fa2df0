use thiserror::Error;

/// Device-level failures surfaced by sensor implementations.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("timed out waiting for device frame")]
    Timeout,
    #[error("device stream ended")]
    Disconnected,
    #[error("malformed device frame: {0}")]
    Frame(String),
    #[error("device io error: {0}")]
    Io(#[from] std::io::Error),
}
