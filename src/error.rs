use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unable to serialize: {0}")]
    BincodeSerialization(#[from] bincode::Error),

    #[error("Invalid replication config: {0}")]
    InvalidConfig(String),

    #[error("Follower {endpoint} unreachable: {reason}")]
    FollowerUnreachable { endpoint: String, reason: String },

    #[error("Follower {endpoint} did not answer within {timeout:?}")]
    FollowerTimeout { endpoint: String, timeout: Duration },

    #[error("Frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: u64, limit: u64 },

    #[error("Unexpected response from {peer}: {response}")]
    UnexpectedResponse { peer: String, response: String },

    #[error("Unable to setup tracing: {0}")]
    TracingError(#[from] tracing::subscriber::SetGlobalDefaultError),
}
