use thiserror::Error;

/// Main error type for LoRaWAN AT driver operations
#[derive(Error, Debug)]
pub enum LoraError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timeout")]
    Timeout,

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for LoRaWAN AT driver operations
pub type LoraResult<T> = Result<T, LoraError>;
