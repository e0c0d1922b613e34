use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("Invalid metric type: {0}")]
    InvalidMetric(String),
    #[error("Invalid data type: {0}")]
    InvalidDataType(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
