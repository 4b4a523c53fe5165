// src/error.rs
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// The sensor client refused an operation
    #[error("Sensor error: {0}")]
    Sensor(String),
}
