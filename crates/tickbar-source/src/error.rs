//! Source error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid source configuration: {0}")]
    InvalidConfig(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SourceResult<T> = Result<T, SourceError>;
