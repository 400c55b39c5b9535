use thiserror::Error;

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Command error: {0}")]
    CommandError(String),

    #[error("Chart error: {0}")]
    ChartError(String),

    #[error("invalid month '{0}': expected YYYY-MM")]
    InvalidMonth(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PulseError>;
