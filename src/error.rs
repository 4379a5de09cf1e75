use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Unknown report field: {0}")]
    UnknownField(String),

    #[error("Structured extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Message delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Session persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("Report rendering failed: {0}")]
    RenderFailed(String),

    #[error("Missing required credential: {0}")]
    MissingCredentials(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;
