use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Malformed image reference: {0:?}")]
    MalformedImageReference(String),

    #[error("Malformed Helm release entry: {0:?}")]
    MalformedReleaseEntry(String),

    #[error("Cluster command failed: {0}")]
    Collaborator(String),

    #[error("Failed to delete {image}: {reason}")]
    Deletion { image: String, reason: String },

    #[error("Invalid tag pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Date parse error: {0}")]
    DateParse(#[from] chrono::ParseError),
}
