use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Preview worker error: {0}")]
    Worker(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Metadata extraction failed: {0}")]
    Metadata(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// HTTP-style status code for callers exposing the scan service over a
    /// request/response boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            ScanError::Validation(_) => 400,
            ScanError::NotFound(_) => 404,
            ScanError::Conflict(_) => 409,
            _ => 500,
        }
    }
}

impl From<tokio::task::JoinError> for ScanError {
    fn from(err: tokio::task::JoinError) -> Self {
        ScanError::Internal(format!("blocking task failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
