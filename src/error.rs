use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("Failed to reach the timeline API: {0}")]
    NetworkError(reqwest::Error),
    #[error("Timeline API responded with {status}: {reason}")]
    HttpStatus { status: u16, reason: String },
    #[error("Failed to parse timeline response: {0}")]
    ParseError(serde_json::Error),
    #[error("Invalid date in timeline response: {0}")]
    InvalidDate(String),
    #[error("Timeline source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("Failed to read/write state file: {0}")]
    StateIOError(std::io::Error),
    #[error("Failed to serialize/deserialize state: {0}")]
    StateSerializationError(serde_json::Error),
}

impl GalleryError {
    /// Whether the failure happened while talking to the page source, as opposed to local state.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            GalleryError::NetworkError(_)
                | GalleryError::HttpStatus { .. }
                | GalleryError::ParseError(_)
                | GalleryError::InvalidDate(_)
                | GalleryError::SourceUnavailable(_)
        )
    }
}
