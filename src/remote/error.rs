use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote store returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response from remote store: {0}")]
    InvalidResponse(String),

    #[error("Invalid account credential: {0}")]
    InvalidCredential(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl RemoteError {
    /// Create a status error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;
