use thiserror::Error;

use crate::{remote::RemoteError, staging::StagingError};

#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Staging store error: {0}")]
    Staging(#[from] StagingError),

    #[error("No storage account named '{0}' is configured")]
    UnknownAccount(String),

    #[error("Staging still holds rows but a drain removed none")]
    DrainStalled,
}

pub type PurgeResult<T> = Result<T, PurgeError>;
