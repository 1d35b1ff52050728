use thiserror::Error;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to prepare staging directory {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Invalid staging table name: {0:?}")]
    InvalidTableName(String),
}

pub type StagingResult<T> = Result<T, StagingError>;
