use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no stored file at {0}")]
    NotFound(String),

    /// Publishing refused to replace a file already stored under the key.
    #[error("a file is already stored at {0}")]
    AlreadyExists(String),

    #[error("rejected storage key: {0}")]
    InvalidKey(String),

    #[error("storage misconfigured: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
