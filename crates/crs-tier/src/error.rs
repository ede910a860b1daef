use crs_types::ContentDigest;
use thiserror::Error;

/// Errors from the reference table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    /// Insert raced with another insert of the same digest.
    #[error("reference already exists: {0}")]
    AlreadyExists(ContentDigest),

    #[error("reference not found: {0}")]
    NotFound(ContentDigest),
}

pub type TableResult<T> = Result<T, TableError>;
