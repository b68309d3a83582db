use thiserror::Error;

use crate::domain::CounterId;
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid input: {0}")]
    Validation(&'static str),

    #[error("counter name already taken: {0}")]
    DuplicateName(String),

    #[error("counter not found: {0}")]
    NotFound(CounterId),

    #[error("counter already deleted: {0}")]
    AlreadyDeleted(CounterId),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}
