use thiserror::Error;

use crate::pagination::PaginationError;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("conflict")]
    Conflict,
    #[error(transparent)]
    Pagination(#[from] PaginationError),
    #[error("storage failure: {0}")]
    Storage(String),
}
