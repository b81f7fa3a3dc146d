use thiserror::Error;

use super::BoxFuture;
use crate::error::DomainError;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("store unreachable: {0}")]
    Unreachable(String),
    #[error("store query failed: {0}")]
    Query(String),
}

impl From<DbError> for DomainError {
    fn from(err: DbError) -> Self {
        DomainError::Storage(err.to_string())
    }
}

/// Liveness check for whichever store backs the listings.
pub trait DbAdapter: Send + Sync {
    fn backend(&self) -> &'static str;
    fn health_check(&self) -> BoxFuture<'_, Result<(), DbError>>;
}
