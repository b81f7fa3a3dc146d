pub mod error;
pub mod forum;
pub mod identity;
pub mod listing;
pub mod pagination;
pub mod ports;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
