//! Keyset pagination shared by every forum listing.
//!
//! A listing is ordered by a [`SortKeyTuple`] whose last key is the unique row
//! id. Pages are fetched by seeking strictly past the last row of the previous
//! page, and the position is handed to clients as an opaque cursor token.

pub mod cursor;
pub mod merge;
pub mod page;
pub mod seek;
pub mod sort_key;

use thiserror::Error;

pub use cursor::CursorError;
pub use merge::{FeedMember, FeedSource, merge_sources};
pub use page::{KeysetExecutor, KeysetQuery, Page, PageRequest, fetch, validate_page_size};
pub use seek::{SeekPredicate, SeekSql, SeekStatement, SqlParams, build_sql};
pub use sort_key::{
    FieldValue, FieldValues, ListingKind, NullPolicy, SortDirection, SortField, SortKey,
    SortKeyTuple, SortKeyed, SortMode, ValueType, tuple_for, tuple_for_name,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaginationError {
    #[error("page size must be a positive integer, got {0}")]
    InvalidPageSize(i64),
    #[error(transparent)]
    InvalidCursor(#[from] CursorError),
    #[error("sort mode '{mode}' is not supported for {kind} listings")]
    UnsupportedSortMode { kind: ListingKind, mode: String },
    #[error("row is missing required sort field '{}'", .0.column())]
    MissingSortValue(SortField),
    #[error("row produced a sort value of the wrong type for '{}'", .0.column())]
    InvalidSortValue(SortField),
}
