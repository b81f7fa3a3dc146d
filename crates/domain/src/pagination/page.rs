use serde::{Deserialize, Serialize};
use tracing::debug;

use super::PaginationError;
use super::cursor;
use super::seek::SeekPredicate;
use super::sort_key::{ListingKind, SortKeyTuple, SortKeyed, SortMode, tuple_for};
use crate::DomainResult;
use crate::error::DomainError;
use crate::ports::BoxFuture;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest<'a> {
    pub kind: ListingKind,
    pub mode: SortMode,
    pub cursor: Option<&'a str>,
    pub page_size: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}

/// What an executor is asked to run: rows matching `filters` that the seek
/// predicate admits, ordered by the predicate's tuple, at most `limit` of them.
#[derive(Clone, Debug)]
pub struct KeysetQuery<F> {
    pub predicate: SeekPredicate,
    pub filters: F,
    pub limit: usize,
}

impl<F> KeysetQuery<F> {
    pub fn tuple(&self) -> &SortKeyTuple {
        self.predicate.tuple()
    }
}

/// Runs a keyset query against a row source.
///
/// Implementations apply `filters` as-is; the engine never inspects them.
pub trait KeysetExecutor<R, F>: Send + Sync {
    fn run<'a>(&'a self, query: &'a KeysetQuery<F>) -> BoxFuture<'a, DomainResult<Vec<R>>>;
}

pub fn validate_page_size(page_size: i64) -> Result<usize, PaginationError> {
    if page_size <= 0 {
        return Err(PaginationError::InvalidPageSize(page_size));
    }
    usize::try_from(page_size).map_err(|_| PaginationError::InvalidPageSize(page_size))
}

/// Fetches one page, over-fetching a single row to learn whether more exist.
///
/// A cursor that fails to decode for the requested listing is reported before
/// the executor is called.
pub async fn fetch<R, F, E>(
    executor: &E,
    request: PageRequest<'_>,
    filters: F,
) -> DomainResult<Page<R>>
where
    R: SortKeyed,
    E: KeysetExecutor<R, F> + ?Sized,
{
    let page_size = validate_page_size(request.page_size)?;
    let tuple = tuple_for(request.kind, request.mode)?;
    let boundary = request
        .cursor
        .map(|token| cursor::decode(token, &tuple))
        .transpose()
        .map_err(PaginationError::from)?;
    let predicate = SeekPredicate::build(tuple, boundary).map_err(PaginationError::from)?;
    let first_page = predicate.is_first_page();

    let query = KeysetQuery {
        predicate,
        filters,
        limit: page_size.saturating_add(1),
    };
    let mut rows = executor.run(&query).await?;

    let has_more = rows.len() > page_size;
    rows.truncate(page_size);

    let next_cursor = match rows.last() {
        Some(last) if has_more => {
            let values = tuple.values_of(last)?;
            let token = cursor::encode(&tuple, &values).map_err(|err| {
                DomainError::Storage(format!("row sort values could not be encoded: {err}"))
            })?;
            Some(token)
        }
        _ => None,
    };

    debug!(
        listing = %request.kind,
        sort_mode = %request.mode,
        page_size,
        first_page,
        returned = rows.len(),
        has_more,
        "listing page assembled"
    );

    Ok(Page {
        items: rows,
        next_cursor,
    })
}
