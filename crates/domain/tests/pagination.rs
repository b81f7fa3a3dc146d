use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use agora_domain::DomainResult;
use agora_domain::error::DomainError;
use agora_domain::forum::PostListing;
use agora_domain::pagination::cursor;
use agora_domain::pagination::{
    FieldValue, FieldValues, KeysetExecutor, KeysetQuery, ListingKind, Page, PageRequest,
    PaginationError, SortMode, fetch, merge_sources, tuple_for,
};
use agora_domain::ports::BoxFuture;
use proptest::prelude::*;

/// Executes keyset queries over a fixed row set the way a store would:
/// seek, sort by the tuple, then limit.
struct VecExecutor {
    rows: Vec<PostListing>,
    calls: AtomicUsize,
}

impl VecExecutor {
    fn new(rows: Vec<PostListing>) -> Self {
        Self {
            rows,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<F: Sync> KeysetExecutor<PostListing, F> for VecExecutor {
    fn run<'a>(
        &'a self,
        query: &'a KeysetQuery<F>,
    ) -> BoxFuture<'a, DomainResult<Vec<PostListing>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let tuple = *query.tuple();
            let mut keyed = Vec::new();
            for row in &self.rows {
                let values = tuple.values_of(row)?;
                if query.predicate.admits(&values) {
                    keyed.push((values, row.clone()));
                }
            }
            keyed.sort_by(|(left, _), (right, _)| tuple.compare(left, right));
            Ok(keyed
                .into_iter()
                .take(query.limit)
                .map(|(_, row)| row)
                .collect())
        })
    }
}

fn post(id: i64, score: Option<i64>, comments: Option<i64>, created: i64) -> PostListing {
    PostListing {
        post_id: id,
        topic_id: 1,
        topic_name: "general".into(),
        author_id: "author".into(),
        title: format!("post {id}"),
        content: String::new(),
        created_at_ms: created,
        score,
        comment_count: comments,
        upvotes: 0,
        downvotes: 0,
        viewer_vote: 0,
        is_bookmarked: false,
        is_following: false,
    }
}

fn titled(id: i64, title: &str, created: i64) -> PostListing {
    PostListing {
        title: title.into(),
        ..post(id, None, None, created)
    }
}

fn ids(page: &Page<PostListing>) -> Vec<i64> {
    page.items.iter().map(|row| row.post_id).collect()
}

fn request(kind: ListingKind, mode: SortMode, cursor: Option<&str>, size: i64) -> PageRequest<'_> {
    PageRequest {
        kind,
        mode,
        cursor,
        page_size: size,
    }
}

async fn walk(
    executor: &VecExecutor,
    kind: ListingKind,
    mode: SortMode,
    size: i64,
) -> Vec<Vec<i64>> {
    let mut pages = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = fetch(executor, request(kind, mode, cursor.as_deref(), size), ())
            .await
            .unwrap();
        pages.push(ids(&page));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return pages,
        }
        assert!(pages.len() <= executor.rows.len() + 1, "pagination did not terminate");
    }
}

#[tokio::test]
async fn hot_listing_pages_through_ties_in_order() {
    let executor = VecExecutor::new(vec![
        post(5, Some(10), Some(2), 5),
        post(4, Some(10), Some(2), 4),
        post(3, Some(7), Some(0), 3),
        post(2, Some(7), Some(0), 3),
        post(1, Some(5), Some(1), 1),
    ]);
    let pages = walk(&executor, ListingKind::Posts, SortMode::Hot, 2).await;
    assert_eq!(pages, vec![vec![5, 4], vec![3, 2], vec![1]]);
}

#[tokio::test]
async fn cursor_from_another_sort_mode_fails_without_querying() {
    let executor = VecExecutor::new(vec![post(1, Some(1), Some(0), 1), post(2, None, None, 2)]);
    let first = fetch(
        &executor,
        request(ListingKind::Posts, SortMode::New, None, 1),
        (),
    )
    .await
    .unwrap();
    let token = first.next_cursor.expect("more rows");
    let calls_before = executor.calls();

    let err = fetch(
        &executor,
        request(ListingKind::Posts, SortMode::Hot, Some(&token), 1),
        (),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        DomainError::Pagination(PaginationError::InvalidCursor(
            cursor::CursorError::SchemaMismatch(_)
        ))
    ));
    assert_eq!(executor.calls(), calls_before);
}

#[tokio::test]
async fn cursor_from_another_listing_kind_is_rejected() {
    let executor = VecExecutor::new(vec![post(1, None, None, 1), post(2, None, None, 2)]);
    let first = fetch(
        &executor,
        request(ListingKind::Topics, SortMode::Hot, None, 1),
        (),
    )
    .await
    .unwrap();
    let token = first.next_cursor.expect("more rows");
    let err = fetch(
        &executor,
        request(ListingKind::Posts, SortMode::Hot, Some(&token), 1),
        (),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        DomainError::Pagination(PaginationError::InvalidCursor(_))
    ));
}

#[tokio::test]
async fn absent_aggregates_sort_exactly_like_zero() {
    let executor = VecExecutor::new(vec![
        post(1, None, None, 10),
        post(2, Some(0), Some(0), 10),
        post(3, Some(1), None, 1),
        post(4, Some(-1), Some(0), 20),
    ]);
    let pages = walk(&executor, ListingKind::Posts, SortMode::Hot, 1).await;
    let flat: Vec<i64> = pages.into_iter().flatten().collect();
    assert_eq!(flat, vec![3, 2, 1, 4]);
}

#[tokio::test]
async fn boundary_past_the_last_row_returns_an_empty_page() {
    let executor = VecExecutor::new(vec![post(1, Some(3), Some(0), 1)]);
    let tuple = tuple_for(ListingKind::Posts, SortMode::Hot).unwrap();
    let beyond = cursor::encode(
        &tuple,
        &FieldValues::new(vec![
            FieldValue::Int(i64::MIN),
            FieldValue::Int(0),
            FieldValue::Timestamp(0),
            FieldValue::Int(0),
        ]),
    )
    .unwrap();
    let page = fetch(
        &executor,
        request(ListingKind::Posts, SortMode::Hot, Some(&beyond), 10),
        (),
    )
    .await
    .unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.next_cursor, None);
}

#[tokio::test]
async fn alphabetical_listing_breaks_title_ties_by_newest_then_id() {
    let executor = VecExecutor::new(vec![
        titled(1, "beta", 1),
        titled(2, "alpha", 1),
        titled(3, "alpha", 5),
        titled(4, "alpha", 5),
        titled(5, "gamma", 9),
    ]);
    let pages = walk(&executor, ListingKind::Posts, SortMode::Alpha, 2).await;
    assert_eq!(pages, vec![vec![4, 3], vec![2, 1], vec![5]]);
}

#[tokio::test]
async fn follow_feed_serves_followed_posts_before_public_ones() {
    let followed = vec![post(1, Some(0), None, 1), post(2, Some(1), None, 2)];
    let public = vec![
        post(2, Some(1), None, 2),
        post(3, Some(50), Some(9), 3),
        post(4, Some(40), None, 4),
    ];
    let executor = VecExecutor::new(merge_sources(followed, public));
    assert_eq!(executor.rows.len(), 4);

    for mode in [SortMode::Hot, SortMode::New, SortMode::Alpha] {
        let pages = walk(&executor, ListingKind::FollowFeed, mode, 1).await;
        let flat: Vec<i64> = pages.into_iter().flatten().collect();
        let (leading, trailing) = flat.split_at(2);
        let leading: HashSet<_> = leading.iter().copied().collect();
        let trailing: HashSet<_> = trailing.iter().copied().collect();
        assert_eq!(leading, HashSet::from([1, 2]), "{mode}");
        assert_eq!(trailing, HashSet::from([3, 4]), "{mode}");
    }
}

#[tokio::test]
async fn zero_page_size_never_reaches_the_executor() {
    let executor = VecExecutor::new(vec![post(1, None, None, 1)]);
    let err = fetch(&executor, request(ListingKind::Posts, SortMode::Hot, None, 0), ())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::Pagination(PaginationError::InvalidPageSize(0))
    ));
    assert_eq!(executor.calls(), 0);
}

fn arb_rows() -> impl Strategy<Value = Vec<PostListing>> {
    prop::collection::vec(
        (
            prop::option::of(-2i64..3),
            prop::option::of(0i64..3),
            0i64..4,
            prop::sample::select(vec!["a", "b", "c"]),
            any::<bool>(),
        ),
        0..24,
    )
    .prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(index, (score, comments, created, title, following))| PostListing {
                title: title.to_string(),
                is_following: following,
                ..post(index as i64 + 1, score, comments, created)
            })
            .collect()
    })
}

fn arb_listing() -> impl Strategy<Value = (ListingKind, SortMode)> {
    prop::sample::select(vec![
        (ListingKind::Posts, SortMode::Hot),
        (ListingKind::Posts, SortMode::New),
        (ListingKind::Posts, SortMode::Alpha),
        (ListingKind::FollowFeed, SortMode::Hot),
        (ListingKind::FollowFeed, SortMode::New),
        (ListingKind::FollowFeed, SortMode::Alpha),
    ])
}

proptest! {
    #[test]
    fn pages_cover_every_row_exactly_once_in_order(
        rows in arb_rows(),
        (kind, mode) in arb_listing(),
        page_size in 1i64..8,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let executor = VecExecutor::new(rows);
        let pages = runtime.block_on(walk(&executor, kind, mode, page_size));

        let tuple = tuple_for(kind, mode).unwrap();
        let mut expected: Vec<_> = executor
            .rows
            .iter()
            .map(|row| (tuple.values_of(row).unwrap(), row.post_id))
            .collect();
        expected.sort_by(|(left, _), (right, _)| tuple.compare(left, right));
        let expected: Vec<i64> = expected.into_iter().map(|(_, id)| id).collect();

        for page in &pages[..pages.len() - 1] {
            prop_assert_eq!(page.len() as i64, page_size);
        }
        let flat: Vec<i64> = pages.into_iter().flatten().collect();
        prop_assert_eq!(flat, expected);
    }

    #[test]
    fn issued_cursors_decode_to_the_last_row(
        rows in arb_rows(),
        (kind, mode) in arb_listing(),
        page_size in 1i64..5,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let executor = VecExecutor::new(rows);
        let page = runtime
            .block_on(fetch(&executor, request(kind, mode, None, page_size), ()))
            .unwrap();
        let tuple = tuple_for(kind, mode).unwrap();
        if let Some(token) = page.next_cursor.as_deref() {
            let last = page.items.last().unwrap();
            prop_assert_eq!(cursor::decode(token, &tuple).unwrap(), tuple.values_of(last).unwrap());
        } else {
            prop_assert!(page.items.len() as i64 <= page_size);
        }
    }
}
