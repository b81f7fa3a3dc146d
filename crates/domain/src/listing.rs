use std::sync::Arc;

use crate::DomainResult;
use crate::error::DomainError;
use crate::forum::{CommentListing, PostListing, TopicListing};
use crate::identity::validate_user_id;
use crate::pagination::{
    KeysetExecutor, KeysetQuery, ListingKind, Page, PageRequest, SeekPredicate, SortMode, fetch,
    tuple_for, tuple_for_name,
};
use crate::ports::listing::{CommentFilter, FeedFilter, ListingRepository, PostFilter, TopicFilter};
use crate::util::normalize_text;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;
const MAX_SEARCH_LENGTH: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageLimits {
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PostListQuery {
    pub viewer_id: Option<String>,
    pub sort_mode: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub topic_id: Option<i64>,
    pub followed_only: bool,
}

#[derive(Clone, Debug, Default)]
pub struct FeedListQuery {
    pub viewer_id: String,
    pub sort_mode: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Clone, Debug, Default)]
pub struct CommentListQuery {
    pub viewer_id: Option<String>,
    pub post_id: i64,
    pub sort_mode: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    pub top_level_only: bool,
}

#[derive(Clone, Debug, Default)]
pub struct TopicListQuery {
    pub viewer_id: Option<String>,
    pub sort_mode: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

/// Entry point for every paginated forum listing.
#[derive(Clone)]
pub struct ListingService {
    repository: Arc<dyn ListingRepository>,
    limits: PageLimits,
}

impl ListingService {
    pub fn new(repository: Arc<dyn ListingRepository>) -> Self {
        Self::with_limits(repository, PageLimits::default())
    }

    pub fn with_limits(repository: Arc<dyn ListingRepository>, limits: PageLimits) -> Self {
        Self { repository, limits }
    }

    pub async fn list_posts(&self, query: PostListQuery) -> DomainResult<Page<PostListing>> {
        let viewer_id = optional_viewer(query.viewer_id)?;
        if query.followed_only && viewer_id.is_none() {
            return Err(DomainError::Validation(
                "followed_only requires an authenticated viewer".into(),
            ));
        }
        let request = self.page_request(
            ListingKind::Posts,
            query.sort_mode.as_deref(),
            query.cursor.as_deref(),
            query.limit,
        )?;
        let filters = PostFilter {
            viewer_id,
            search: normalize_search(query.search)?,
            topic_id: query.topic_id,
            followed_only: query.followed_only,
            post_id: None,
        };
        fetch(self.repository.as_ref(), request, filters).await
    }

    pub async fn list_follow_feed(&self, query: FeedListQuery) -> DomainResult<Page<PostListing>> {
        validate_user_id(&query.viewer_id)?;
        let request = self.page_request(
            ListingKind::FollowFeed,
            query.sort_mode.as_deref(),
            query.cursor.as_deref(),
            query.limit,
        )?;
        let filters = FeedFilter {
            viewer_id: query.viewer_id.trim().to_string(),
        };
        fetch(self.repository.as_ref(), request, filters).await
    }

    pub async fn list_comments(
        &self,
        query: CommentListQuery,
    ) -> DomainResult<Page<CommentListing>> {
        let request = self.page_request(
            ListingKind::Comments,
            query.sort_mode.as_deref(),
            query.cursor.as_deref(),
            query.limit,
        )?;
        let filters = CommentFilter {
            viewer_id: optional_viewer(query.viewer_id)?,
            post_id: query.post_id,
            top_level_only: query.top_level_only,
        };
        fetch(self.repository.as_ref(), request, filters).await
    }

    pub async fn list_topics(&self, query: TopicListQuery) -> DomainResult<Page<TopicListing>> {
        let request = self.page_request(
            ListingKind::Topics,
            query.sort_mode.as_deref(),
            query.cursor.as_deref(),
            query.limit,
        )?;
        let filters = TopicFilter {
            viewer_id: optional_viewer(query.viewer_id)?,
            search: normalize_search(query.search)?,
            topic_id: None,
        };
        fetch(self.repository.as_ref(), request, filters).await
    }

    /// A single post shaped like a listing row, with the viewer's vote,
    /// bookmark and follow state.
    pub async fn get_post(
        &self,
        viewer_id: Option<String>,
        post_id: i64,
    ) -> DomainResult<PostListing> {
        let filters = PostFilter {
            viewer_id: optional_viewer(viewer_id)?,
            post_id: Some(post_id),
            ..PostFilter::default()
        };
        fetch_one(self.repository.as_ref(), ListingKind::Posts, filters).await
    }

    /// A single topic by id, private topics included.
    pub async fn get_topic(
        &self,
        viewer_id: Option<String>,
        topic_id: i64,
    ) -> DomainResult<TopicListing> {
        let filters = TopicFilter {
            viewer_id: optional_viewer(viewer_id)?,
            topic_id: Some(topic_id),
            ..TopicFilter::default()
        };
        fetch_one(self.repository.as_ref(), ListingKind::Topics, filters).await
    }

    fn page_request<'a>(
        &self,
        kind: ListingKind,
        sort_mode: Option<&str>,
        cursor: Option<&'a str>,
        limit: Option<i64>,
    ) -> DomainResult<PageRequest<'a>> {
        let tuple = tuple_for_name(kind, sort_mode)?;
        Ok(PageRequest {
            kind,
            mode: tuple.mode(),
            // `?cursor=` with no value reads as the first page.
            cursor: cursor.filter(|token| !token.trim().is_empty()),
            page_size: self.normalize_limit(limit)?,
        })
    }

    /// Non-positive sizes pass through so the engine reports them.
    fn normalize_limit(&self, limit: Option<i64>) -> DomainResult<i64> {
        let limit = limit.unwrap_or(self.limits.default_page_size);
        if limit > self.limits.max_page_size {
            return Err(DomainError::Validation(format!(
                "limit must be at most {}",
                self.limits.max_page_size
            )));
        }
        Ok(limit)
    }
}

/// Runs a one-row first-page query narrowed by `filters` and returns that row.
async fn fetch_one<R, F, E>(executor: &E, kind: ListingKind, filters: F) -> DomainResult<R>
where
    E: KeysetExecutor<R, F> + ?Sized,
{
    let query = KeysetQuery {
        predicate: SeekPredicate::first_page(tuple_for(kind, SortMode::default())?),
        filters,
        limit: 1,
    };
    let rows = executor.run(&query).await?;
    rows.into_iter().next().ok_or(DomainError::NotFound)
}

fn optional_viewer(viewer_id: Option<String>) -> DomainResult<Option<String>> {
    match viewer_id {
        Some(id) => {
            validate_user_id(&id)?;
            Ok(Some(id.trim().to_string()))
        }
        None => Ok(None),
    }
}

fn normalize_search(search: Option<String>) -> DomainResult<Option<String>> {
    let Some(search) = search.map(|value| normalize_text(&value)) else {
        return Ok(None);
    };
    if search.is_empty() {
        return Ok(None);
    }
    if search.chars().count() > MAX_SEARCH_LENGTH {
        return Err(DomainError::Validation(format!(
            "search must be at most {MAX_SEARCH_LENGTH} characters"
        )));
    }
    Ok(Some(search))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_is_trimmed_lowercased_and_optional() {
        assert_eq!(
            normalize_search(Some("  Rust ".into())).expect("search"),
            Some("rust".into())
        );
        assert_eq!(normalize_search(Some("   ".into())).expect("search"), None);
        assert!(normalize_search(Some("x".repeat(MAX_SEARCH_LENGTH + 1))).is_err());
    }

    #[test]
    fn viewer_ids_are_validated_when_present() {
        assert_eq!(optional_viewer(None).expect("none"), None);
        assert!(optional_viewer(Some("  ".into())).is_err());
    }
}
