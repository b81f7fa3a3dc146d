use crate::forum::{CommentListing, PostListing, TopicListing};
use crate::pagination::KeysetExecutor;

/// Filters for the post listing. `search` is already lowercased.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PostFilter {
    pub viewer_id: Option<String>,
    pub search: Option<String>,
    pub topic_id: Option<i64>,
    pub followed_only: bool,
    /// Narrows the listing to a single post.
    pub post_id: Option<i64>,
}

/// The two-source feed: posts from topics the viewer follows, then public posts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedFilter {
    pub viewer_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommentFilter {
    pub viewer_id: Option<String>,
    pub post_id: i64,
    pub top_level_only: bool,
}

/// Public topics only, unless `topic_id` asks for one topic by id.
/// `search` is already lowercased.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopicFilter {
    pub viewer_id: Option<String>,
    pub search: Option<String>,
    pub topic_id: Option<i64>,
}

/// A store able to serve every forum listing.
pub trait ListingRepository:
    KeysetExecutor<PostListing, PostFilter>
    + KeysetExecutor<PostListing, FeedFilter>
    + KeysetExecutor<CommentListing, CommentFilter>
    + KeysetExecutor<TopicListing, TopicFilter>
{
}

impl<T> ListingRepository for T where
    T: KeysetExecutor<PostListing, PostFilter>
        + KeysetExecutor<PostListing, FeedFilter>
        + KeysetExecutor<CommentListing, CommentFilter>
        + KeysetExecutor<TopicListing, TopicFilter>
{
}
