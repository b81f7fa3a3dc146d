use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use agora_domain::DomainResult;
use agora_domain::forum::{
    Comment, CommentChanges, CommentListing, NewComment, NewPost, NewTopic, Post, PostChanges,
    PostListing, Topic, TopicListing, TopicVisibility, VoteTarget,
};
use agora_domain::pagination::{KeysetExecutor, KeysetQuery, SortKeyed, merge_sources};
use agora_domain::ports::BoxFuture;
use agora_domain::ports::db::{DbAdapter, DbError};
use agora_domain::ports::forum::ForumRepository;
use agora_domain::ports::listing::{CommentFilter, FeedFilter, PostFilter, TopicFilter};
use tokio::sync::RwLock;

#[derive(Default)]
struct ForumState {
    next_topic_id: i64,
    next_post_id: i64,
    next_comment_id: i64,
    topics: BTreeMap<i64, Topic>,
    posts: BTreeMap<i64, Post>,
    comments: BTreeMap<i64, Comment>,
    votes: HashMap<(VoteTarget, String), i8>,
    follows: HashSet<(String, i64)>,
    bookmarks: HashSet<(String, i64)>,
}

#[derive(Default)]
struct VoteTally {
    sum: i64,
    upvotes: i64,
    downvotes: i64,
    cast: bool,
}

impl VoteTally {
    /// `None` when nobody voted, mirroring an outer join over no vote rows.
    fn score(&self) -> Option<i64> {
        self.cast.then_some(self.sum)
    }
}

impl ForumState {
    fn tally(&self, target: VoteTarget) -> VoteTally {
        self.votes
            .iter()
            .filter(|((voted, _), _)| *voted == target)
            .fold(VoteTally::default(), |mut tally, (_, value)| {
                tally.sum += i64::from(*value);
                tally.cast = true;
                match value {
                    1 => tally.upvotes += 1,
                    -1 => tally.downvotes += 1,
                    _ => {}
                }
                tally
            })
    }

    fn viewer_vote(&self, target: VoteTarget, viewer: Option<&str>) -> i64 {
        viewer
            .and_then(|viewer| self.votes.get(&(target, viewer.to_string())))
            .map_or(0, |value| i64::from(*value))
    }

    fn follows_topic(&self, viewer: Option<&str>, topic_id: i64) -> bool {
        viewer.is_some_and(|viewer| self.follows.contains(&(viewer.to_string(), topic_id)))
    }

    fn non_zero(count: usize) -> Option<i64> {
        (count > 0).then_some(count as i64)
    }

    fn post_listing(&self, post: &Post, viewer: Option<&str>) -> PostListing {
        let target = VoteTarget::Post(post.post_id);
        let tally = self.tally(target);
        let comments = self
            .comments
            .values()
            .filter(|comment| comment.post_id == post.post_id)
            .count();
        PostListing {
            post_id: post.post_id,
            topic_id: post.topic_id,
            topic_name: self
                .topics
                .get(&post.topic_id)
                .map(|topic| topic.name.clone())
                .unwrap_or_default(),
            author_id: post.author_id.clone(),
            title: post.title.clone(),
            content: post.content.clone(),
            created_at_ms: post.created_at_ms,
            score: tally.score(),
            comment_count: Self::non_zero(comments),
            upvotes: tally.upvotes,
            downvotes: tally.downvotes,
            viewer_vote: self.viewer_vote(target, viewer),
            is_bookmarked: viewer.is_some_and(|viewer| {
                self.bookmarks
                    .contains(&(viewer.to_string(), post.post_id))
            }),
            is_following: self.follows_topic(viewer, post.topic_id),
        }
    }

    fn comment_listing(&self, comment: &Comment, viewer: Option<&str>) -> CommentListing {
        let target = VoteTarget::Comment(comment.comment_id);
        let tally = self.tally(target);
        let replies = self
            .comments
            .values()
            .filter(|reply| reply.parent_comment_id == Some(comment.comment_id))
            .count();
        CommentListing {
            comment_id: comment.comment_id,
            post_id: comment.post_id,
            author_id: comment.author_id.clone(),
            parent_comment_id: comment.parent_comment_id,
            content: comment.content.clone(),
            created_at_ms: comment.created_at_ms,
            score: tally.score(),
            reply_count: Self::non_zero(replies),
            upvotes: tally.upvotes,
            downvotes: tally.downvotes,
            viewer_vote: self.viewer_vote(target, viewer),
        }
    }

    fn topic_listing(&self, topic: &Topic, viewer: Option<&str>) -> TopicListing {
        let followers = self
            .follows
            .iter()
            .filter(|(_, topic_id)| *topic_id == topic.topic_id)
            .count();
        let posts = self
            .posts
            .values()
            .filter(|post| post.topic_id == topic.topic_id)
            .count();
        TopicListing {
            topic_id: topic.topic_id,
            name: topic.name.clone(),
            description: topic.description.clone(),
            creator_id: topic.creator_id.clone(),
            created_at_ms: topic.created_at_ms,
            follower_count: Self::non_zero(followers),
            post_count: Self::non_zero(posts),
            is_following: self.follows_topic(viewer, topic.topic_id),
        }
    }

    /// The comment and every reply below it, root first.
    fn comment_subtree(&self, root: i64) -> Vec<i64> {
        let mut subtree = vec![root];
        let mut next = 0;
        while next < subtree.len() {
            let parent = subtree[next];
            subtree.extend(
                self.comments
                    .values()
                    .filter(|comment| comment.parent_comment_id == Some(parent))
                    .map(|comment| comment.comment_id),
            );
            next += 1;
        }
        subtree
    }

    fn remove_comments(&mut self, comment_ids: &[i64]) {
        for comment_id in comment_ids {
            self.comments.remove(comment_id);
        }
        self.votes.retain(|(target, _), _| match target {
            VoteTarget::Comment(comment_id) => !comment_ids.contains(comment_id),
            VoteTarget::Post(_) => true,
        });
    }

    fn is_public(&self, topic_id: i64) -> bool {
        self.topics
            .get(&topic_id)
            .is_some_and(|topic| topic.visibility == TopicVisibility::Public)
    }
}

/// Seeks, orders and limits already-filtered rows for one keyset query.
fn keyset_page<R, F>(query: &KeysetQuery<F>, rows: Vec<R>) -> DomainResult<Vec<R>>
where
    R: SortKeyed,
{
    let tuple = *query.tuple();
    let mut keyed = Vec::with_capacity(rows.len());
    for row in rows {
        let values = tuple.values_of(&row)?;
        if query.predicate.admits(&values) {
            keyed.push((values, row));
        }
    }
    keyed.sort_by(|(left, _), (right, _)| tuple.compare(left, right));
    keyed.truncate(query.limit);
    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}

/// Process-local forum store used for development and tests.
#[derive(Clone, Default)]
pub struct InMemoryForumStore {
    state: Arc<RwLock<ForumState>>,
}

impl InMemoryForumStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ForumRepository for InMemoryForumStore {
    fn insert_topic(&self, topic: &NewTopic) -> BoxFuture<'_, DomainResult<Topic>> {
        let topic = topic.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.next_topic_id += 1;
            let stored = Topic {
                topic_id: state.next_topic_id,
                name: topic.name,
                description: topic.description,
                creator_id: topic.creator_id,
                visibility: topic.visibility,
                created_at_ms: topic.created_at_ms,
            };
            state.topics.insert(stored.topic_id, stored.clone());
            Ok(stored)
        })
    }

    fn get_topic(&self, topic_id: i64) -> BoxFuture<'_, DomainResult<Option<Topic>>> {
        Box::pin(async move { Ok(self.state.read().await.topics.get(&topic_id).cloned()) })
    }

    fn insert_post(&self, post: &NewPost) -> BoxFuture<'_, DomainResult<Post>> {
        let post = post.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.next_post_id += 1;
            let stored = Post {
                post_id: state.next_post_id,
                topic_id: post.topic_id,
                author_id: post.author_id,
                title: post.title,
                content: post.content,
                created_at_ms: post.created_at_ms,
                updated_at_ms: None,
            };
            state.posts.insert(stored.post_id, stored.clone());
            Ok(stored)
        })
    }

    fn get_post(&self, post_id: i64) -> BoxFuture<'_, DomainResult<Option<Post>>> {
        Box::pin(async move { Ok(self.state.read().await.posts.get(&post_id).cloned()) })
    }

    fn update_post(
        &self,
        post_id: i64,
        changes: &PostChanges,
    ) -> BoxFuture<'_, DomainResult<Option<Post>>> {
        let changes = changes.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            Ok(state.posts.get_mut(&post_id).map(|post| {
                post.title = changes.title;
                post.content = changes.content;
                post.updated_at_ms = Some(changes.updated_at_ms);
                post.clone()
            }))
        })
    }

    fn delete_post(&self, post_id: i64) -> BoxFuture<'_, DomainResult<bool>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            if state.posts.remove(&post_id).is_none() {
                return Ok(false);
            }
            let comment_ids: Vec<i64> = state
                .comments
                .values()
                .filter(|comment| comment.post_id == post_id)
                .map(|comment| comment.comment_id)
                .collect();
            state.remove_comments(&comment_ids);
            state
                .votes
                .retain(|(target, _), _| *target != VoteTarget::Post(post_id));
            state
                .bookmarks
                .retain(|(_, bookmarked)| *bookmarked != post_id);
            Ok(true)
        })
    }

    fn insert_comment(&self, comment: &NewComment) -> BoxFuture<'_, DomainResult<Comment>> {
        let comment = comment.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.next_comment_id += 1;
            let stored = Comment {
                comment_id: state.next_comment_id,
                post_id: comment.post_id,
                author_id: comment.author_id,
                parent_comment_id: comment.parent_comment_id,
                content: comment.content,
                created_at_ms: comment.created_at_ms,
                updated_at_ms: None,
            };
            state.comments.insert(stored.comment_id, stored.clone());
            Ok(stored)
        })
    }

    fn get_comment(&self, comment_id: i64) -> BoxFuture<'_, DomainResult<Option<Comment>>> {
        Box::pin(async move { Ok(self.state.read().await.comments.get(&comment_id).cloned()) })
    }

    fn update_comment(
        &self,
        comment_id: i64,
        changes: &CommentChanges,
    ) -> BoxFuture<'_, DomainResult<Option<Comment>>> {
        let changes = changes.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            Ok(state.comments.get_mut(&comment_id).map(|comment| {
                comment.content = changes.content;
                comment.updated_at_ms = Some(changes.updated_at_ms);
                comment.clone()
            }))
        })
    }

    fn delete_comment(&self, comment_id: i64) -> BoxFuture<'_, DomainResult<bool>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            if !state.comments.contains_key(&comment_id) {
                return Ok(false);
            }
            let subtree = state.comment_subtree(comment_id);
            state.remove_comments(&subtree);
            Ok(true)
        })
    }

    fn set_vote(
        &self,
        user_id: &str,
        target: VoteTarget,
        value: i8,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let key = (target, user_id.to_string());
        Box::pin(async move {
            let mut state = self.state.write().await;
            if value == 0 {
                state.votes.remove(&key);
            } else {
                state.votes.insert(key, value);
            }
            Ok(())
        })
    }

    fn set_follow(
        &self,
        user_id: &str,
        topic_id: i64,
        following: bool,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let key = (user_id.to_string(), topic_id);
        Box::pin(async move {
            let mut state = self.state.write().await;
            if following {
                state.follows.insert(key);
            } else {
                state.follows.remove(&key);
            }
            Ok(())
        })
    }

    fn set_bookmark(
        &self,
        user_id: &str,
        post_id: i64,
        bookmarked: bool,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let key = (user_id.to_string(), post_id);
        Box::pin(async move {
            let mut state = self.state.write().await;
            if bookmarked {
                state.bookmarks.insert(key);
            } else {
                state.bookmarks.remove(&key);
            }
            Ok(())
        })
    }
}

impl KeysetExecutor<PostListing, PostFilter> for InMemoryForumStore {
    fn run<'a>(
        &'a self,
        query: &'a KeysetQuery<PostFilter>,
    ) -> BoxFuture<'a, DomainResult<Vec<PostListing>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let filter = &query.filters;
            let viewer = filter.viewer_id.as_deref();
            let rows = state
                .posts
                .values()
                .filter(|post| filter.post_id.is_none_or(|post_id| post.post_id == post_id))
                .filter(|post| filter.topic_id.is_none_or(|topic_id| post.topic_id == topic_id))
                .filter(|post| {
                    filter
                        .search
                        .as_deref()
                        .is_none_or(|needle| post.title.to_lowercase().contains(needle))
                })
                .filter(|post| !filter.followed_only || state.follows_topic(viewer, post.topic_id))
                .map(|post| state.post_listing(post, viewer))
                .collect();
            keyset_page(query, rows)
        })
    }
}

impl KeysetExecutor<PostListing, FeedFilter> for InMemoryForumStore {
    fn run<'a>(
        &'a self,
        query: &'a KeysetQuery<FeedFilter>,
    ) -> BoxFuture<'a, DomainResult<Vec<PostListing>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let viewer = Some(query.filters.viewer_id.as_str());
            let followed = state
                .posts
                .values()
                .filter(|post| state.follows_topic(viewer, post.topic_id))
                .map(|post| state.post_listing(post, viewer));
            let public = state
                .posts
                .values()
                .filter(|post| state.is_public(post.topic_id))
                .map(|post| state.post_listing(post, viewer));
            keyset_page(query, merge_sources(followed, public))
        })
    }
}

impl KeysetExecutor<CommentListing, CommentFilter> for InMemoryForumStore {
    fn run<'a>(
        &'a self,
        query: &'a KeysetQuery<CommentFilter>,
    ) -> BoxFuture<'a, DomainResult<Vec<CommentListing>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let filter = &query.filters;
            let rows = state
                .comments
                .values()
                .filter(|comment| comment.post_id == filter.post_id)
                .filter(|comment| !filter.top_level_only || comment.parent_comment_id.is_none())
                .map(|comment| state.comment_listing(comment, filter.viewer_id.as_deref()))
                .collect();
            keyset_page(query, rows)
        })
    }
}

impl KeysetExecutor<TopicListing, TopicFilter> for InMemoryForumStore {
    fn run<'a>(
        &'a self,
        query: &'a KeysetQuery<TopicFilter>,
    ) -> BoxFuture<'a, DomainResult<Vec<TopicListing>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let filter = &query.filters;
            let rows = state
                .topics
                .values()
                .filter(|topic| match filter.topic_id {
                    Some(topic_id) => topic.topic_id == topic_id,
                    None => topic.visibility == TopicVisibility::Public,
                })
                .filter(|topic| {
                    filter
                        .search
                        .as_deref()
                        .is_none_or(|needle| topic.name.to_lowercase().contains(needle))
                })
                .map(|topic| state.topic_listing(topic, filter.viewer_id.as_deref()))
                .collect();
            keyset_page(query, rows)
        })
    }
}

impl DbAdapter for InMemoryForumStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), DbError>> {
        Box::pin(async { Ok(()) })
    }
}
