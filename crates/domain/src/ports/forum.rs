use crate::DomainResult;
use crate::forum::{
    Comment, CommentChanges, NewComment, NewPost, NewTopic, Post, PostChanges, Topic, VoteTarget,
};
use crate::ports::BoxFuture;

pub trait ForumRepository: Send + Sync {
    fn insert_topic(&self, topic: &NewTopic) -> BoxFuture<'_, DomainResult<Topic>>;

    fn get_topic(&self, topic_id: i64) -> BoxFuture<'_, DomainResult<Option<Topic>>>;

    fn insert_post(&self, post: &NewPost) -> BoxFuture<'_, DomainResult<Post>>;

    fn get_post(&self, post_id: i64) -> BoxFuture<'_, DomainResult<Option<Post>>>;

    /// Returns the edited post, or `None` when it no longer exists.
    fn update_post(
        &self,
        post_id: i64,
        changes: &PostChanges,
    ) -> BoxFuture<'_, DomainResult<Option<Post>>>;

    /// Removes the post with its comments, votes and bookmarks. `false` when
    /// nothing was deleted.
    fn delete_post(&self, post_id: i64) -> BoxFuture<'_, DomainResult<bool>>;

    fn insert_comment(&self, comment: &NewComment) -> BoxFuture<'_, DomainResult<Comment>>;

    fn get_comment(&self, comment_id: i64) -> BoxFuture<'_, DomainResult<Option<Comment>>>;

    fn update_comment(
        &self,
        comment_id: i64,
        changes: &CommentChanges,
    ) -> BoxFuture<'_, DomainResult<Option<Comment>>>;

    /// Removes the comment, every reply beneath it and their votes.
    fn delete_comment(&self, comment_id: i64) -> BoxFuture<'_, DomainResult<bool>>;

    /// Upserts the user's vote on `target`; a value of `0` removes it.
    fn set_vote(
        &self,
        user_id: &str,
        target: VoteTarget,
        value: i8,
    ) -> BoxFuture<'_, DomainResult<()>>;

    fn set_follow(
        &self,
        user_id: &str,
        topic_id: i64,
        following: bool,
    ) -> BoxFuture<'_, DomainResult<()>>;

    fn set_bookmark(
        &self,
        user_id: &str,
        post_id: i64,
        bookmarked: bool,
    ) -> BoxFuture<'_, DomainResult<()>>;
}
