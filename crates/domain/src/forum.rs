use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::pagination::{FeedMember, FeedSource, FieldValue, SortField, SortKeyed};
use crate::ports::forum::ForumRepository;
use crate::util::{now_ms, serialize_zero_if_absent};

const MAX_TOPIC_NAME_LENGTH: usize = 100;
const MAX_DESCRIPTION_LENGTH: usize = 1_000;
const MAX_TITLE_LENGTH: usize = 300;
const MAX_CONTENT_LENGTH: usize = 40_000;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TopicVisibility {
    #[default]
    Public,
    Private,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Topic {
    pub topic_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub creator_id: String,
    pub visibility: TopicVisibility,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub post_id: i64,
    pub topic_id: i64,
    pub author_id: String,
    pub title: String,
    pub content: String,
    pub created_at_ms: i64,
    #[serde(default)]
    pub updated_at_ms: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub comment_id: i64,
    pub post_id: i64,
    pub author_id: String,
    pub parent_comment_id: Option<i64>,
    pub content: String,
    pub created_at_ms: i64,
    #[serde(default)]
    pub updated_at_ms: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct TopicCreate {
    pub name: String,
    pub description: Option<String>,
    pub visibility: TopicVisibility,
}

#[derive(Clone, Debug)]
pub struct PostCreate {
    pub title: String,
    pub content: String,
}

#[derive(Clone, Debug)]
pub struct CommentCreate {
    pub content: String,
    pub parent_comment_id: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct PostUpdate {
    pub title: String,
    pub content: String,
}

/// Validated edits handed to the repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostChanges {
    pub title: String,
    pub content: String,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommentChanges {
    pub content: String,
    pub updated_at_ms: i64,
}

/// Rows handed to the repository; ids are assigned on insert.
#[derive(Clone, Debug)]
pub struct NewTopic {
    pub name: String,
    pub description: Option<String>,
    pub creator_id: String,
    pub visibility: TopicVisibility,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct NewPost {
    pub topic_id: i64,
    pub author_id: String,
    pub title: String,
    pub content: String,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct NewComment {
    pub post_id: i64,
    pub author_id: String,
    pub parent_comment_id: Option<i64>,
    pub content: String,
    pub created_at_ms: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VoteTarget {
    Post(i64),
    Comment(i64),
}

/// A post as it appears in a listing.
///
/// Field aliases match the sort column names so rows projected for keyset
/// queries deserialize directly.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostListing {
    #[serde(alias = "id")]
    pub post_id: i64,
    pub topic_id: i64,
    pub topic_name: String,
    pub author_id: String,
    pub title: String,
    pub content: String,
    #[serde(alias = "created_date")]
    pub created_at_ms: i64,
    #[serde(default, serialize_with = "serialize_zero_if_absent")]
    pub score: Option<i64>,
    #[serde(
        default,
        alias = "secondary_count",
        serialize_with = "serialize_zero_if_absent"
    )]
    pub comment_count: Option<i64>,
    #[serde(default)]
    pub upvotes: i64,
    #[serde(default)]
    pub downvotes: i64,
    #[serde(default)]
    pub viewer_vote: i64,
    #[serde(default)]
    pub is_bookmarked: bool,
    #[serde(default)]
    pub is_following: bool,
}

impl SortKeyed for PostListing {
    fn sort_value(&self, field: SortField) -> Option<FieldValue> {
        match field {
            SortField::IsFollowing => Some(FieldValue::Bool(self.is_following)),
            SortField::Score => self.score.map(FieldValue::Int),
            SortField::SecondaryCount => self.comment_count.map(FieldValue::Int),
            SortField::CreatedDate => Some(FieldValue::Timestamp(self.created_at_ms)),
            SortField::Title => Some(FieldValue::Text(self.title.clone())),
            SortField::Id => Some(FieldValue::Int(self.post_id)),
        }
    }
}

impl FeedMember for PostListing {
    fn member_id(&self) -> i64 {
        self.post_id
    }

    fn mark_source(&mut self, source: FeedSource) {
        self.is_following = source.is_following();
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentListing {
    #[serde(alias = "id")]
    pub comment_id: i64,
    pub post_id: i64,
    pub author_id: String,
    pub parent_comment_id: Option<i64>,
    pub content: String,
    #[serde(alias = "created_date")]
    pub created_at_ms: i64,
    #[serde(default, serialize_with = "serialize_zero_if_absent")]
    pub score: Option<i64>,
    #[serde(
        default,
        alias = "secondary_count",
        serialize_with = "serialize_zero_if_absent"
    )]
    pub reply_count: Option<i64>,
    #[serde(default)]
    pub upvotes: i64,
    #[serde(default)]
    pub downvotes: i64,
    #[serde(default)]
    pub viewer_vote: i64,
}

impl SortKeyed for CommentListing {
    fn sort_value(&self, field: SortField) -> Option<FieldValue> {
        match field {
            SortField::Score => self.score.map(FieldValue::Int),
            SortField::SecondaryCount => self.reply_count.map(FieldValue::Int),
            SortField::CreatedDate => Some(FieldValue::Timestamp(self.created_at_ms)),
            SortField::Id => Some(FieldValue::Int(self.comment_id)),
            SortField::IsFollowing | SortField::Title => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicListing {
    #[serde(alias = "id")]
    pub topic_id: i64,
    #[serde(alias = "title")]
    pub name: String,
    pub description: Option<String>,
    pub creator_id: String,
    #[serde(alias = "created_date")]
    pub created_at_ms: i64,
    #[serde(
        default,
        alias = "score",
        serialize_with = "serialize_zero_if_absent"
    )]
    pub follower_count: Option<i64>,
    #[serde(
        default,
        alias = "secondary_count",
        serialize_with = "serialize_zero_if_absent"
    )]
    pub post_count: Option<i64>,
    #[serde(default)]
    pub is_following: bool,
}

impl SortKeyed for TopicListing {
    fn sort_value(&self, field: SortField) -> Option<FieldValue> {
        match field {
            SortField::IsFollowing => Some(FieldValue::Bool(self.is_following)),
            SortField::Score => self.follower_count.map(FieldValue::Int),
            SortField::SecondaryCount => self.post_count.map(FieldValue::Int),
            SortField::CreatedDate => Some(FieldValue::Timestamp(self.created_at_ms)),
            SortField::Title => Some(FieldValue::Text(self.name.clone())),
            SortField::Id => Some(FieldValue::Int(self.topic_id)),
        }
    }
}

#[derive(Clone)]
pub struct ForumService {
    repository: Arc<dyn ForumRepository>,
}

impl ForumService {
    pub fn new(repository: Arc<dyn ForumRepository>) -> Self {
        Self { repository }
    }

    pub async fn create_topic(
        &self,
        actor: &ActorIdentity,
        input: TopicCreate,
    ) -> DomainResult<Topic> {
        actor.validate()?;
        let name = required_text("name", &input.name, MAX_TOPIC_NAME_LENGTH)?;
        let description = optional_text("description", input.description, MAX_DESCRIPTION_LENGTH)?;
        let topic = self
            .repository
            .insert_topic(&NewTopic {
                name,
                description,
                creator_id: actor.user_id.clone(),
                visibility: input.visibility,
                created_at_ms: now_ms(),
            })
            .await?;
        info!(topic_id = topic.topic_id, creator_id = %topic.creator_id, "topic created");
        Ok(topic)
    }

    pub async fn create_post(
        &self,
        actor: &ActorIdentity,
        topic_id: i64,
        input: PostCreate,
    ) -> DomainResult<Post> {
        actor.validate()?;
        let title = required_text("title", &input.title, MAX_TITLE_LENGTH)?;
        let content = required_text("content", &input.content, MAX_CONTENT_LENGTH)?;
        self.repository
            .get_topic(topic_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        let post = self
            .repository
            .insert_post(&NewPost {
                topic_id,
                author_id: actor.user_id.clone(),
                title,
                content,
                created_at_ms: now_ms(),
            })
            .await?;
        info!(post_id = post.post_id, topic_id, "post created");
        Ok(post)
    }

    pub async fn create_comment(
        &self,
        actor: &ActorIdentity,
        post_id: i64,
        input: CommentCreate,
    ) -> DomainResult<Comment> {
        actor.validate()?;
        let content = required_text("content", &input.content, MAX_CONTENT_LENGTH)?;
        self.repository
            .get_post(post_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        if let Some(parent_id) = input.parent_comment_id {
            let parent = self
                .repository
                .get_comment(parent_id)
                .await?
                .ok_or(DomainError::NotFound)?;
            if parent.post_id != post_id {
                return Err(DomainError::Validation(
                    "parent comment belongs to a different post".into(),
                ));
            }
        }
        self.repository
            .insert_comment(&NewComment {
                post_id,
                author_id: actor.user_id.clone(),
                parent_comment_id: input.parent_comment_id,
                content,
                created_at_ms: now_ms(),
            })
            .await
    }

    /// Replaces the title and content of a post the actor wrote.
    pub async fn update_post(
        &self,
        actor: &ActorIdentity,
        post_id: i64,
        input: PostUpdate,
    ) -> DomainResult<Post> {
        actor.validate()?;
        let title = required_text("title", &input.title, MAX_TITLE_LENGTH)?;
        let content = required_text("content", &input.content, MAX_CONTENT_LENGTH)?;
        let post = self
            .repository
            .get_post(post_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        ensure_author(actor, &post.author_id)?;
        let changes = PostChanges {
            title,
            content,
            updated_at_ms: now_ms(),
        };
        let updated = self
            .repository
            .update_post(post_id, &changes)
            .await?
            .ok_or(DomainError::NotFound)?;
        info!(post_id, "post updated");
        Ok(updated)
    }

    pub async fn delete_post(&self, actor: &ActorIdentity, post_id: i64) -> DomainResult<()> {
        actor.validate()?;
        let post = self
            .repository
            .get_post(post_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        ensure_author(actor, &post.author_id)?;
        if !self.repository.delete_post(post_id).await? {
            return Err(DomainError::NotFound);
        }
        info!(post_id, topic_id = post.topic_id, "post deleted");
        Ok(())
    }

    pub async fn update_comment(
        &self,
        actor: &ActorIdentity,
        comment_id: i64,
        content: &str,
    ) -> DomainResult<Comment> {
        actor.validate()?;
        let content = required_text("content", content, MAX_CONTENT_LENGTH)?;
        let comment = self
            .repository
            .get_comment(comment_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        ensure_author(actor, &comment.author_id)?;
        let changes = CommentChanges {
            content,
            updated_at_ms: now_ms(),
        };
        self.repository
            .update_comment(comment_id, &changes)
            .await?
            .ok_or(DomainError::NotFound)
    }

    /// Deletes a comment the actor wrote together with its replies.
    pub async fn delete_comment(&self, actor: &ActorIdentity, comment_id: i64) -> DomainResult<()> {
        actor.validate()?;
        let comment = self
            .repository
            .get_comment(comment_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        ensure_author(actor, &comment.author_id)?;
        if !self.repository.delete_comment(comment_id).await? {
            return Err(DomainError::NotFound);
        }
        info!(comment_id, post_id = comment.post_id, "comment deleted");
        Ok(())
    }

    /// Casts, changes or (with `0`) withdraws the actor's vote on a post.
    pub async fn vote_post(
        &self,
        actor: &ActorIdentity,
        post_id: i64,
        value: i64,
    ) -> DomainResult<()> {
        actor.validate()?;
        let value = validate_vote(value)?;
        self.repository
            .get_post(post_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        self.repository
            .set_vote(&actor.user_id, VoteTarget::Post(post_id), value)
            .await
    }

    pub async fn vote_comment(
        &self,
        actor: &ActorIdentity,
        comment_id: i64,
        value: i64,
    ) -> DomainResult<()> {
        actor.validate()?;
        let value = validate_vote(value)?;
        self.repository
            .get_comment(comment_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        self.repository
            .set_vote(&actor.user_id, VoteTarget::Comment(comment_id), value)
            .await
    }

    pub async fn follow_topic(&self, actor: &ActorIdentity, topic_id: i64) -> DomainResult<()> {
        self.set_follow(actor, topic_id, true).await
    }

    pub async fn unfollow_topic(&self, actor: &ActorIdentity, topic_id: i64) -> DomainResult<()> {
        self.set_follow(actor, topic_id, false).await
    }

    pub async fn bookmark_post(&self, actor: &ActorIdentity, post_id: i64) -> DomainResult<()> {
        self.set_bookmark(actor, post_id, true).await
    }

    pub async fn unbookmark_post(&self, actor: &ActorIdentity, post_id: i64) -> DomainResult<()> {
        self.set_bookmark(actor, post_id, false).await
    }

    async fn set_follow(
        &self,
        actor: &ActorIdentity,
        topic_id: i64,
        following: bool,
    ) -> DomainResult<()> {
        actor.validate()?;
        self.repository
            .get_topic(topic_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        self.repository
            .set_follow(&actor.user_id, topic_id, following)
            .await
    }

    async fn set_bookmark(
        &self,
        actor: &ActorIdentity,
        post_id: i64,
        bookmarked: bool,
    ) -> DomainResult<()> {
        actor.validate()?;
        self.repository
            .get_post(post_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        self.repository
            .set_bookmark(&actor.user_id, post_id, bookmarked)
            .await
    }
}

fn ensure_author(actor: &ActorIdentity, author_id: &str) -> DomainResult<()> {
    if actor.user_id == author_id {
        Ok(())
    } else {
        Err(DomainError::Forbidden)
    }
}

fn validate_vote(value: i64) -> DomainResult<i8> {
    match value {
        -1 => Ok(-1),
        0 => Ok(0),
        1 => Ok(1),
        _ => Err(DomainError::Validation("vote must be -1, 0 or 1".into())),
    }
}

fn required_text(field: &str, value: &str, max_len: usize) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation(format!("{field} is required")));
    }
    if trimmed.chars().count() > max_len {
        return Err(DomainError::Validation(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn optional_text(
    field: &str,
    value: Option<String>,
    max_len: usize,
) -> DomainResult<Option<String>> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => required_text(field, text, max_len).map(Some),
    }
}
