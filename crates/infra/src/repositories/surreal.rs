use std::sync::Arc;

use agora_domain::DomainResult;
use agora_domain::error::DomainError;
use agora_domain::forum::{
    Comment, CommentChanges, CommentListing, NewComment, NewPost, NewTopic, Post, PostChanges,
    PostListing, Topic, TopicListing, VoteTarget,
};
use agora_domain::pagination::{
    FieldValue, KeysetExecutor, KeysetQuery, ListingKind, NullPolicy, SeekPredicate, SortField,
    SqlParams,
};
use agora_domain::ports::BoxFuture;
use agora_domain::ports::forum::ForumRepository;
use agora_domain::ports::listing::{CommentFilter, FeedFilter, PostFilter, TopicFilter};
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use serde_json::Value;
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::Client;

use crate::db::{DbConfig, connect};

const LISTING_ROWS_TOTAL: &str = "agora_listing_rows_fetched_total";
const LISTING_QUERY_SECONDS: &str = "agora_listing_query_duration_seconds";

const POST_FIELDS: &str =
    "post_id, topic_id, author_id, title, content, created_at_ms, updated_at_ms";
const COMMENT_FIELDS: &str =
    "comment_id, post_id, author_id, parent_comment_id, content, created_at_ms, updated_at_ms";

/// A rendered listing statement together with its positional bindings.
#[derive(Debug)]
pub(crate) struct ListingStatement {
    pub(crate) sql: String,
    pub(crate) params: SqlParams,
}

fn aggregate(expr: &str, field: SortField) -> String {
    NullPolicy::ZeroIfAbsent.project(expr, field.column())
}

fn required(expr: &str, field: SortField) -> String {
    NullPolicy::Required.project(expr, field.column())
}

fn followed_topics(viewer: &str) -> String {
    format!("(SELECT VALUE topic_id FROM topic_follow WHERE user_id = {viewer})")
}

fn post_projection(viewer: &str) -> String {
    [
        required("post_id", SortField::Id),
        "topic_id".to_string(),
        "(SELECT VALUE name FROM topic WHERE topic_id = $parent.topic_id LIMIT 1)[0] AS topic_name"
            .to_string(),
        "author_id".to_string(),
        required("title", SortField::Title),
        "content".to_string(),
        required("created_at_ms", SortField::CreatedDate),
        aggregate(
            "math::sum((SELECT VALUE vote FROM post_vote WHERE post_id = $parent.post_id))",
            SortField::Score,
        ),
        aggregate(
            "count((SELECT VALUE comment_id FROM comment WHERE post_id = $parent.post_id))",
            SortField::SecondaryCount,
        ),
        "count((SELECT VALUE vote FROM post_vote WHERE post_id = $parent.post_id AND vote = 1)) AS upvotes"
            .to_string(),
        "count((SELECT VALUE vote FROM post_vote WHERE post_id = $parent.post_id AND vote = -1)) AS downvotes"
            .to_string(),
        format!(
            "((SELECT VALUE vote FROM post_vote WHERE post_id = $parent.post_id AND user_id = {viewer})[0] ?? 0) AS viewer_vote"
        ),
        format!(
            "count((SELECT VALUE post_id FROM post_bookmark WHERE post_id = $parent.post_id AND user_id = {viewer})) > 0 AS is_bookmarked"
        ),
        format!("topic_id IN {} AS is_following", followed_topics(viewer)),
    ]
    .join(", ")
}

fn comment_projection(viewer: &str) -> String {
    [
        required("comment_id", SortField::Id),
        "post_id".to_string(),
        "author_id".to_string(),
        "parent_comment_id".to_string(),
        "content".to_string(),
        required("created_at_ms", SortField::CreatedDate),
        aggregate(
            "math::sum((SELECT VALUE vote FROM comment_vote WHERE comment_id = $parent.comment_id))",
            SortField::Score,
        ),
        aggregate(
            "count((SELECT VALUE comment_id FROM comment WHERE parent_comment_id = $parent.comment_id))",
            SortField::SecondaryCount,
        ),
        "count((SELECT VALUE vote FROM comment_vote WHERE comment_id = $parent.comment_id AND vote = 1)) AS upvotes"
            .to_string(),
        "count((SELECT VALUE vote FROM comment_vote WHERE comment_id = $parent.comment_id AND vote = -1)) AS downvotes"
            .to_string(),
        format!(
            "((SELECT VALUE vote FROM comment_vote WHERE comment_id = $parent.comment_id AND user_id = {viewer})[0] ?? 0) AS viewer_vote"
        ),
    ]
    .join(", ")
}

fn topic_projection(viewer: &str) -> String {
    [
        required("topic_id", SortField::Id),
        required("name", SortField::Title),
        "description".to_string(),
        "creator_id".to_string(),
        required("created_at_ms", SortField::CreatedDate),
        aggregate(
            "count((SELECT VALUE user_id FROM topic_follow WHERE topic_id = $parent.topic_id))",
            SortField::Score,
        ),
        aggregate(
            "count((SELECT VALUE post_id FROM post WHERE topic_id = $parent.topic_id))",
            SortField::SecondaryCount,
        ),
        format!("topic_id IN {} AS is_following", followed_topics(viewer)),
    ]
    .join(", ")
}

/// Wraps a projected row source with the seek fragment, ordering and limit.
///
/// The source projects every sort field under its column name, so the outer
/// statement orders and seeks on plain fields.
fn keyset_statement(
    source: String,
    predicate: &SeekPredicate,
    limit: usize,
    mut params: SqlParams,
) -> ListingStatement {
    let seek = predicate.render(&mut params);
    let limit = params.bind(FieldValue::Int(i64::try_from(limit).unwrap_or(i64::MAX)));
    let mut sql = format!("SELECT * FROM ({source})");
    if let Some(fragment) = seek.where_fragment {
        sql.push_str(" WHERE ");
        sql.push_str(&fragment);
    }
    sql.push_str(&format!(" ORDER BY {} LIMIT {limit}", seek.order_by));
    ListingStatement { sql, params }
}

pub(crate) fn post_statement(query: &KeysetQuery<PostFilter>) -> ListingStatement {
    let filter = &query.filters;
    let mut params = SqlParams::new();
    let viewer = params.bind(filter.viewer_id.clone().unwrap_or_default());

    let mut conditions = Vec::new();
    if let Some(post_id) = filter.post_id {
        conditions.push(format!("post_id = {}", params.bind(post_id)));
    }
    if let Some(topic_id) = filter.topic_id {
        conditions.push(format!("topic_id = {}", params.bind(topic_id)));
    }
    if let Some(search) = &filter.search {
        conditions.push(format!(
            "string::contains(string::lowercase(title), {})",
            params.bind(search.as_str())
        ));
    }
    if filter.followed_only {
        conditions.push(format!("topic_id IN {}", followed_topics(&viewer)));
    }

    let mut source = format!("SELECT {} FROM post", post_projection(&viewer));
    if !conditions.is_empty() {
        source.push_str(" WHERE ");
        source.push_str(&conditions.join(" AND "));
    }
    keyset_statement(source, &query.predicate, query.limit, params)
}

/// Followed-topic posts together with public-topic posts outside the followed
/// set, each row flagged by `is_following`.
pub(crate) fn feed_statement(query: &KeysetQuery<FeedFilter>) -> ListingStatement {
    let mut params = SqlParams::new();
    let viewer = params.bind(query.filters.viewer_id.as_str());
    let source = format!(
        "SELECT {} FROM post WHERE topic_id IN {} \
         OR topic_id IN (SELECT VALUE topic_id FROM topic WHERE visibility = 'public')",
        post_projection(&viewer),
        followed_topics(&viewer),
    );
    keyset_statement(source, &query.predicate, query.limit, params)
}

pub(crate) fn comment_statement(query: &KeysetQuery<CommentFilter>) -> ListingStatement {
    let filter = &query.filters;
    let mut params = SqlParams::new();
    let viewer = params.bind(filter.viewer_id.clone().unwrap_or_default());
    let mut source = format!(
        "SELECT {} FROM comment WHERE post_id = {}",
        comment_projection(&viewer),
        params.bind(filter.post_id),
    );
    if filter.top_level_only {
        source.push_str(" AND parent_comment_id = NONE");
    }
    keyset_statement(source, &query.predicate, query.limit, params)
}

pub(crate) fn topic_statement(query: &KeysetQuery<TopicFilter>) -> ListingStatement {
    let filter = &query.filters;
    let mut params = SqlParams::new();
    let viewer = params.bind(filter.viewer_id.clone().unwrap_or_default());
    let scope = match filter.topic_id {
        Some(topic_id) => format!("topic_id = {}", params.bind(topic_id)),
        None => "visibility = 'public'".to_string(),
    };
    let mut source = format!(
        "SELECT {} FROM topic WHERE {scope}",
        topic_projection(&viewer)
    );
    if let Some(search) = &filter.search {
        source.push_str(&format!(
            " AND string::contains(string::lowercase(name), {})",
            params.bind(search.as_str())
        ));
    }
    keyset_statement(source, &query.predicate, query.limit, params)
}

fn vote_table(target: VoteTarget) -> (&'static str, &'static str, i64) {
    match target {
        VoteTarget::Post(post_id) => ("post_vote", "post_id", post_id),
        VoteTarget::Comment(comment_id) => ("comment_vote", "comment_id", comment_id),
    }
}

pub struct SurrealForumStore {
    client: Arc<Surreal<Client>>,
}

impl SurrealForumStore {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }

    pub async fn new(db_config: &DbConfig) -> anyhow::Result<Self> {
        Ok(Self::with_client(Arc::new(connect(db_config).await?)))
    }

    fn map_surreal_error(err: surrealdb::Error) -> DomainError {
        let message = err.to_string().to_lowercase();
        if message.contains("already exists")
            || message.contains("already contains")
            || message.contains("unique")
        {
            return DomainError::Conflict;
        }
        DomainError::Storage(format!("surreal query failed: {message}"))
    }

    fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>, entity: &str) -> DomainResult<Vec<T>> {
        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|err| DomainError::Storage(format!("invalid {entity} row: {err}")))
            })
            .collect()
    }

    async fn fetch_listing<T: DeserializeOwned>(
        &self,
        kind: ListingKind,
        statement: ListingStatement,
    ) -> DomainResult<Vec<T>> {
        let started = std::time::Instant::now();
        let mut pending = self.client.query(statement.sql);
        for (name, value) in statement.params.into_bindings() {
            pending = pending.bind((name, value.to_json()));
        }
        let mut response = pending.await.map_err(Self::map_surreal_error)?;
        let rows: Vec<Value> = response
            .take(0)
            .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;

        histogram!(LISTING_QUERY_SECONDS, "listing" => kind.as_str())
            .record(started.elapsed().as_secs_f64());
        counter!(LISTING_ROWS_TOTAL, "listing" => kind.as_str()).increment(rows.len() as u64);
        Self::decode_rows(rows, kind.as_str())
    }

    async fn insert_with_sequence(
        &self,
        table: &'static str,
        id_field: &'static str,
        content: Value,
    ) -> DomainResult<Value> {
        // Statement results: 0 = LET, 1 = CREATE, 2 = UPDATE with the id stamped.
        let sql = format!(
            "LET $seq = (UPSERT ONLY sequence:{table} SET value += 1).value; \
             CREATE type::thing('{table}', $seq) CONTENT $content RETURN NONE; \
             UPDATE type::thing('{table}', $seq) SET {id_field} = $seq;"
        );
        let mut response = self
            .client
            .query(sql)
            .bind(("content", content))
            .await
            .map_err(Self::map_surreal_error)?;
        let mut rows: Vec<Value> = response
            .take(2)
            .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;
        rows.pop()
            .ok_or_else(|| DomainError::Storage(format!("create on {table} returned no row")))
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        sql: &'static str,
        id: i64,
        entity: &str,
    ) -> DomainResult<Option<T>> {
        let mut response = self
            .client
            .query(sql)
            .bind(("id", id))
            .await
            .map_err(Self::map_surreal_error)?;
        let rows: Vec<Value> = response
            .take(0)
            .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;
        Ok(Self::decode_rows(rows, entity)?.pop())
    }

    /// Runs `sql` and returns the rows of the statement at `index`.
    async fn query_rows(
        &self,
        sql: String,
        bindings: Vec<(&'static str, Value)>,
        index: usize,
    ) -> DomainResult<Vec<Value>> {
        let mut pending = self.client.query(sql);
        for binding in bindings {
            pending = pending.bind(binding);
        }
        let mut response = pending.await.map_err(Self::map_surreal_error)?;
        response
            .take(index)
            .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))
    }

    /// Ids of the comments replying to any of `parents`, at any depth.
    async fn reply_ids(&self, parents: Vec<i64>) -> DomainResult<Vec<i64>> {
        let mut replies = Vec::new();
        let mut frontier = parents;
        while !frontier.is_empty() {
            let rows = self
                .query_rows(
                    "SELECT VALUE comment_id FROM comment WHERE parent_comment_id IN $ids"
                        .to_string(),
                    vec![("ids", Value::from(frontier))],
                    0,
                )
                .await?;
            frontier = Self::decode_rows(rows, "comment id")?;
            replies.extend_from_slice(&frontier);
        }
        Ok(replies)
    }

    async fn run_statement(
        &self,
        sql: String,
        bindings: Vec<(&'static str, Value)>,
    ) -> DomainResult<()> {
        let mut pending = self.client.query(sql);
        for binding in bindings {
            pending = pending.bind(binding);
        }
        pending
            .await
            .map_err(Self::map_surreal_error)?
            .check()
            .map_err(Self::map_surreal_error)?;
        Ok(())
    }
}

fn decode_one<T: DeserializeOwned>(row: Value, entity: &str) -> DomainResult<T> {
    serde_json::from_value(row)
        .map_err(|err| DomainError::Storage(format!("invalid {entity} row: {err}")))
}

impl ForumRepository for SurrealForumStore {
    fn insert_topic(&self, topic: &NewTopic) -> BoxFuture<'_, DomainResult<Topic>> {
        let content = serde_json::json!({
            "name": topic.name,
            "description": topic.description,
            "creator_id": topic.creator_id,
            "visibility": topic.visibility,
            "created_at_ms": topic.created_at_ms,
        });
        Box::pin(async move {
            let row = self.insert_with_sequence("topic", "topic_id", content).await?;
            decode_one(row, "topic")
        })
    }

    fn get_topic(&self, topic_id: i64) -> BoxFuture<'_, DomainResult<Option<Topic>>> {
        Box::pin(self.select_one(
            "SELECT topic_id, name, description, creator_id, visibility, created_at_ms \
             FROM topic WHERE topic_id = $id LIMIT 1",
            topic_id,
            "topic",
        ))
    }

    fn insert_post(&self, post: &NewPost) -> BoxFuture<'_, DomainResult<Post>> {
        let content = serde_json::json!({
            "topic_id": post.topic_id,
            "author_id": post.author_id,
            "title": post.title,
            "content": post.content,
            "created_at_ms": post.created_at_ms,
        });
        Box::pin(async move {
            let row = self.insert_with_sequence("post", "post_id", content).await?;
            decode_one(row, "post")
        })
    }

    fn get_post(&self, post_id: i64) -> BoxFuture<'_, DomainResult<Option<Post>>> {
        Box::pin(self.select_one(
            "SELECT post_id, topic_id, author_id, title, content, created_at_ms, updated_at_ms \
             FROM post WHERE post_id = $id LIMIT 1",
            post_id,
            "post",
        ))
    }

    fn update_post(
        &self,
        post_id: i64,
        changes: &PostChanges,
    ) -> BoxFuture<'_, DomainResult<Option<Post>>> {
        let sql = format!(
            "UPDATE post SET title = $title, content = $content, updated_at_ms = $updated_at_ms \
             WHERE post_id = $id RETURN {POST_FIELDS};"
        );
        let bindings = vec![
            ("id", Value::from(post_id)),
            ("title", Value::from(changes.title.as_str())),
            ("content", Value::from(changes.content.as_str())),
            ("updated_at_ms", Value::from(changes.updated_at_ms)),
        ];
        Box::pin(async move {
            let rows = self.query_rows(sql, bindings, 0).await?;
            Ok(Self::decode_rows(rows, "post")?.pop())
        })
    }

    fn delete_post(&self, post_id: i64) -> BoxFuture<'_, DomainResult<bool>> {
        // Statement 0 reports whether the post existed; the rest cascade.
        let sql = "DELETE post WHERE post_id = $id RETURN BEFORE; \
                   LET $doomed = (SELECT VALUE comment_id FROM comment WHERE post_id = $id); \
                   DELETE comment_vote WHERE comment_id IN $doomed; \
                   DELETE comment WHERE post_id = $id; \
                   DELETE post_vote WHERE post_id = $id; \
                   DELETE post_bookmark WHERE post_id = $id;";
        Box::pin(async move {
            let rows = self
                .query_rows(sql.to_string(), vec![("id", Value::from(post_id))], 0)
                .await?;
            Ok(!rows.is_empty())
        })
    }

    fn insert_comment(&self, comment: &NewComment) -> BoxFuture<'_, DomainResult<Comment>> {
        let content = serde_json::json!({
            "post_id": comment.post_id,
            "author_id": comment.author_id,
            "parent_comment_id": comment.parent_comment_id,
            "content": comment.content,
            "created_at_ms": comment.created_at_ms,
        });
        Box::pin(async move {
            let row = self
                .insert_with_sequence("comment", "comment_id", content)
                .await?;
            decode_one(row, "comment")
        })
    }

    fn get_comment(&self, comment_id: i64) -> BoxFuture<'_, DomainResult<Option<Comment>>> {
        Box::pin(self.select_one(
            "SELECT comment_id, post_id, author_id, parent_comment_id, content, created_at_ms, \
             updated_at_ms FROM comment WHERE comment_id = $id LIMIT 1",
            comment_id,
            "comment",
        ))
    }

    fn update_comment(
        &self,
        comment_id: i64,
        changes: &CommentChanges,
    ) -> BoxFuture<'_, DomainResult<Option<Comment>>> {
        let sql = format!(
            "UPDATE comment SET content = $content, updated_at_ms = $updated_at_ms \
             WHERE comment_id = $id RETURN {COMMENT_FIELDS};"
        );
        let bindings = vec![
            ("id", Value::from(comment_id)),
            ("content", Value::from(changes.content.as_str())),
            ("updated_at_ms", Value::from(changes.updated_at_ms)),
        ];
        Box::pin(async move {
            let rows = self.query_rows(sql, bindings, 0).await?;
            Ok(Self::decode_rows(rows, "comment")?.pop())
        })
    }

    fn delete_comment(&self, comment_id: i64) -> BoxFuture<'_, DomainResult<bool>> {
        Box::pin(async move {
            let mut doomed = vec![comment_id];
            doomed.extend(self.reply_ids(vec![comment_id]).await?);
            let rows = self
                .query_rows(
                    "DELETE comment WHERE comment_id IN $ids RETURN BEFORE; \
                     DELETE comment_vote WHERE comment_id IN $ids;"
                        .to_string(),
                    vec![("ids", Value::from(doomed))],
                    0,
                )
                .await?;
            Ok(!rows.is_empty())
        })
    }

    fn set_vote(
        &self,
        user_id: &str,
        target: VoteTarget,
        value: i8,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let (table, id_field, target_id) = vote_table(target);
        let sql = if value == 0 {
            format!("DELETE type::thing('{table}', [$target_id, $user_id]);")
        } else {
            format!(
                "UPSERT type::thing('{table}', [$target_id, $user_id]) \
                 CONTENT {{ {id_field}: $target_id, user_id: $user_id, vote: $vote }};"
            )
        };
        let bindings = vec![
            ("target_id", Value::from(target_id)),
            ("user_id", Value::from(user_id)),
            ("vote", Value::from(i64::from(value))),
        ];
        Box::pin(self.run_statement(sql, bindings))
    }

    fn set_follow(
        &self,
        user_id: &str,
        topic_id: i64,
        following: bool,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let sql = if following {
            "UPSERT type::thing('topic_follow', [$user_id, $topic_id]) \
             CONTENT { user_id: $user_id, topic_id: $topic_id };"
        } else {
            "DELETE type::thing('topic_follow', [$user_id, $topic_id]);"
        };
        let bindings = vec![
            ("user_id", Value::from(user_id)),
            ("topic_id", Value::from(topic_id)),
        ];
        Box::pin(self.run_statement(sql.to_string(), bindings))
    }

    fn set_bookmark(
        &self,
        user_id: &str,
        post_id: i64,
        bookmarked: bool,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let sql = if bookmarked {
            "UPSERT type::thing('post_bookmark', [$user_id, $post_id]) \
             CONTENT { user_id: $user_id, post_id: $post_id };"
        } else {
            "DELETE type::thing('post_bookmark', [$user_id, $post_id]);"
        };
        let bindings = vec![
            ("user_id", Value::from(user_id)),
            ("post_id", Value::from(post_id)),
        ];
        Box::pin(self.run_statement(sql.to_string(), bindings))
    }
}

impl KeysetExecutor<PostListing, PostFilter> for SurrealForumStore {
    fn run<'a>(
        &'a self,
        query: &'a KeysetQuery<PostFilter>,
    ) -> BoxFuture<'a, DomainResult<Vec<PostListing>>> {
        Box::pin(self.fetch_listing(ListingKind::Posts, post_statement(query)))
    }
}

impl KeysetExecutor<PostListing, FeedFilter> for SurrealForumStore {
    fn run<'a>(
        &'a self,
        query: &'a KeysetQuery<FeedFilter>,
    ) -> BoxFuture<'a, DomainResult<Vec<PostListing>>> {
        Box::pin(self.fetch_listing(ListingKind::FollowFeed, feed_statement(query)))
    }
}

impl KeysetExecutor<CommentListing, CommentFilter> for SurrealForumStore {
    fn run<'a>(
        &'a self,
        query: &'a KeysetQuery<CommentFilter>,
    ) -> BoxFuture<'a, DomainResult<Vec<CommentListing>>> {
        Box::pin(self.fetch_listing(ListingKind::Comments, comment_statement(query)))
    }
}

impl KeysetExecutor<TopicListing, TopicFilter> for SurrealForumStore {
    fn run<'a>(
        &'a self,
        query: &'a KeysetQuery<TopicFilter>,
    ) -> BoxFuture<'a, DomainResult<Vec<TopicListing>>> {
        Box::pin(self.fetch_listing(ListingKind::Topics, topic_statement(query)))
    }
}

#[cfg(test)]
mod tests {
    use agora_domain::pagination::{FieldValues, SortMode, tuple_for};

    use super::*;

    fn query<F>(
        kind: ListingKind,
        mode: SortMode,
        boundary: Option<FieldValues>,
        filters: F,
    ) -> KeysetQuery<F> {
        let tuple = tuple_for(kind, mode).expect("tuple");
        KeysetQuery {
            predicate: SeekPredicate::build(tuple, boundary).expect("predicate"),
            filters,
            limit: 21,
        }
    }

    #[test]
    fn first_page_of_posts_orders_without_seek() {
        let statement = post_statement(&query(
            ListingKind::Posts,
            SortMode::Hot,
            None,
            PostFilter::default(),
        ));
        assert!(statement.sql.starts_with("SELECT * FROM (SELECT post_id AS id, "));
        assert!(statement.sql.ends_with(
            ") ORDER BY score DESC, secondary_count DESC, created_date DESC, id DESC LIMIT $p2"
        ));
        assert!(!statement.sql.contains(") WHERE ("));
        assert_eq!(
            statement.params.values(),
            &[FieldValue::Text(String::new()), FieldValue::Int(21)]
        );
    }

    #[test]
    fn aggregates_are_coalesced_in_the_projection() {
        let statement = post_statement(&query(
            ListingKind::Posts,
            SortMode::Hot,
            None,
            PostFilter::default(),
        ));
        assert!(statement.sql.contains(
            "(math::sum((SELECT VALUE vote FROM post_vote WHERE post_id = $parent.post_id)) ?? 0) AS score"
        ));
        assert!(statement.sql.contains(
            "(count((SELECT VALUE comment_id FROM comment WHERE post_id = $parent.post_id)) ?? 0) AS secondary_count"
        ));
    }

    #[test]
    fn filters_bind_before_the_seek_boundary() {
        let boundary = FieldValues::new(vec![
            FieldValue::Int(3),
            FieldValue::Int(1),
            FieldValue::Timestamp(100),
            FieldValue::Int(9),
        ]);
        let statement = post_statement(&query(
            ListingKind::Posts,
            SortMode::Hot,
            Some(boundary),
            PostFilter {
                viewer_id: Some("u1".into()),
                search: Some("rust".into()),
                topic_id: Some(4),
                followed_only: true,
                post_id: None,
            },
        ));
        assert!(statement.sql.contains(
            "WHERE topic_id = $p2 AND string::contains(string::lowercase(title), $p3) \
             AND topic_id IN (SELECT VALUE topic_id FROM topic_follow WHERE user_id = $p1)"
        ));
        assert!(statement.sql.contains(") WHERE ((score < $p4) OR "));
        assert!(statement.sql.ends_with("LIMIT $p8"));
        let names: Vec<String> = statement
            .params
            .into_bindings()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn feed_unions_followed_and_public_topics() {
        let statement = feed_statement(&query(
            ListingKind::FollowFeed,
            SortMode::New,
            None,
            FeedFilter {
                viewer_id: "u1".into(),
            },
        ));
        assert!(statement.sql.contains(
            "FROM post WHERE topic_id IN (SELECT VALUE topic_id FROM topic_follow WHERE user_id = $p1) \
             OR topic_id IN (SELECT VALUE topic_id FROM topic WHERE visibility = 'public')"
        ));
        assert!(statement.sql.contains(
            "ORDER BY is_following DESC, created_date DESC, score DESC, secondary_count DESC, id DESC"
        ));
    }

    #[test]
    fn top_level_comments_exclude_replies() {
        let statement = comment_statement(&query(
            ListingKind::Comments,
            SortMode::New,
            None,
            CommentFilter {
                viewer_id: None,
                post_id: 7,
                top_level_only: true,
            },
        ));
        assert!(statement.sql.contains(
            "FROM comment WHERE post_id = $p2 AND parent_comment_id = NONE"
        ));
        assert_eq!(statement.params.values()[1], FieldValue::Int(7));
    }

    #[test]
    fn topics_alpha_orders_by_name_projected_as_title() {
        let statement = topic_statement(&query(
            ListingKind::Topics,
            SortMode::Alpha,
            None,
            TopicFilter {
                viewer_id: None,
                search: Some("gar".into()),
                topic_id: None,
            },
        ));
        assert!(statement.sql.contains("name AS title"));
        assert!(statement.sql.contains(
            "WHERE visibility = 'public' AND string::contains(string::lowercase(name), $p2)"
        ));
        assert!(statement.sql.contains("ORDER BY title ASC, created_date DESC, id DESC"));
    }

    #[test]
    fn single_post_lookup_filters_by_id() {
        let statement = post_statement(&query(
            ListingKind::Posts,
            SortMode::Hot,
            None,
            PostFilter {
                viewer_id: Some("u1".into()),
                post_id: Some(12),
                ..PostFilter::default()
            },
        ));
        assert!(statement.sql.contains("FROM post WHERE post_id = $p2"));
        assert_eq!(statement.params.values()[1], FieldValue::Int(12));
    }

    #[test]
    fn single_topic_lookup_skips_the_visibility_filter() {
        let statement = topic_statement(&query(
            ListingKind::Topics,
            SortMode::Hot,
            None,
            TopicFilter {
                topic_id: Some(3),
                ..TopicFilter::default()
            },
        ));
        assert!(statement.sql.contains("FROM topic WHERE topic_id = $p2"));
        assert!(!statement.sql.contains("visibility = 'public'"));
    }
}
