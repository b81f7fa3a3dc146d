use axum::extract::rejection::QueryRejection;
use axum::extract::{Extension, Path, Query, State};
use axum::{
    Json, Router,
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use agora_domain::error::DomainError;
use agora_domain::forum::{
    Comment, CommentCreate, CommentListing, Post, PostCreate, PostListing, PostUpdate, Topic,
    TopicCreate, TopicListing, TopicVisibility,
};
use agora_domain::identity::ActorIdentity;
use agora_domain::listing::{CommentListQuery, FeedListQuery, PostListQuery, TopicListQuery};
use agora_domain::pagination::{Page, PaginationError, SortMode};

use crate::middleware::{AuthContext, CorrelationId};
use crate::{
    error::ApiError, middleware as app_middleware, observability, state::AppState, validation,
};

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/feed", get(list_follow_feed))
        .route("/v1/topics", post(create_topic))
        .route("/v1/topics/:topic_id/posts", post(create_post))
        .route(
            "/v1/posts/:post_id",
            patch(update_post).delete(delete_post),
        )
        .route("/v1/posts/:post_id/comments", post(create_comment))
        .route("/v1/posts/:post_id/vote", put(vote_post))
        .route(
            "/v1/comments/:comment_id",
            patch(update_comment).delete(delete_comment),
        )
        .route("/v1/comments/:comment_id/vote", put(vote_comment))
        .route(
            "/v1/topics/:topic_id/follow",
            put(follow_topic).delete(unfollow_topic),
        )
        .route(
            "/v1/posts/:post_id/bookmark",
            put(bookmark_post).delete(unbookmark_post),
        )
        .route_layer(middleware::from_fn(app_middleware::require_auth_middleware));

    let public = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/posts", get(list_posts))
        .route("/v1/posts/:post_id", get(get_post))
        .route("/v1/topics", get(list_topics))
        .route("/v1/topics/:topic_id", get(get_topic))
        .route("/v1/posts/:post_id/comments", get(list_comments));

    let mut app = public
        .merge(protected)
        .layer(middleware::from_fn(app_middleware::metrics_layer))
        .layer(app_middleware::timeout_layer(state.config.request_timeout_ms))
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(
            app_middleware::correlation_id_middleware,
        ));

    if !state.config.is_test() {
        app = app.layer(app_middleware::rate_limit_layer());
    }

    app.with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    backend: &'static str,
}

async fn health(State(state): State<AppState>) -> Response {
    let (status_code, status) = match state.db.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(err) => {
            tracing::warn!(error = %err, backend = state.db.backend(), "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };
    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
        backend: state.db.backend(),
    };
    (status_code, Json(body)).into_response()
}

async fn metrics() -> Response {
    match observability::render_metrics() {
        Some(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => ApiError::NotFound.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct PostListParams {
    sort_by: Option<String>,
    cursor: Option<String>,
    limit: Option<String>,
    search: Option<String>,
    topic_id: Option<i64>,
    #[serde(default)]
    followed_only: bool,
}

#[derive(Debug, Default, Deserialize)]
struct FeedParams {
    sort_by: Option<String>,
    cursor: Option<String>,
    limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CommentListParams {
    sort_by: Option<String>,
    cursor: Option<String>,
    limit: Option<String>,
    #[serde(default)]
    top_level_only: bool,
}

#[derive(Debug, Default, Deserialize)]
struct TopicListParams {
    sort_by: Option<String>,
    cursor: Option<String>,
    limit: Option<String>,
    search: Option<String>,
}

async fn list_posts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    query: Result<Query<PostListParams>, QueryRejection>,
) -> Result<Json<Page<PostListing>>, ApiError> {
    let params = validation::query_params(query)?;
    let page = state
        .listings
        .list_posts(PostListQuery {
            viewer_id: auth.viewer_id(),
            limit: validation::page_size(params.limit.as_deref())?,
            sort_mode: params.sort_by.clone(),
            cursor: params.cursor,
            search: params.search,
            topic_id: params.topic_id,
            followed_only: params.followed_only,
        })
        .await
        .map_err(map_domain_error)?;
    record_page("posts", params.sort_by.as_deref(), &page);
    Ok(Json(page))
}

async fn list_follow_feed(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    query: Result<Query<FeedParams>, QueryRejection>,
) -> Result<Json<Page<PostListing>>, ApiError> {
    let params = validation::query_params(query)?;
    let actor = actor_identity(&auth)?;
    let page = state
        .listings
        .list_follow_feed(FeedListQuery {
            viewer_id: actor.user_id,
            limit: validation::page_size(params.limit.as_deref())?,
            sort_mode: params.sort_by.clone(),
            cursor: params.cursor,
        })
        .await
        .map_err(map_domain_error)?;
    record_page("follow_feed", params.sort_by.as_deref(), &page);
    Ok(Json(page))
}

async fn list_comments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<i64>,
    query: Result<Query<CommentListParams>, QueryRejection>,
) -> Result<Json<Page<CommentListing>>, ApiError> {
    let params = validation::query_params(query)?;
    let page = state
        .listings
        .list_comments(CommentListQuery {
            viewer_id: auth.viewer_id(),
            post_id,
            limit: validation::page_size(params.limit.as_deref())?,
            sort_mode: params.sort_by.clone(),
            cursor: params.cursor,
            top_level_only: params.top_level_only,
        })
        .await
        .map_err(map_domain_error)?;
    record_page("comments", params.sort_by.as_deref(), &page);
    Ok(Json(page))
}

async fn list_topics(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    query: Result<Query<TopicListParams>, QueryRejection>,
) -> Result<Json<Page<TopicListing>>, ApiError> {
    let params = validation::query_params(query)?;
    let page = state
        .listings
        .list_topics(TopicListQuery {
            viewer_id: auth.viewer_id(),
            limit: validation::page_size(params.limit.as_deref())?,
            sort_mode: params.sort_by.clone(),
            cursor: params.cursor,
            search: params.search,
        })
        .await
        .map_err(map_domain_error)?;
    record_page("topics", params.sort_by.as_deref(), &page);
    Ok(Json(page))
}

async fn get_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<i64>,
) -> Result<Json<PostListing>, ApiError> {
    let post = state
        .listings
        .get_post(auth.viewer_id(), post_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(post))
}

async fn get_topic(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(topic_id): Path<i64>,
) -> Result<Json<TopicListing>, ApiError> {
    let topic = state
        .listings
        .get_topic(auth.viewer_id(), topic_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(topic))
}

fn record_page<T>(listing: &'static str, sort_by: Option<&str>, page: &Page<T>) {
    let sort_mode = sort_by
        .and_then(SortMode::parse)
        .unwrap_or_default()
        .as_str();
    observability::register_listing_page(listing, sort_mode, page.has_more(), page.items.len());
}

#[derive(Debug, Deserialize, Validate)]
struct CreateTopicRequest {
    #[validate(length(min = 1, max = 100))]
    name: String,
    #[validate(length(max = 1000))]
    description: Option<String>,
    #[serde(default)]
    visibility: TopicVisibility,
}

async fn create_topic(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(correlation): Extension<CorrelationId>,
    Json(payload): Json<CreateTopicRequest>,
) -> Result<(StatusCode, Json<Topic>), ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let topic = state
        .forum
        .create_topic(
            &actor,
            TopicCreate {
                name: payload.name,
                description: payload.description,
                visibility: payload.visibility,
            },
        )
        .await
        .map_err(map_domain_error)?;
    tracing::debug!(correlation_id = %correlation.0, topic_id = topic.topic_id, "create_topic");
    Ok((StatusCode::CREATED, Json(topic)))
}

#[derive(Debug, Deserialize, Validate)]
struct CreatePostRequest {
    #[validate(length(min = 1, max = 300))]
    title: String,
    #[validate(length(min = 1, max = 40000))]
    content: String,
}

async fn create_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(topic_id): Path<i64>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let post = state
        .forum
        .create_post(
            &actor,
            topic_id,
            PostCreate {
                title: payload.title,
                content: payload.content,
            },
        )
        .await
        .map_err(map_domain_error)?;
    Ok((StatusCode::CREATED, Json(post)))
}

#[derive(Debug, Deserialize, Validate)]
struct UpdatePostRequest {
    #[validate(length(min = 1, max = 300))]
    title: String,
    #[validate(length(min = 1, max = 40000))]
    content: String,
}

async fn update_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<i64>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<Json<Post>, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let post = state
        .forum
        .update_post(
            &actor,
            post_id,
            PostUpdate {
                title: payload.title,
                content: payload.content,
            },
        )
        .await
        .map_err(map_domain_error)?;
    Ok(Json(post))
}

async fn delete_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_identity(&auth)?;
    state
        .forum
        .delete_post(&actor, post_id)
        .await
        .map_err(map_domain_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
struct CreateCommentRequest {
    #[validate(length(min = 1, max = 40000))]
    content: String,
    parent_comment_id: Option<i64>,
}

async fn create_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<i64>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let comment = state
        .forum
        .create_comment(
            &actor,
            post_id,
            CommentCreate {
                content: payload.content,
                parent_comment_id: payload.parent_comment_id,
            },
        )
        .await
        .map_err(map_domain_error)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateCommentRequest {
    #[validate(length(min = 1, max = 40000))]
    content: String,
}

async fn update_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(comment_id): Path<i64>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<Json<Comment>, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let comment = state
        .forum
        .update_comment(&actor, comment_id, &payload.content)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(comment))
}

async fn delete_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(comment_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_identity(&auth)?;
    state
        .forum
        .delete_comment(&actor, comment_id)
        .await
        .map_err(map_domain_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
struct VoteRequest {
    #[validate(range(min = -1, max = 1))]
    value: i64,
}

async fn vote_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<i64>,
    Json(payload): Json<VoteRequest>,
) -> Result<StatusCode, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    state
        .forum
        .vote_post(&actor, post_id, payload.value)
        .await
        .map_err(map_domain_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn vote_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(comment_id): Path<i64>,
    Json(payload): Json<VoteRequest>,
) -> Result<StatusCode, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    state
        .forum
        .vote_comment(&actor, comment_id, payload.value)
        .await
        .map_err(map_domain_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn follow_topic(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(topic_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_identity(&auth)?;
    state
        .forum
        .follow_topic(&actor, topic_id)
        .await
        .map_err(map_domain_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unfollow_topic(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(topic_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_identity(&auth)?;
    state
        .forum
        .unfollow_topic(&actor, topic_id)
        .await
        .map_err(map_domain_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn bookmark_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_identity(&auth)?;
    state
        .forum
        .bookmark_post(&actor, post_id)
        .await
        .map_err(map_domain_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unbookmark_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_identity(&auth)?;
    state
        .forum
        .unbookmark_post(&actor, post_id)
        .await
        .map_err(map_domain_error)?;
    Ok(StatusCode::NO_CONTENT)
}

fn actor_identity(auth: &AuthContext) -> Result<ActorIdentity, ApiError> {
    auth.viewer_id()
        .map(ActorIdentity::with_user_id)
        .ok_or(ApiError::Unauthorized)
}

fn map_domain_error(err: DomainError) -> ApiError {
    match err {
        DomainError::Validation(message) => ApiError::Validation(message),
        DomainError::NotFound => ApiError::NotFound,
        DomainError::Forbidden => ApiError::Forbidden,
        DomainError::Conflict => ApiError::Conflict,
        DomainError::Pagination(err) => map_pagination_error(err),
        DomainError::Storage(message) => {
            tracing::error!(error = %message, "storage failure");
            ApiError::Internal
        }
    }
}

fn map_pagination_error(err: PaginationError) -> ApiError {
    match &err {
        PaginationError::InvalidPageSize(_) => ApiError::InvalidPageSize(err.to_string()),
        PaginationError::InvalidCursor(_) => ApiError::InvalidCursor(err.to_string()),
        PaginationError::UnsupportedSortMode { .. } => {
            ApiError::UnsupportedSortMode(err.to_string())
        }
        PaginationError::MissingSortValue(_) | PaginationError::InvalidSortValue(_) => {
            tracing::error!(error = %err, "listing row does not satisfy its sort key");
            ApiError::Internal
        }
    }
}
