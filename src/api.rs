use crate::auth::Admin;
use crate::buckets::{bucketize, Bucket, Period};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{PageQuery, Pagination};
use crate::rollup::{rollup, CategoryShare, UNKNOWN_COUNTRY, UNKNOWN_DEVICE};
use crate::state::AppState;
use crate::store::{Comment, Post, PostFields, PostWrite};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};

const MAX_COMMENT_CHARS: usize = 5_000;
const ANONYMOUS: &str = "Anonymous";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/posts", get(list_published_posts))
        .route("/api/posts/:slug", get(show_post))
        .route(
            "/api/posts/:slug/comments",
            get(list_post_comments).post(create_comment),
        )
        .route("/api/admin/posts", get(list_all_posts).post(create_post))
        .route("/api/admin/posts/:id", put(update_post).delete(delete_post))
        .route("/api/admin/comments", get(moderation_queue))
        .route("/api/admin/comments/:id", delete(delete_comment))
        .route("/api/admin/comments/:id/approve", put(approve_comment))
        .route("/api/admin/stats/growth", get(growth))
        .route("/api/admin/stats/engagement", get(engagement))
        .route("/api/admin/stats/traffic", get(traffic))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct Paged<T> {
    data: Vec<T>,
    count: i64,
    page: i64,
    limit: i64,
}

impl<T> Paged<T> {
    fn new(data: Vec<T>, count: i64, pagination: Pagination) -> Self {
        Self {
            data,
            count,
            page: pagination.page,
            limit: pagination.limit,
        }
    }
}

async fn list_published_posts(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Json<Paged<Post>>> {
    let pagination = q.parse(state.max_page_size)?;
    let (posts, count) = state.store.list_posts(pagination.range, true).await?;
    Ok(Json(Paged::new(posts, count, pagination)))
}

async fn list_all_posts(
    _admin: Admin,
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Json<Paged<Post>>> {
    let pagination = q.parse(state.max_page_size)?;
    let (posts, count) = state.store.list_posts(pagination.range, false).await?;
    Ok(Json(Paged::new(posts, count, pagination)))
}

async fn show_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Post>> {
    published_post(&state, &slug).await.map(Json)
}

async fn published_post(state: &AppState, slug: &str) -> ApiResult<Post> {
    state
        .store
        .post_by_slug(slug, true)
        .await?
        .ok_or(ApiError::NotFound("post"))
}

#[derive(Deserialize)]
struct PostBody {
    title: String,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    excerpt: Option<String>,
    content: String,
    #[serde(default)]
    published: bool,
}

impl PostBody {
    fn into_fields(self) -> ApiResult<PostFields> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ApiError::InvalidArgument("title is required".into()));
        }
        if self.content.trim().is_empty() {
            return Err(ApiError::InvalidArgument("content is required".into()));
        }
        let slug = slugify(self.slug.as_deref().unwrap_or(&title));
        if slug.is_empty() {
            return Err(ApiError::InvalidArgument("slug has no usable characters".into()));
        }
        Ok(PostFields {
            title,
            slug,
            excerpt: self.excerpt.filter(|e| !e.trim().is_empty()),
            content: self.content,
            published: self.published,
        })
    }
}

fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    for c in raw.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn saved_post(write: PostWrite, slug: &str) -> ApiResult<Post> {
    match write {
        PostWrite::Saved(post) => Ok(post),
        PostWrite::NotFound => Err(ApiError::NotFound("post")),
        PostWrite::SlugTaken => Err(ApiError::Conflict(format!("slug {:?} is taken", slug))),
    }
}

async fn create_post(
    _admin: Admin,
    State(state): State<AppState>,
    Json(body): Json<PostBody>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let fields = body.into_fields()?;
    let slug = fields.slug.clone();
    let post = saved_post(state.store.create_post(fields, Utc::now()).await?, &slug)?;
    tracing::info!(id = post.id, slug = %post.slug, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

async fn update_post(
    _admin: Admin,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<PostBody>,
) -> ApiResult<Json<Post>> {
    let fields = body.into_fields()?;
    let slug = fields.slug.clone();
    let post = saved_post(state.store.update_post(id, fields, Utc::now()).await?, &slug)?;
    tracing::info!(id, "post updated");
    Ok(Json(post))
}

async fn delete_post(
    _admin: Admin,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if !state.store.delete_post(id).await? {
        return Err(ApiError::NotFound("post"));
    }
    tracing::info!(id, "post deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_post_comments(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Vec<Comment>>> {
    let post = published_post(&state, &slug).await?;
    Ok(Json(state.store.comments_for_post(post.id, true).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentBody {
    #[serde(default)]
    author_name: Option<String>,
    content: String,
}

async fn create_comment(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    admin: Option<Admin>,
    Json(body): Json<CommentBody>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let content = body.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::InvalidArgument("content is required".into()));
    }
    if content.chars().count() > MAX_COMMENT_CHARS {
        return Err(ApiError::InvalidArgument(format!(
            "content is longer than {} characters",
            MAX_COMMENT_CHARS
        )));
    }
    let author = body
        .author_name
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| ANONYMOUS.to_string());

    let post = published_post(&state, &slug).await?;
    let approved = admin.is_some();
    let comment = state
        .store
        .create_comment(post.id, author, content, approved, Utc::now())
        .await?;
    tracing::info!(id = comment.id, post_id = post.id, approved, "comment created");
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn moderation_queue(
    _admin: Admin,
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Json<Paged<Comment>>> {
    let pagination = q.parse(state.max_page_size)?;
    let (comments, count) = state.store.list_comments(pagination.range).await?;
    Ok(Json(Paged::new(comments, count, pagination)))
}

async fn approve_comment(
    _admin: Admin,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if !state.store.set_comment_approved(id, true).await? {
        return Err(ApiError::NotFound("comment"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_comment(
    _admin: Admin,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if !state.store.delete_comment(id).await? {
        return Err(ApiError::NotFound("comment"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct PeriodQuery {
    #[serde(default)]
    period: Option<String>,
}

impl PeriodQuery {
    fn period(&self) -> Period {
        Period::parse(self.period.as_deref())
    }
}

// Each chart keeps the key names its consumer already reads.

#[derive(Serialize)]
struct GrowthPoint {
    month: String,
    posts: i64,
}

#[derive(Serialize)]
struct EngagementPoint {
    month: String,
    value: i64,
}

#[derive(Serialize)]
struct TrafficPoint {
    month: String,
    visits: i64,
}

impl From<Bucket> for GrowthPoint {
    fn from(b: Bucket) -> Self {
        Self {
            month: b.label,
            posts: b.value,
        }
    }
}

impl From<Bucket> for EngagementPoint {
    fn from(b: Bucket) -> Self {
        Self {
            month: b.label,
            value: b.value,
        }
    }
}

impl From<Bucket> for TrafficPoint {
    fn from(b: Bucket) -> Self {
        Self {
            month: b.label,
            visits: b.value,
        }
    }
}

fn points<P: From<Bucket>>(buckets: Vec<Bucket>) -> Vec<P> {
    buckets.into_iter().map(P::from).collect()
}

async fn growth(
    _admin: Admin,
    State(state): State<AppState>,
    Query(q): Query<PeriodQuery>,
) -> ApiResult<Json<Vec<GrowthPoint>>> {
    let events = state.store.post_timestamps().await?;
    Ok(Json(points(bucketize(&events, q.period(), &Local::now()))))
}

async fn engagement(
    _admin: Admin,
    State(state): State<AppState>,
    Query(q): Query<PeriodQuery>,
) -> ApiResult<Json<Vec<EngagementPoint>>> {
    let events = state.store.comment_timestamps().await?;
    Ok(Json(points(bucketize(&events, q.period(), &Local::now()))))
}

#[derive(Serialize)]
struct Traffic {
    visits: Vec<TrafficPoint>,
    countries: Vec<CategoryShare>,
    devices: Vec<CategoryShare>,
}

async fn traffic(
    _admin: Admin,
    State(state): State<AppState>,
    Query(q): Query<PeriodQuery>,
) -> ApiResult<Json<Traffic>> {
    let store = &state.store;
    let (stamps, countries, devices) = tokio::try_join!(
        store.visit_timestamps(),
        store.visit_countries(),
        store.visit_devices(),
    )?;

    Ok(Json(Traffic {
        visits: points(bucketize(&stamps, q.period(), &Local::now())),
        countries: rollup(countries.iter().map(Option::as_deref), UNKNOWN_COUNTRY),
        devices: rollup(devices.iter().map(Option::as_deref), UNKNOWN_DEVICE),
    }))
}
