use anyhow::Result;
use std::time::{Duration, Instant};

use tower_http::services::ServeDir;
use tracing::warn;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::session::Session;
use super::{log_requests, state::*, ServerConfig};
use crate::catalog_store::{
    Article, ArticleSortBy, AudioStatus, BulkUpsertOutcome, InteractionKind, NewArticle, SortOrder,
};
use crate::error::{ServiceError, ServiceResult};
use crate::recommender::{RecommenderEvent, RecommenderSync};
use crate::user::{AuthToken, User};

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Dependency(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub articles_count: usize,
    pub session_token: Option<String>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        articles_count: state.catalog_store.get_articles_count(),
        session_token: session.map(|s| s.token),
    };
    Json(stats)
}

fn require_admin(session: &Session) -> ServiceResult<()> {
    if session.is_admin {
        Ok(())
    } else {
        Err(ServiceError::forbidden("admin access required"))
    }
}

fn validate_new_article(item: &NewArticle) -> ServiceResult<()> {
    if item.external_url.trim().is_empty() {
        return Err(ServiceError::bad_request("external_url must not be empty"));
    }
    if item.title.trim().is_empty() {
        return Err(ServiceError::bad_request("title must not be empty"));
    }
    Ok(())
}

/// The id used towards the recommendation service. Articles without an
/// upstream id fall back to their URL, which is unique too.
fn recommender_id(article: &Article) -> String {
    article
        .external_id
        .clone()
        .unwrap_or_else(|| article.external_url.clone())
}

fn recommender_labels(article: &Article) -> Vec<String> {
    let mut labels = article.tags.clone();
    if let Some(category) = &article.category {
        labels.push(category.clone());
    }
    labels
}

fn publish_item_upserted(recommender: &RecommenderSync, article: &Article) {
    recommender.publish(RecommenderEvent::ItemUpserted {
        external_id: recommender_id(article),
        title: article.title.clone(),
        labels: recommender_labels(article),
    });
}

/// Kick off enrichment for a freshly ingested article without blocking the
/// ingest response. Failures are retried later by the backlog job.
fn schedule_enrichment(pipeline: &OptionalPipeline, article_id: i64) {
    if let Some(pipeline) = pipeline.clone() {
        tokio::spawn(async move {
            if let Err(err) = pipeline.process(article_id).await {
                warn!(article_id, "Ingest-time enrichment failed: {}", err);
            }
        });
    }
}

async fn post_article(
    session: Session,
    State(state): State<ServerState>,
    Json(body): Json<NewArticle>,
) -> Response {
    if let Err(err) = require_admin(&session) {
        return err.into_response();
    }
    if let Err(err) = validate_new_article(&body) {
        return err.into_response();
    }
    match state.catalog_store.upsert_article(&body) {
        Ok(outcome) => {
            let status = if outcome.created {
                publish_item_upserted(&state.recommender, &outcome.article);
                schedule_enrichment(&state.pipeline, outcome.article.id);
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, Json(outcome)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct BulkUpsertBody {
    pub articles: Vec<NewArticle>,
}

async fn post_articles_bulk(
    session: Session,
    State(state): State<ServerState>,
    Json(body): Json<BulkUpsertBody>,
) -> Response {
    if let Err(err) = require_admin(&session) {
        return err.into_response();
    }
    if body.articles.len() > state.config.max_bulk_articles {
        return ServiceError::bad_request(format!(
            "at most {} articles per bulk request",
            state.config.max_bulk_articles
        ))
        .into_response();
    }

    let mut outcome = BulkUpsertOutcome {
        created_count: 0,
        existing_count: 0,
        skipped_count: 0,
        items: Vec::new(),
    };
    for item in &body.articles {
        if validate_new_article(item).is_err() {
            outcome.skipped_count += 1;
            continue;
        }
        match state.catalog_store.upsert_article(item) {
            Ok(item_outcome) => {
                if item_outcome.created {
                    outcome.created_count += 1;
                    publish_item_upserted(&state.recommender, &item_outcome.article);
                    schedule_enrichment(&state.pipeline, item_outcome.article.id);
                } else {
                    outcome.existing_count += 1;
                }
                outcome.items.push(item_outcome);
            }
            Err(err) => {
                warn!("Bulk upsert item failed, skipping: {}", err);
                outcome.skipped_count += 1;
            }
        }
    }
    Json(outcome).into_response()
}

async fn get_article(
    _session: Session,
    State(catalog_store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> Response {
    match catalog_store.get_article(id) {
        Ok(Some(article)) => Json(article).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => err.into_response(),
    }
}

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Deserialize, Debug)]
struct SearchParams {
    pub q: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub sort_by: Option<ArticleSortBy>,
    pub order: Option<SortOrder>,
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)
}

async fn search_articles(
    _session: Session,
    State(catalog_store): State<GuardedCatalogStore>,
    Query(params): Query<SearchParams>,
) -> Response {
    let query = params.q.unwrap_or_default();
    match catalog_store.search_articles(
        &query,
        params.page.unwrap_or(0),
        clamp_limit(params.limit),
        params.sort_by.unwrap_or_default(),
        params.order.unwrap_or_default(),
    ) {
        Ok(articles) => Json(articles).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn enrich_article(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Response {
    if let Err(err) = require_admin(&session) {
        return err.into_response();
    }
    let pipeline = match &state.pipeline {
        Some(pipeline) => pipeline,
        None => {
            return ServiceError::bad_request("enrichment is not configured").into_response();
        }
    };
    match pipeline.process(id).await {
        Ok(article) => Json(article).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn regenerate_summary(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Response {
    if let Err(err) = require_admin(&session) {
        return err.into_response();
    }
    let pipeline = match &state.pipeline {
        Some(pipeline) => pipeline,
        None => {
            return ServiceError::bad_request("enrichment is not configured").into_response();
        }
    };
    match pipeline.regenerate_summary(id).await {
        Ok(article) => Json(article).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn regenerate_audio(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Response {
    if let Err(err) = require_admin(&session) {
        return err.into_response();
    }
    let pipeline = match &state.pipeline {
        Some(pipeline) => pipeline,
        None => {
            return ServiceError::bad_request("enrichment is not configured").into_response();
        }
    };
    match pipeline.regenerate_audio(id) {
        Ok(scheduled) => Json(json!({ "scheduled": scheduled })).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_article_audio(
    _session: Session,
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Response {
    let article = match state.catalog_store.get_article(id) {
        Ok(Some(article)) => article,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => return err.into_response(),
    };
    if article.audio_status != AudioStatus::Ready {
        return StatusCode::NOT_FOUND.into_response();
    }
    let relative = match &article.audio_path {
        Some(path) => path,
        None => return StatusCode::NOT_FOUND.into_response(),
    };
    let path = match state.audio_store.resolve(relative) {
        Ok(path) => path,
        Err(err) => {
            warn!(article_id = id, "Bad audio path on article: {}", err);
            return StatusCode::NOT_FOUND.into_response();
        }
    };
    match std::fs::read(&path) {
        Ok(bytes) => {
            ([(header::CONTENT_TYPE, "audio/mpeg")], bytes).into_response()
        }
        Err(err) => {
            warn!(article_id = id, "Audio blob missing at {:?}: {}", path, err);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

#[derive(Deserialize, Debug)]
struct SetActiveBody {
    pub active: bool,
}

async fn put_article_active(
    session: Session,
    State(catalog_store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
    Json(body): Json<SetActiveBody>,
) -> Response {
    if let Err(err) = require_admin(&session) {
        return err.into_response();
    }
    match catalog_store.set_article_active(id, body.active) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn delete_article(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Response {
    if let Err(err) = require_admin(&session) {
        return err.into_response();
    }
    let audio_path = match state.catalog_store.get_article(id) {
        Ok(Some(article)) => article.audio_path,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => return err.into_response(),
    };
    match state.catalog_store.delete_article(id) {
        Ok(()) => {
            if let Some(path) = audio_path {
                state.audio_store.delete(&path);
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct CreateInteractionBody {
    pub kind: InteractionKind,
}

async fn post_interaction(
    session: Session,
    State(state): State<ServerState>,
    Path(article_id): Path<i64>,
    Json(body): Json<CreateInteractionBody>,
) -> Response {
    match state
        .catalog_store
        .create_interaction(session.user_id, article_id, body.kind)
    {
        Ok(interaction) => {
            if let Ok(Some(article)) = state.catalog_store.get_article(article_id) {
                state.recommender.publish(RecommenderEvent::Feedback {
                    user_id: session.user_id,
                    external_id: recommender_id(&article),
                    kind: body.kind.into(),
                });
            }
            (StatusCode::CREATED, Json(interaction)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn delete_interaction(
    session: Session,
    State(state): State<ServerState>,
    Path((article_id, kind)): Path<(i64, String)>,
) -> Response {
    let kind = match InteractionKind::from_db_str(&kind) {
        Some(kind) => kind,
        None => {
            return ServiceError::bad_request(format!("unknown interaction kind '{}'", kind))
                .into_response();
        }
    };
    match state
        .catalog_store
        .delete_interaction(session.user_id, article_id, kind)
    {
        Ok(()) => {
            if let Ok(Some(article)) = state.catalog_store.get_article(article_id) {
                state.recommender.publish(RecommenderEvent::FeedbackRemoved {
                    user_id: session.user_id,
                    external_id: recommender_id(&article),
                    kind: kind.into(),
                });
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn get_interaction_status(
    session: Session,
    State(catalog_store): State<GuardedCatalogStore>,
    Path(article_id): Path<i64>,
) -> Response {
    match catalog_store.get_interaction_status(session.user_id, article_id) {
        Ok(status) => Json(status).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_article_interactions(
    session: Session,
    State(catalog_store): State<GuardedCatalogStore>,
    Path(article_id): Path<i64>,
) -> Response {
    if let Err(err) = require_admin(&session) {
        return err.into_response();
    }
    match catalog_store.list_interactions_for_article(article_id) {
        Ok(interactions) => Json(interactions).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct ListParams {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

async fn get_liked_articles(
    session: Session,
    State(catalog_store): State<GuardedCatalogStore>,
    Query(params): Query<ListParams>,
) -> Response {
    match catalog_store.list_articles_by_interaction(
        session.user_id,
        InteractionKind::Like,
        params.page.unwrap_or(0),
        clamp_limit(params.limit),
    ) {
        Ok(articles) => Json(articles).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_saved_articles(
    session: Session,
    State(catalog_store): State<GuardedCatalogStore>,
    Query(params): Query<ListParams>,
) -> Response {
    match catalog_store.list_articles_by_interaction(
        session.user_id,
        InteractionKind::Save,
        params.page.unwrap_or(0),
        clamp_limit(params.limit),
    ) {
        Ok(articles) => Json(articles).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct InteractionListParams {
    pub kind: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

async fn get_my_interactions(
    session: Session,
    State(catalog_store): State<GuardedCatalogStore>,
    Query(params): Query<InteractionListParams>,
) -> Response {
    let kind = match params.kind.as_deref() {
        Some(raw) => match InteractionKind::from_db_str(raw) {
            Some(kind) => Some(kind),
            None => {
                return ServiceError::bad_request(format!("unknown interaction kind '{}'", raw))
                    .into_response();
            }
        },
        None => None,
    };
    match catalog_store.list_interactions_for_user(
        session.user_id,
        kind,
        params.page.unwrap_or(0),
        clamp_limit(params.limit),
    ) {
        Ok(interactions) => Json(interactions).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_my_feed(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
) -> Response {
    match user_manager.get_or_create_feed(session.user_id) {
        Ok(feed) => Json(feed).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct CreateFeedBody {
    pub article_ids: Vec<i64>,
}

async fn post_my_feed(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<CreateFeedBody>,
) -> Response {
    match user_manager.create_feed(session.user_id, &body.article_ids) {
        Ok(feed) => (StatusCode::CREATED, Json(feed)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct UpdateFeedBody {
    pub article_ids: Option<Vec<i64>>,
    pub position: Option<usize>,
}

async fn patch_my_feed(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<UpdateFeedBody>,
) -> Response {
    match user_manager.update_feed(session.user_id, body.article_ids, body.position) {
        Ok(feed) => Json(feed).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct FeedPositionBody {
    pub position: usize,
}

async fn put_my_feed_position(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<FeedPositionBody>,
) -> Response {
    match user_manager.set_feed_position(session.user_id, body.position) {
        Ok(feed) => Json(feed).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Resolve recommended external ids to local articles, dropping ids the
/// catalog does not know about.
async fn recommended_articles(state: &ServerState, user_id: i64) -> ServiceResult<Vec<Article>> {
    let external_ids = state
        .recommender
        .get_recommendations(user_id, state.config.feed_size)
        .await;
    let mut articles = Vec::new();
    for external_id in external_ids {
        let found = match state.catalog_store.get_article_by_external_id(&external_id)? {
            Some(article) => Some(article),
            None => state
                .catalog_store
                .get_article_by_external_url(&external_id)?,
        };
        match found {
            Some(article) if article.active => articles.push(article),
            _ => {}
        }
    }
    Ok(articles)
}

async fn post_my_feed_regenerate(
    session: Session,
    State(state): State<ServerState>,
) -> Response {
    let mut articles = match recommended_articles(&state, session.user_id).await {
        Ok(articles) => articles,
        Err(err) => return err.into_response(),
    };
    if articles.is_empty() {
        // Recommender down, disabled or empty: fall back to the latest articles
        articles = match state.catalog_store.search_articles(
            "",
            0,
            state.config.feed_size,
            ArticleSortBy::Created,
            SortOrder::Desc,
        ) {
            Ok(articles) => articles,
            Err(err) => return err.into_response(),
        };
    }
    let ids: Vec<i64> = articles.iter().map(|a| a.id).collect();
    match state.user_manager.regenerate_feed(session.user_id, ids) {
        Ok(feed) => Json(feed).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_my_recommendations(
    session: Session,
    State(state): State<ServerState>,
) -> Response {
    match recommended_articles(&state, session.user_id).await {
        Ok(articles) => Json(articles).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_user_feed(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(user_id): Path<i64>,
) -> Response {
    let requesting = match user_manager.get_user(session.user_id) {
        Ok(Some(user)) => user,
        Ok(None) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(err) => return err.into_response(),
    };
    match user_manager.get_feed_as_admin(&requesting, user_id) {
        Ok(feed) => Json(feed).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct CreateUserBody {
    pub handle: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Serialize)]
struct CreateUserResponse {
    pub user: User,
    pub token: String,
}

impl CreateUserResponse {
    fn new(user: User, token: AuthToken) -> Self {
        CreateUserResponse {
            user,
            token: token.value.0,
        }
    }
}

async fn post_user(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<CreateUserBody>,
) -> Response {
    if let Err(err) = require_admin(&session) {
        return err.into_response();
    }
    match user_manager.create_user(&body.handle, body.is_admin) {
        Ok((user, token)) => {
            (StatusCode::CREATED, Json(CreateUserResponse::new(user, token))).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub fn make_app(state: ServerState) -> Router {
    let article_routes: Router = Router::new()
        .route("/", post(post_article))
        .route("/bulk", post(post_articles_bulk))
        .route("/search", get(search_articles))
        .route("/{id}", get(get_article))
        .route("/{id}", delete(delete_article))
        .route("/{id}/active", put(put_article_active))
        .route("/{id}/enrich", post(enrich_article))
        .route("/{id}/summary/regenerate", post(regenerate_summary))
        .route("/{id}/audio/regenerate", post(regenerate_audio))
        .route("/{id}/audio", get(get_article_audio))
        .route("/{id}/interactions", post(post_interaction))
        .route("/{id}/interactions", get(get_interaction_status))
        .route("/{id}/interactions/all", get(get_article_interactions))
        .route("/{id}/interactions/{kind}", delete(delete_interaction))
        .with_state(state.clone());

    let me_routes: Router = Router::new()
        .route("/liked", get(get_liked_articles))
        .route("/saved", get(get_saved_articles))
        .route("/interactions", get(get_my_interactions))
        .route("/feed", get(get_my_feed))
        .route("/feed", post(post_my_feed))
        .route("/feed", patch(patch_my_feed))
        .route("/feed/position", put(put_my_feed_position))
        .route("/feed/regenerate", post(post_my_feed_regenerate))
        .route("/recommendations", get(get_my_recommendations))
        .with_state(state.clone());

    let user_routes: Router = Router::new()
        .route("/{id}/feed", get(get_user_feed))
        .with_state(state.clone());

    let admin_routes: Router = Router::new()
        .route("/users", post(post_user))
        .with_state(state.clone());

    let home_router: Router = match &state.config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    home_router
        .nest("/v1/articles", article_routes)
        .nest("/v1/me", me_routes)
        .nest("/v1/users", user_routes)
        .nest("/v1/admin", admin_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        catalog_store: GuardedCatalogStore,
        user_manager: GuardedUserManager,
        audio_store: GuardedAudioStore,
        pipeline: OptionalPipeline,
        recommender: RecommenderSync,
    ) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            catalog_store,
            user_manager,
            audio_store,
            pipeline,
            recommender,
            hash: env!("GIT_HASH").to_owned(),
        }
    }
}

pub async fn run_server(state: ServerState) -> Result<()> {
    let port = state.config.port;
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;

    Ok(axum::serve(listener, app).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::SqliteCatalogStore;
    use crate::enrichment::AudioStore;
    use crate::user::{SqliteUserStore, UserManager};
    use axum::{body::Body, http::Request};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn make_test_state(dir: &TempDir) -> ServerState {
        let catalog_store =
            Arc::new(SqliteCatalogStore::new(dir.path().join("catalog.db")).unwrap());
        let user_store = Arc::new(SqliteUserStore::new(dir.path().join("user.db")).unwrap());
        let user_manager = Arc::new(UserManager::new(user_store));
        let audio_store = Arc::new(AudioStore::new(dir.path().join("media")).unwrap());
        ServerState::new(
            ServerConfig::default(),
            catalog_store,
            user_manager,
            audio_store,
            None,
            RecommenderSync::disabled(),
        )
    }

    #[tokio::test]
    async fn responds_unauthorized_on_protected_routes() {
        let dir = TempDir::new().unwrap();
        let app = make_app(make_test_state(&dir));

        let protected_routes = vec![
            "/v1/articles/123",
            "/v1/articles/search",
            "/v1/articles/123/audio",
            "/v1/articles/123/interactions",
            "/v1/me/liked",
            "/v1/me/saved",
            "/v1/me/interactions",
            "/v1/me/feed",
            "/v1/me/recommendations",
            "/v1/users/1/feed",
        ];

        for route in protected_routes.into_iter() {
            let request = Request::builder().uri(route).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", route);
        }
    }

    #[tokio::test]
    async fn home_is_public() {
        let dir = TempDir::new().unwrap();
        let app = make_app(make_test_state(&dir));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn non_admin_cannot_ingest() {
        let dir = TempDir::new().unwrap();
        let state = make_test_state(&dir);
        let (_, token) = state.user_manager.create_user("reader", false).unwrap();
        let app = make_app(state);

        let request = Request::builder()
            .method("POST")
            .uri("/v1/articles")
            .header("Authorization", token.value.0)
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"external_id":null,"external_url":"https://e/1","title":"T","body":null,"image_url":null,"published_at":null,"category":null}"#,
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
