use feedrank::utils::validation::normalize_limit;
use feedrank::{init_tracing, AppState, Config, FeedResponse, PostId, UserId};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Instrument};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct FeedQuery {
    limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: "Success".to_string(),
        }
    }
}

async fn health_check() -> Json<ApiResponse<HashMap<String, String>>> {
    let mut status = HashMap::new();
    status.insert("status".to_string(), "healthy".to_string());
    status.insert("service".to_string(), "feedrank".to_string());
    status.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());

    Json(ApiResponse::success(status))
}

async fn get_feed(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(params): Query<FeedQuery>,
) -> Result<Json<ApiResponse<FeedResponse>>, StatusCode> {
    let max_limit = state.config.feed.candidate_limit;
    let limit = params
        .limit
        .map(|l| normalize_limit(l, max_limit))
        .unwrap_or(max_limit);

    let span = tracing::info_span!("feed", request_id = %Uuid::new_v4(), user_id, limit);
    match state.feed_ranker.build_feed(user_id, limit).instrument(span).await {
        Ok(post_ids) => Ok(Json(ApiResponse::success(FeedResponse::new(user_id, post_ids)))),
        Err(e) => {
            tracing::error!("Failed to build feed for user {}: {}", user_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn record_play(
    State(state): State<AppState>,
    Path((user_id, post_id)): Path<(UserId, PostId)>,
) -> Result<Json<ApiResponse<String>>, StatusCode> {
    match state.store.record_play(user_id, post_id).await {
        Ok(()) => Ok(Json(ApiResponse::success("Play recorded".to_string()))),
        Err(e) => {
            tracing::error!("Failed to record play of post {} by user {}: {}", post_id, user_id, e);
            Err(StatusCode::BAD_REQUEST)
        }
    }
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/feed/:user_id", get(get_feed))
        .route("/users/:user_id/history/played/:post_id", post(record_play))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
        )
        .with_state(state)
}

fn main() -> anyhow::Result<()> {
    let config = match std::env::var("FEEDRANK_CONFIG") {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::default(),
    };

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers.max(1))
        .enable_all()
        .build()?
        .block_on(serve(config))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    init_tracing().await;
    info!("Starting feedrank server with config: {:?}", config.server);

    let addr = config.server.socket_addr()?;
    let state = AppState::new(config).await?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
