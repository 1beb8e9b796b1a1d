use crate::{error::Result, models::post::*, state::AppState};
use axum::{extract::State, response::Json, routing::get, Router};
use std::sync::Arc;
use tracing::info;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_posts).post(create_post))
}

/// 发帖并通知所有粉丝
/// POST /api/posts
async fn create_post(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreatePostRequest>,
) -> Result<Json<CreatePostResponse>> {
    let result = state.fanout_service.on_post(request).await?;
    info!(
        "Post {} created, {} notification(s) sent",
        result.post.id, result.notifications_sent
    );

    Ok(Json(CreatePostResponse {
        post: result.post,
        notifications_sent: result.notifications_sent,
    }))
}

/// GET /api/posts
async fn list_posts(State(state): State<Arc<AppState>>) -> Result<Json<Vec<PostWithAuthor>>> {
    let posts = state.post_service.list_posts().await?;
    Ok(Json(posts))
}
