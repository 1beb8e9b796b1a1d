use crate::{
    error::Result,
    models::{notification::*, user::*},
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:user_id", get(get_user))
        .route("/:user_id/followers", get(get_followers))
        .route("/:user_id/following", get(get_following))
        .route("/:user_id/notifications", get(get_notifications))
        .route("/:user_id/notifications/unread-count", get(get_unread_count))
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub limit: Option<usize>,
}

/// 获取用户列表
/// GET /api/users
async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<UserWithCounts>>> {
    debug!("Fetching users list");
    let users = state.user_service.list_users_with_counts().await?;
    Ok(Json(users))
}

/// 创建用户
/// POST /api/users
async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateUserRequest>,
) -> Result<Json<User>> {
    let user = state.user_service.create_user(request).await?;
    Ok(Json(user))
}

/// GET /api/users/:user_id
async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserWithCounts>> {
    let user = state.user_service.get_user_with_counts(&user_id).await?;
    Ok(Json(user))
}

/// 获取用户的关注者列表
/// GET /api/users/:user_id/followers
async fn get_followers(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<User>>> {
    let followers = state.follow_service.get_followers(&user_id).await?;
    Ok(Json(followers))
}

/// 获取用户关注的人
/// GET /api/users/:user_id/following
async fn get_following(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<User>>> {
    let following = state.follow_service.get_following(&user_id).await?;
    Ok(Json(following))
}

/// 获取用户通知，最新的在前
/// GET /api/users/:user_id/notifications
async fn get_notifications(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<Notification>>> {
    debug!("Fetching notifications for user {} with query: {:?}", user_id, query);

    let limit = state.page_limit(query.limit);
    let notifications = state
        .notification_service
        .list_for_recipient(&user_id, Some(limit))
        .await?;

    Ok(Json(notifications))
}

/// GET /api/users/:user_id/notifications/unread-count
async fn get_unread_count(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UnreadCount>> {
    let count = state.notification_service.unread_count(&user_id).await?;
    Ok(Json(UnreadCount { count }))
}
