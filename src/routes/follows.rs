use crate::{error::Result, models::follow::*, state::AppState};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::post,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// 挂在 /api/users 下
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/:user_id/follow", post(follow_user).delete(unfollow_user))
}

/// 关注用户
/// POST /api/users/:user_id/follow
async fn follow_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(request): Json<FollowRequest>,
) -> Result<Json<Value>> {
    debug!("User {} following user {}", request.follower_id, user_id);

    let follow = state
        .fanout_service
        .on_follow(&request.follower_id, &user_id)
        .await?;

    Ok(Json(json!({
        "message": "Successfully followed user",
        "follow": follow
    })))
}

/// 取消关注用户
/// DELETE /api/users/:user_id/follow
async fn unfollow_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(request): Json<FollowRequest>,
) -> Result<Json<Value>> {
    debug!("User {} unfollowing user {}", request.follower_id, user_id);

    state
        .fanout_service
        .on_unfollow(&request.follower_id, &user_id)
        .await?;

    Ok(Json(json!({
        "message": "Successfully unfollowed user"
    })))
}
