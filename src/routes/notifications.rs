use crate::{error::Result, models::notification::Notification, state::AppState};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::patch,
    Router,
};
use std::sync::Arc;
use tracing::debug;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/:notification_id/read", patch(mark_as_read))
}

/// 标记通知为已读
/// PATCH /api/notifications/:notification_id/read
async fn mark_as_read(
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<String>,
) -> Result<Json<Notification>> {
    debug!("Marking notification {} as read", notification_id);
    let notification = state.notification_service.mark_as_read(&notification_id).await?;
    Ok(Json(notification))
}
