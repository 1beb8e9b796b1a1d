use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{Json, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    models::websocket::{OnlineStatus, WebSocketStats},
    state::AppState,
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // WebSocket连接端点
        .route("/", get(websocket_handler))
        // 在线状态
        .route("/status/:user_id", get(get_user_status))
        // 统计信息
        .route("/stats", get(get_websocket_stats))
}

/// WebSocket连接处理器；身份由连接后的 join 消息声明
async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let connection_id = format!("conn_{}", uuid::Uuid::new_v4());
    info!("WebSocket upgrade request: {}", connection_id);

    ws.on_upgrade(move |socket| handle_websocket_connection(socket, state, connection_id))
}

async fn handle_websocket_connection(socket: WebSocket, state: Arc<AppState>, connection_id: String) {
    if let Err(e) = state
        .websocket_service
        .handle_connection(socket, connection_id.clone())
        .await
    {
        error!("WebSocket connection error for {}: {}", connection_id, e);
    }
}

/// GET /api/ws/stats
async fn get_websocket_stats(State(state): State<Arc<AppState>>) -> Json<WebSocketStats> {
    Json(state.websocket_service.stats())
}

/// GET /api/ws/status/:user_id
async fn get_user_status(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<OnlineStatus> {
    Json(state.websocket_service.online_status(&user_id))
}
