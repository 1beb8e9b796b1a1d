use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::models::notification::Notification;

/// WebSocket消息类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum WebSocketMessageType {
    // 系统消息
    Connect,
    Ping,
    Pong,
    Error,

    // 身份绑定
    Join,
    Joined,

    // 通知消息
    Notification,
}

/// WebSocket消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketMessage {
    pub id: String,
    pub message_type: WebSocketMessageType,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// 客户端发来的消息，只要求 message_type 和 data
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_type: WebSocketMessageType,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// join 消息体
#[derive(Debug, Clone, Deserialize)]
pub struct JoinRequest {
    #[serde(alias = "userId")]
    pub user_id: String,
}

/// 在线状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineStatus {
    pub user_id: String,
    pub is_online: bool,
    pub active_connections: usize,
}

/// WebSocket统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketStats {
    pub total_connections: usize,
    pub active_users: usize,
}

/// 错误消息
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
}

impl WebSocketMessage {
    /// 创建新消息
    pub fn new(message_type: WebSocketMessageType, data: serde_json::Value) -> Self {
        Self {
            id: format!("msg_{}", uuid::Uuid::new_v4()),
            message_type,
            data,
            timestamp: Utc::now(),
        }
    }

    /// 创建通知消息
    pub fn notification(notification: &Notification) -> serde_json::Result<Self> {
        Ok(Self::new(
            WebSocketMessageType::Notification,
            serde_json::to_value(notification)?,
        ))
    }

    /// 创建错误消息
    pub fn error(code: &str, message: &str) -> Self {
        let error_data = ErrorMessage {
            code: code.to_string(),
            message: message.to_string(),
        };

        Self::new(
            WebSocketMessageType::Error,
            serde_json::to_value(error_data).unwrap_or_default(),
        )
    }

    /// 创建心跳消息
    pub fn pong(connection_id: &str) -> Self {
        Self::new(
            WebSocketMessageType::Pong,
            serde_json::json!({
                "connection_id": connection_id,
                "timestamp": Utc::now(),
            }),
        )
    }
}
