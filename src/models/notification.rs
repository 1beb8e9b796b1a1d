use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotificationRequest {
    pub recipient_id: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    /// 幂等键：同一动作对同一接收者只落一条
    pub action_key: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Follow,
    Post,
    Like,
    Comment,
}

impl NotificationType {
    pub fn default_title(&self) -> &'static str {
        match self {
            NotificationType::Follow => "New Follower",
            NotificationType::Post => "New Post",
            NotificationType::Like => "New Like",
            NotificationType::Comment => "New Comment",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationType::Follow => "FOLLOW",
            NotificationType::Post => "POST",
            NotificationType::Like => "LIKE",
            NotificationType::Comment => "COMMENT",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UnreadCount {
    pub count: i64,
}
