use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Follow {
    pub id: String,
    pub follower_id: String,
    pub following_id: String,
    pub created_at: DateTime<Utc>,
}

/// POST / DELETE /api/users/:id/follow 请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowRequest {
    #[serde(alias = "followerId")]
    pub follower_id: String,
}
