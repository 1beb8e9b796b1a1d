use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub static USERNAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("valid username pattern"));

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 30), regex = "USERNAME_REGEX")]
    pub username: String,

    #[validate(email)]
    pub email: String,
}

/// 派生统计，不落库
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserCounts {
    pub followers: i64,
    pub following: i64,
    pub posts: i64,
}

/// 带统计信息的用户
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserWithCounts {
    #[serde(flatten)]
    pub user: User,
    #[serde(rename = "_count")]
    pub counts: UserCounts,
}
