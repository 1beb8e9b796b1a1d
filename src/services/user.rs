use crate::{
    error::{AppError, Result},
    models::user::*,
    services::{database::is_unique_violation, Database},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

const USER_FIELDS: &str = "meta::id(id) AS id, username, email, created_at";

/// 用户服务，处理用户相关的业务逻辑
#[derive(Clone)]
pub struct UserService {
    db: Arc<Database>,
}

impl UserService {
    /// 创建新的用户服务实例
    pub async fn new(db: Arc<Database>) -> Result<Self> {
        Ok(Self { db })
    }

    /// 创建新用户
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<User> {
        request.validate()?;
        debug!("Creating user: {}", request.username);

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: request.username,
            email: request.email,
            created_at: Utc::now(),
        };

        self.db.create("user_profile", &user).await.map_err(|e| {
            if is_unique_violation(&e) {
                AppError::duplicate("Username already taken")
            } else {
                AppError::from(e)
            }
        })?;

        info!("Created user {} ({})", user.username, user.id);
        Ok(user)
    }

    /// 根据ID获取用户
    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let query = format!(
            "SELECT {} FROM type::thing('user_profile', $user_id)",
            USER_FIELDS
        );
        self.db
            .fetch_one(&query, json!({ "user_id": user_id }))
            .await
    }

    /// 获取用户，不存在时返回 NotFound
    pub async fn require_user(&self, user_id: &str) -> Result<User> {
        self.get_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))
    }

    /// 批量获取用户
    pub async fn get_users_by_ids(&self, user_ids: &[String]) -> Result<Vec<User>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            "SELECT {} FROM user_profile WHERE meta::id(id) INSIDE $user_ids",
            USER_FIELDS
        );
        let mut users: Vec<User> = self
            .db
            .fetch_all(&query, json!({ "user_ids": user_ids }))
            .await?;
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    /// 获取全部用户及派生统计
    pub async fn list_users_with_counts(&self) -> Result<Vec<UserWithCounts>> {
        debug!("Listing users with counts");

        let query = format!("SELECT {} FROM user_profile", USER_FIELDS);
        let mut users: Vec<User> = self.db.fetch_all(&query, json!({})).await?;
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let counts = self.collect_counts().await?;

        Ok(users
            .into_iter()
            .map(|user| {
                let counts = counts.get(&user.id).cloned().unwrap_or_default();
                UserWithCounts { user, counts }
            })
            .collect())
    }

    /// 获取单个用户及派生统计
    pub async fn get_user_with_counts(&self, user_id: &str) -> Result<UserWithCounts> {
        let user = self.require_user(user_id).await?;
        let params = json!({ "user_id": user_id });

        let followers = self
            .db
            .count(
                "SELECT count() AS count FROM follow WHERE following_id = $user_id GROUP ALL",
                &params,
            )
            .await?;
        let following = self
            .db
            .count(
                "SELECT count() AS count FROM follow WHERE follower_id = $user_id GROUP ALL",
                &params,
            )
            .await?;
        let posts = self
            .db
            .count(
                "SELECT count() AS count FROM post WHERE user_id = $user_id GROUP ALL",
                &params,
            )
            .await?;

        Ok(UserWithCounts {
            user,
            counts: UserCounts { followers, following, posts },
        })
    }

    /// 一次读出全部关注关系和文章作者，在内存中汇总
    async fn collect_counts(&self) -> Result<HashMap<String, UserCounts>> {
        #[derive(Deserialize)]
        struct EdgeRow {
            follower_id: String,
            following_id: String,
        }

        #[derive(Deserialize)]
        struct AuthorRow {
            user_id: String,
        }

        let edges: Vec<EdgeRow> = self
            .db
            .fetch_all("SELECT follower_id, following_id FROM follow", json!({}))
            .await?;
        let authors: Vec<AuthorRow> = self
            .db
            .fetch_all("SELECT user_id FROM post", json!({}))
            .await?;

        let mut counts: HashMap<String, UserCounts> = HashMap::new();
        for edge in edges {
            counts.entry(edge.following_id).or_default().followers += 1;
            counts.entry(edge.follower_id).or_default().following += 1;
        }
        for author in authors {
            counts.entry(author.user_id).or_default().posts += 1;
        }

        Ok(counts)
    }
}
