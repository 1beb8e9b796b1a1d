use crate::{
    error::Result,
    models::post::*,
    services::{Database, UserService},
};
use chrono::Utc;
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info};
use uuid::Uuid;

const POST_FIELDS: &str = "meta::id(id) AS id, user_id, title, content, created_at";

#[derive(Clone)]
pub struct PostService {
    db: Arc<Database>,
    user_service: UserService,
}

impl PostService {
    pub async fn new(db: Arc<Database>, user_service: UserService) -> Result<Self> {
        Ok(Self { db, user_service })
    }

    /// 写入文章记录；作者校验由调用方完成
    pub async fn create_post(&self, author_id: &str, title: &str, content: &str) -> Result<Post> {
        let post = Post {
            id: Uuid::new_v4().to_string(),
            user_id: author_id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };

        self.db.create("post", &post).await?;
        info!("User {} created post {}", author_id, post.id);
        Ok(post)
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let query = format!("SELECT {} FROM type::thing('post', $id)", POST_FIELDS);
        self.db.fetch_one(&query, json!({ "id": post_id })).await
    }

    /// 全部文章，按创建时间倒序，附带作者用户名
    pub async fn list_posts(&self) -> Result<Vec<PostWithAuthor>> {
        debug!("Listing posts");

        let query = format!("SELECT {} FROM post", POST_FIELDS);
        let mut posts: Vec<Post> = self.db.fetch_all(&query, json!({})).await?;
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut author_ids: Vec<String> = posts.iter().map(|p| p.user_id.clone()).collect();
        author_ids.sort();
        author_ids.dedup();

        let usernames: HashMap<String, String> = self
            .user_service
            .get_users_by_ids(&author_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect();

        Ok(posts
            .into_iter()
            .map(|post| {
                let author_username = usernames.get(&post.user_id).cloned();
                PostWithAuthor { post, author_username }
            })
            .collect())
    }
}
