use crate::{
    error::{AppError, Result},
    models::{follow::*, user::User},
    services::{database::is_unique_violation, Database, UserService},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const FOLLOW_FIELDS: &str = "meta::id(id) AS id, follower_id, following_id, created_at";

/// 社交关系图：关注边的唯一写入方
#[derive(Clone)]
pub struct FollowService {
    db: Arc<Database>,
    user_service: UserService,
}

impl FollowService {
    pub async fn new(db: Arc<Database>, user_service: UserService) -> Result<Self> {
        Ok(Self { db, user_service })
    }

    /// 原子地创建关注边
    ///
    /// 依赖 `follow_pair` 唯一索引：并发的两个相同请求只有一个成功，另一个得到 Duplicate。
    pub async fn create_follow(&self, follower_id: &str, following_id: &str) -> Result<Follow> {
        let follow = Follow {
            id: Uuid::new_v4().to_string(),
            follower_id: follower_id.to_string(),
            following_id: following_id.to_string(),
            created_at: Utc::now(),
        };

        match self.db.create("follow", &follow).await {
            Ok(()) => {
                info!("User {} followed user {}", follower_id, following_id);
                Ok(follow)
            }
            Err(e) if is_unique_violation(&e) => {
                Err(AppError::duplicate("Already following this user"))
            }
            Err(e) => {
                // 并发写冲突时，以最终状态判定
                if self.is_following(follower_id, following_id).await.unwrap_or(false) {
                    warn!(
                        "Follow insert for {} -> {} lost a write race: {}",
                        follower_id, following_id, e
                    );
                    Err(AppError::duplicate("Already following this user"))
                } else {
                    Err(AppError::from(e))
                }
            }
        }
    }

    /// 删除关注边，不存在时返回 NotFound
    ///
    /// 先按 `meta::id` 投影读出边，再按记录 ID 删除；并发的另一次取消关注
    /// 先删掉时，这里的 DELETE 不返回任何行，同样视为 NotFound。
    pub async fn delete_follow(&self, follower_id: &str, following_id: &str) -> Result<Follow> {
        debug!("User {} unfollowing user {}", follower_id, following_id);

        let query = format!(
            "SELECT {} FROM follow WHERE follower_id = $follower_id AND following_id = $following_id",
            FOLLOW_FIELDS
        );
        let follow: Follow = self
            .db
            .fetch_one(
                &query,
                json!({
                    "follower_id": follower_id,
                    "following_id": following_id
                }),
            )
            .await?
            .ok_or_else(|| AppError::not_found("Follow relationship"))?;

        let deleted: Vec<serde_json::Value> = self
            .db
            .fetch_all(
                "DELETE type::thing('follow', $id) RETURN BEFORE",
                json!({ "id": follow.id }),
            )
            .await?;
        if deleted.is_empty() {
            return Err(AppError::not_found("Follow relationship"));
        }

        info!("User {} unfollowed user {}", follower_id, following_id);
        Ok(follow)
    }

    pub async fn is_following(&self, follower_id: &str, following_id: &str) -> Result<bool> {
        let count = self
            .db
            .count(
                r#"
                    SELECT count() AS count
                    FROM follow
                    WHERE follower_id = $follower_id
                    AND following_id = $following_id
                    GROUP ALL
                "#,
                json!({
                    "follower_id": follower_id,
                    "following_id": following_id
                }),
            )
            .await?;

        Ok(count > 0)
    }

    /// 某用户的全部粉丝 ID
    ///
    /// 单条 SELECT 语句在一个读事务内完成，结果是某一时刻的一致快照。
    pub async fn follower_ids(&self, user_id: &str) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct Row {
            follower_id: String,
        }

        let rows: Vec<Row> = self
            .db
            .fetch_all(
                "SELECT follower_id FROM follow WHERE following_id = $user_id",
                json!({ "user_id": user_id }),
            )
            .await?;

        let mut ids: Vec<String> = rows.into_iter().map(|r| r.follower_id).collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// 某用户关注的全部用户 ID
    pub async fn following_ids(&self, user_id: &str) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct Row {
            following_id: String,
        }

        let rows: Vec<Row> = self
            .db
            .fetch_all(
                "SELECT following_id FROM follow WHERE follower_id = $user_id",
                json!({ "user_id": user_id }),
            )
            .await?;

        Ok(rows.into_iter().map(|r| r.following_id).collect())
    }

    pub async fn get_followers(&self, user_id: &str) -> Result<Vec<User>> {
        debug!("Getting followers for user: {}", user_id);
        self.user_service.require_user(user_id).await?;
        let ids = self.follower_ids(user_id).await?;
        self.user_service.get_users_by_ids(&ids).await
    }

    pub async fn get_following(&self, user_id: &str) -> Result<Vec<User>> {
        debug!("Getting following for user: {}", user_id);
        self.user_service.require_user(user_id).await?;
        let ids = self.following_ids(user_id).await?;
        self.user_service.get_users_by_ids(&ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::user::CreateUserRequest, services::database::tests::test_database};

    async fn setup() -> (FollowService, User, User) {
        let db = Arc::new(test_database().await);
        let users = UserService::new(db.clone()).await.unwrap();
        let alice = users
            .create_user(CreateUserRequest {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
            })
            .await
            .unwrap();
        let bob = users
            .create_user(CreateUserRequest {
                username: "bob".to_string(),
                email: "bob@example.com".to_string(),
            })
            .await
            .unwrap();
        (FollowService::new(db, users).await.unwrap(), alice, bob)
    }

    #[tokio::test]
    async fn test_create_follow_once() {
        let (service, alice, bob) = setup().await;

        let follow = service.create_follow(&alice.id, &bob.id).await.unwrap();
        assert_eq!(follow.follower_id, alice.id);
        assert!(service.is_following(&alice.id, &bob.id).await.unwrap());
        assert!(!service.is_following(&bob.id, &alice.id).await.unwrap());

        let err = service.create_follow(&alice.id, &bob.id).await.unwrap_err();
        assert!(matches!(err, AppError::Duplicate(_)));
        assert_eq!(service.follower_ids(&bob.id).await.unwrap(), vec![alice.id.clone()]);
    }

    #[tokio::test]
    async fn test_delete_follow() {
        let (service, alice, bob) = setup().await;

        let created = service.create_follow(&alice.id, &bob.id).await.unwrap();
        let deleted = service.delete_follow(&alice.id, &bob.id).await.unwrap();
        assert_eq!(deleted, created);
        assert!(!service.is_following(&alice.id, &bob.id).await.unwrap());

        let err = service.delete_follow(&alice.id, &bob.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        // 取消关注后可以重新关注
        let again = service.create_follow(&alice.id, &bob.id).await.unwrap();
        assert_ne!(again.id, created.id);
        assert_eq!(service.follower_ids(&bob.id).await.unwrap(), vec![alice.id.clone()]);
    }

    #[tokio::test]
    async fn test_delete_follow_leaves_other_edges() {
        let (service, alice, bob) = setup().await;

        service.create_follow(&alice.id, &bob.id).await.unwrap();
        let reverse = service.create_follow(&bob.id, &alice.id).await.unwrap();

        service.delete_follow(&alice.id, &bob.id).await.unwrap();
        assert!(service.is_following(&bob.id, &alice.id).await.unwrap());
        assert_eq!(service.delete_follow(&bob.id, &alice.id).await.unwrap(), reverse);
    }

    #[tokio::test]
    async fn test_followers_and_following_lists() {
        let (service, alice, bob) = setup().await;
        service.create_follow(&alice.id, &bob.id).await.unwrap();

        let followers = service.get_followers(&bob.id).await.unwrap();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].username, "alice");

        let following = service.get_following(&alice.id).await.unwrap();
        assert_eq!(following.len(), 1);
        assert_eq!(following[0].username, "bob");
    }
}
