use crate::{
    error::{AppError, Result},
    models::notification::*,
    services::{database::is_unique_violation, Database},
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const NOTIFICATION_FIELDS: &str = "meta::id(id) AS id, recipient_id, notification_type, title, message, data, is_read, read_at, created_at";

/// 通知写入结果
#[derive(Debug, Clone)]
pub enum NotificationWrite {
    /// 新写入的通知
    Created(Notification),
    /// 同一动作已为该接收者写过通知
    Existing(Notification),
}

impl NotificationWrite {
    pub fn notification(&self) -> &Notification {
        match self {
            NotificationWrite::Created(n) | NotificationWrite::Existing(n) => n,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, NotificationWrite::Created(_))
    }
}

/// 通知存储
#[derive(Clone)]
pub struct NotificationService {
    db: Arc<Database>,
}

impl NotificationService {
    pub async fn new(db: Arc<Database>) -> Result<Self> {
        Ok(Self { db })
    }

    /// 写入一条通知；`action_key` 唯一，重复写入返回已有记录
    pub async fn create_notification(
        &self,
        request: CreateNotificationRequest,
    ) -> Result<NotificationWrite> {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            recipient_id: request.recipient_id,
            notification_type: request.notification_type,
            title: request.title,
            message: request.message,
            data: request.data,
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        };

        let mut content = serde_json::to_value(&notification)?;
        content["action_key"] = json!(request.action_key);

        match self.db.create("notification", &content).await {
            Ok(()) => {
                debug!(
                    "Created {} notification {} for user {}",
                    notification.notification_type, notification.id, notification.recipient_id
                );
                Ok(NotificationWrite::Created(notification))
            }
            Err(e) if is_unique_violation(&e) => {
                info!(
                    "Notification for action {} already exists, skipping",
                    request.action_key
                );
                let existing = self
                    .get_by_action_key(&request.action_key)
                    .await?
                    .ok_or_else(|| AppError::internal("Notification index out of sync"))?;
                Ok(NotificationWrite::Existing(existing))
            }
            Err(e) => Err(AppError::from(e)),
        }
    }

    pub async fn get_notification(&self, notification_id: &str) -> Result<Option<Notification>> {
        let query = format!(
            "SELECT {} FROM type::thing('notification', $id)",
            NOTIFICATION_FIELDS
        );
        self.db
            .fetch_one(&query, json!({ "id": notification_id }))
            .await
    }

    async fn get_by_action_key(&self, action_key: &str) -> Result<Option<Notification>> {
        let query = format!(
            "SELECT {} FROM notification WHERE action_key = $action_key",
            NOTIFICATION_FIELDS
        );
        self.db
            .fetch_one(&query, json!({ "action_key": action_key }))
            .await
    }

    /// 某用户的通知，按创建时间倒序
    pub async fn list_for_recipient(
        &self,
        recipient_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Notification>> {
        debug!("Getting notifications for user: {}", recipient_id);

        let query = format!(
            "SELECT {} FROM notification WHERE recipient_id = $recipient_id",
            NOTIFICATION_FIELDS
        );
        let mut notifications: Vec<Notification> = self
            .db
            .fetch_all(&query, json!({ "recipient_id": recipient_id }))
            .await?;

        notifications.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        if let Some(limit) = limit {
            notifications.truncate(limit);
        }

        Ok(notifications)
    }

    pub async fn unread_count(&self, recipient_id: &str) -> Result<i64> {
        self.db
            .count(
                r#"
                    SELECT count() AS count
                    FROM notification
                    WHERE recipient_id = $recipient_id AND is_read = false
                    GROUP ALL
                "#,
                json!({ "recipient_id": recipient_id }),
            )
            .await
    }

    /// 标记已读；对已读通知重复调用不报错，也不改变 read_at
    pub async fn mark_as_read(&self, notification_id: &str) -> Result<Notification> {
        let notification = self
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| AppError::not_found("Notification"))?;

        if notification.is_read {
            return Ok(notification);
        }

        self.db
            .query_with_params(
                r#"
                    UPDATE type::thing('notification', $id)
                    SET is_read = true, read_at = $read_at
                    WHERE is_read = false
                    RETURN NONE
                "#,
                json!({
                    "id": notification_id,
                    "read_at": Utc::now()
                }),
            )
            .await?
            .check()?;

        self.get_notification(notification_id)
            .await?
            .ok_or_else(|| AppError::not_found("Notification"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::database::tests::test_database;

    fn request(recipient: &str, action_key: &str) -> CreateNotificationRequest {
        CreateNotificationRequest {
            recipient_id: recipient.to_string(),
            notification_type: NotificationType::Post,
            title: NotificationType::Post.default_title().to_string(),
            message: "alice created a new post: Hello".to_string(),
            data: json!({"post_id": "p1"}),
            action_key: action_key.to_string(),
        }
    }

    async fn service() -> NotificationService {
        NotificationService::new(Arc::new(test_database().await))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_is_idempotent_per_action_key() {
        let service = service().await;

        let first = service.create_notification(request("u1", "post:p1:u1")).await.unwrap();
        assert!(first.is_created());

        let second = service.create_notification(request("u1", "post:p1:u1")).await.unwrap();
        assert!(!second.is_created());
        assert_eq!(second.notification().id, first.notification().id);

        assert_eq!(service.list_for_recipient("u1", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let service = service().await;

        let older = service.create_notification(request("u1", "a")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = service.create_notification(request("u1", "b")).await.unwrap();
        service.create_notification(request("u2", "c")).await.unwrap();

        let list = service.list_for_recipient("u1", None).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, newer.notification().id);
        assert_eq!(list[1].id, older.notification().id);

        let limited = service.list_for_recipient("u1", Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_as_read_is_idempotent() {
        let service = service().await;
        let created = service.create_notification(request("u1", "a")).await.unwrap();
        let id = created.notification().id.clone();
        assert_eq!(service.unread_count("u1").await.unwrap(), 1);

        let first = service.mark_as_read(&id).await.unwrap();
        assert!(first.is_read);
        assert!(first.read_at.is_some());

        let second = service.mark_as_read(&id).await.unwrap();
        assert!(second.is_read);
        assert_eq!(second.read_at, first.read_at);
        assert_eq!(service.unread_count("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_missing_notification() {
        let service = service().await;
        let err = service.mark_as_read("missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
