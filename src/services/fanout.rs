use crate::{
    error::{AppError, Result},
    models::{
        follow::Follow,
        notification::*,
        post::{CreatePostRequest, Post},
        user::User,
    },
    services::{
        FollowService, NotificationService, NotificationWrite, PostService, RealtimeService,
        UserService,
    },
};
use futures::stream::{self, StreamExt};
use serde_json::json;
use tracing::{debug, error, info, warn};
use validator::Validate;

/// 发帖结果
#[derive(Debug, Clone)]
pub struct PostFanout {
    pub post: Post,
    /// 持有这篇文章通知的粉丝数，离线粉丝也计入
    pub notifications_sent: usize,
}

/// 扩散引擎
///
/// 把一个社交动作（关注、发帖）展开为每个接收者一条通知：先落库，再交给投递通道。
#[derive(Clone)]
pub struct FanoutService {
    user_service: UserService,
    follow_service: FollowService,
    post_service: PostService,
    notification_service: NotificationService,
    realtime_service: RealtimeService,
    concurrency: usize,
}

impl FanoutService {
    pub fn new(
        user_service: UserService,
        follow_service: FollowService,
        post_service: PostService,
        notification_service: NotificationService,
        realtime_service: RealtimeService,
        concurrency: usize,
    ) -> Self {
        Self {
            user_service,
            follow_service,
            post_service,
            notification_service,
            realtime_service,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn on_follow(&self, follower_id: &str, following_id: &str) -> Result<Follow> {
        debug!("User {} following user {}", follower_id, following_id);

        if follower_id == following_id {
            return Err(AppError::bad_request("Cannot follow yourself"));
        }

        let following = self.user_service.require_user(following_id).await?;
        let follower = self.user_service.require_user(follower_id).await?;

        let follow = self
            .follow_service
            .create_follow(&follower.id, &following.id)
            .await?;

        let request = CreateNotificationRequest {
            recipient_id: following.id.clone(),
            notification_type: NotificationType::Follow,
            title: NotificationType::Follow.default_title().to_string(),
            message: format!("{} started following you", follower.username),
            data: json!({
                "follower_id": follower.id,
                "follower_username": follower.username,
                "follow_id": follow.id,
            }),
            action_key: format!("follow:{}", follow.id),
        };

        if let Err(e) = self.notify(request).await {
            // 通知写失败时撤销关注边，调用方可以整体重试
            error!(
                "Failed to write follow notification for {} -> {}: {}",
                follower.id, following.id, e
            );
            if let Err(rollback) = self.follow_service.delete_follow(&follower.id, &following.id).await {
                error!("Failed to roll back follow {}: {}", follow.id, rollback);
            }
            return Err(e);
        }

        Ok(follow)
    }

    pub async fn on_unfollow(&self, follower_id: &str, following_id: &str) -> Result<Follow> {
        self.follow_service.delete_follow(follower_id, following_id).await
    }

    pub async fn on_post(&self, request: CreatePostRequest) -> Result<PostFanout> {
        request.validate()?;
        let author = self.user_service.require_user(&request.user_id).await?;

        let post = self
            .post_service
            .create_post(&author.id, &request.title, &request.content)
            .await?;

        let notifications_sent = self.fan_out_post(&post, &author).await?;

        Ok(PostFanout { post, notifications_sent })
    }

    /// 给文章作者的每个当前粉丝写一条 POST 通知并推送
    ///
    /// 粉丝集合只读一次。对同一篇文章重复执行不会产生第二条通知或第二次推送。
    pub async fn fan_out_post(&self, post: &Post, author: &User) -> Result<usize> {
        let recipients = self.follow_service.follower_ids(&author.id).await?;
        let total = recipients.len();
        debug!("Fanning out post {} to {} follower(s)", post.id, total);

        let sent = stream::iter(recipients)
            .map(|recipient_id| {
                let request = CreateNotificationRequest {
                    recipient_id: recipient_id.clone(),
                    notification_type: NotificationType::Post,
                    title: NotificationType::Post.default_title().to_string(),
                    message: format!("{} created a new post: {}", author.username, post.title),
                    data: json!({
                        "post_id": post.id,
                        "author_id": author.id,
                        "author_username": author.username,
                    }),
                    action_key: format!("post:{}:{}", post.id, recipient_id),
                };
                async move {
                    match self.notify(request).await {
                        Ok(_) => true,
                        Err(e) => {
                            warn!(
                                "Failed to notify follower {} about post {}: {}",
                                recipient_id, post.id, e
                            );
                            false
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .fold(0usize, |sent, ok| async move { if ok { sent + 1 } else { sent } })
            .await;

        if sent < total {
            warn!("Post {} notified {} of {} follower(s)", post.id, sent, total);
        } else {
            info!("Post {} notified {} follower(s)", post.id, sent);
        }

        Ok(sent)
    }

    /// 落库后推送；已存在的通知不再重复推送
    async fn notify(&self, request: CreateNotificationRequest) -> Result<NotificationWrite> {
        let write = self.notification_service.create_notification(request).await?;

        if write.is_created() {
            let notification = write.notification();
            self.realtime_service
                .push(&notification.recipient_id, notification);
        }

        Ok(write)
    }
}
