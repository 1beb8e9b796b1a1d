use std::sync::Arc;

use crate::{
    config::Config,
    error::Result,
    services::{
        ConnectionRegistry, Database, FanoutService, FollowService, NotificationService,
        PostService, RealtimeService, UserService, WebSocketService,
    },
};

/// 应用程序的共享状态
/// 包含所有服务和配置的引用
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Config,

    /// 数据库连接
    pub db: Arc<Database>,

    pub user_service: UserService,

    /// 关注关系
    pub follow_service: FollowService,

    pub post_service: PostService,

    /// 通知存储
    pub notification_service: NotificationService,

    /// 连接注册表，由投递通道和 WebSocket 会话共享
    pub registry: Arc<ConnectionRegistry>,

    pub realtime_service: RealtimeService,

    pub websocket_service: WebSocketService,

    /// 扩散引擎
    pub fanout_service: FanoutService,
}

impl AppState {
    /// 连接数据库并装配所有服务
    pub async fn new(config: Config) -> Result<Self> {
        let db = Arc::new(Database::new(&config).await?);
        db.verify_connection().await?;

        let user_service = UserService::new(db.clone()).await?;
        let follow_service = FollowService::new(db.clone(), user_service.clone()).await?;
        let post_service = PostService::new(db.clone(), user_service.clone()).await?;
        let notification_service = NotificationService::new(db.clone()).await?;

        let registry = Arc::new(ConnectionRegistry::new());
        let realtime_service = RealtimeService::new(registry.clone());
        let websocket_service = WebSocketService::new(registry.clone(), &config);

        let fanout_service = FanoutService::new(
            user_service.clone(),
            follow_service.clone(),
            post_service.clone(),
            notification_service.clone(),
            realtime_service.clone(),
            config.fanout_concurrency,
        );

        Ok(Self {
            config,
            db,
            user_service,
            follow_service,
            post_service,
            notification_service,
            registry,
            realtime_service,
            websocket_service,
            fanout_service,
        })
    }

    /// 获取分页配置
    pub fn page_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.config.default_page_limit)
            .clamp(1, self.config.default_page_limit.max(1) * 4)
    }
}
