use crate::{error::DeliveryError, models::websocket::*};
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

/// 已序列化的下行帧，多个连接共享同一份
pub type OutboundFrame = Arc<str>;

/// 一条实时连接的发送端
///
/// 下行队列有界，投递只用 `try_send`，慢连接不会阻塞调用方。
#[derive(Debug, Clone)]
pub struct Connection {
    id: String,
    tx: mpsc::Sender<OutboundFrame>,
    shutdown: Arc<Notify>,
}

impl Connection {
    pub fn new(id: impl Into<String>, buffer: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let connection = Self {
            id: id.into(),
            tx,
            shutdown: Arc::new(Notify::new()),
        };
        (connection, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 非阻塞地放入下行队列
    pub fn try_send(&self, frame: OutboundFrame) -> Result<(), DeliveryError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull(self.id.clone()),
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed(self.id.clone()),
        })
    }

    /// 序列化并发送一条消息
    pub fn send(&self, message: &WebSocketMessage) -> Result<(), DeliveryError> {
        let text = serde_json::to_string(message)?;
        self.try_send(OutboundFrame::from(text))
    }

    /// 请求会话关闭（由过期清理触发）
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    /// 等待关闭请求
    pub async fn closed(&self) {
        self.shutdown.notified().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct Binding {
    user_id: String,
    connection: Connection,
    last_seen: Instant,
}

#[derive(Default)]
struct RegistryInner {
    // 用户到连接的映射
    by_user: HashMap<String, HashMap<String, Connection>>,
    // 连接到绑定信息的映射
    by_connection: HashMap<String, Binding>,
}

impl RegistryInner {
    fn unbind(&mut self, connection_id: &str) -> Option<Binding> {
        let binding = self.by_connection.remove(connection_id)?;
        if let Some(connections) = self.by_user.get_mut(&binding.user_id) {
            connections.remove(connection_id);
            if connections.is_empty() {
                self.by_user.remove(&binding.user_id);
            }
        }
        Some(binding)
    }
}

/// 连接注册表：recipient → 当前打开的连接
///
/// 所有操作都是同步的，锁不会跨越 `.await`。
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把连接绑定到用户；已绑定的连接会先从旧用户解绑
    pub fn join(&self, connection: &Connection, user_id: &str) {
        let mut inner = self.inner.write();

        if let Some(previous) = inner.unbind(connection.id()) {
            if previous.user_id != user_id {
                debug!(
                    "Connection {} rebinding from user {} to user {}",
                    connection.id(),
                    previous.user_id,
                    user_id
                );
            }
        }

        inner
            .by_user
            .entry(user_id.to_string())
            .or_default()
            .insert(connection.id().to_string(), connection.clone());
        inner.by_connection.insert(
            connection.id().to_string(),
            Binding {
                user_id: user_id.to_string(),
                connection: connection.clone(),
                last_seen: Instant::now(),
            },
        );

        info!("Connection {} joined as user {}", connection.id(), user_id);
    }

    /// 解绑连接；未绑定的连接是空操作
    pub fn leave(&self, connection_id: &str) -> Option<String> {
        let binding = self.inner.write().unbind(connection_id)?;
        info!("Connection {} left user {}", connection_id, binding.user_id);
        Some(binding.user_id)
    }

    /// 某用户当前连接的快照
    pub fn connections_for(&self, user_id: &str) -> Vec<Connection> {
        self.inner
            .read()
            .by_user
            .get(user_id)
            .map(|connections| connections.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn user_for(&self, connection_id: &str) -> Option<String> {
        self.inner
            .read()
            .by_connection
            .get(connection_id)
            .map(|binding| binding.user_id.clone())
    }

    /// 更新心跳时间
    pub fn touch(&self, connection_id: &str) {
        if let Some(binding) = self.inner.write().by_connection.get_mut(connection_id) {
            binding.last_seen = Instant::now();
        }
    }

    /// 清理超过 `max_idle` 没有任何上行流量的连接，并通知其会话关闭
    pub fn sweep_stale(&self, max_idle: Duration) -> Vec<String> {
        let now = Instant::now();
        let stale: Vec<Binding> = {
            let mut inner = self.inner.write();
            let stale_ids: Vec<String> = inner
                .by_connection
                .iter()
                .filter(|(_, binding)| now.duration_since(binding.last_seen) > max_idle)
                .map(|(id, _)| id.clone())
                .collect();

            stale_ids
                .iter()
                .filter_map(|id| inner.unbind(id))
                .collect()
        };

        stale
            .into_iter()
            .map(|binding| {
                warn!(
                    "Cleaning up stale connection: {} for user: {}",
                    binding.connection.id(),
                    binding.user_id
                );
                binding.connection.close();
                binding.connection.id().to_string()
            })
            .collect()
    }

    /// 获取用户在线状态
    pub fn online_status(&self, user_id: &str) -> OnlineStatus {
        let active_connections = self
            .inner
            .read()
            .by_user
            .get(user_id)
            .map(|connections| connections.len())
            .unwrap_or(0);

        OnlineStatus {
            user_id: user_id.to_string(),
            is_online: active_connections > 0,
            active_connections,
        }
    }

    /// 获取在线统计
    pub fn stats(&self) -> WebSocketStats {
        let inner = self.inner.read();
        WebSocketStats {
            total_connections: inner.by_connection.len(),
            active_users: inner.by_user.len(),
        }
    }
}
