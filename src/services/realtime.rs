use crate::{
    error::DeliveryError,
    models::{notification::Notification, websocket::WebSocketMessage},
    services::connection::{ConnectionRegistry, OutboundFrame},
};
use std::sync::Arc;
use tracing::{debug, warn};

/// 实时投递通道
/// 把通知推给接收者当前所有的在线连接，尽力而为
#[derive(Clone)]
pub struct RealtimeService {
    registry: Arc<ConnectionRegistry>,
}

impl RealtimeService {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// 推送通知，返回成功放入下行队列的连接数
    ///
    /// 0 表示接收者离线，不是错误。单个连接失败只记录日志，
    /// 已关闭的连接顺带从注册表移除。
    pub fn push(&self, recipient_id: &str, notification: &Notification) -> usize {
        let connections = self.registry.connections_for(recipient_id);
        if connections.is_empty() {
            debug!("User {} offline, notification {} stored only", recipient_id, notification.id);
            return 0;
        }

        let frame = match encode(notification) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode notification {}: {}", notification.id, e);
                return 0;
            }
        };

        let mut reached = 0;
        for connection in connections {
            match connection.try_send(frame.clone()) {
                Ok(()) => reached += 1,
                Err(DeliveryError::Closed(connection_id)) => {
                    warn!("Dropping closed connection {} for user {}", connection_id, recipient_id);
                    self.registry.leave(&connection_id);
                }
                Err(e) => {
                    warn!("Failed to push notification {} to user {}: {}", notification.id, recipient_id, e);
                }
            }
        }

        debug!(
            "Pushed notification {} to {} connection(s) of user {}",
            notification.id, reached, recipient_id
        );
        reached
    }
}

fn encode(notification: &Notification) -> Result<OutboundFrame, DeliveryError> {
    let message = WebSocketMessage::notification(notification)?;
    Ok(OutboundFrame::from(serde_json::to_string(&message)?))
}
