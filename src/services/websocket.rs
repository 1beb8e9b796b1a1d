use crate::{
    config::Config,
    error::{AppError, DeliveryError, Result},
    models::websocket::*,
    services::connection::{Connection, ConnectionRegistry},
};
use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const WRITER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket会话管理
///
/// 每条连接一个会话：下行由独立的写任务消费有界队列并定期发送 Ping，
/// 上行在当前任务里处理。连接在发送 join 之前不会收到任何通知，
/// 超过 `join_timeout` 仍未 join 的连接会被关闭。
#[derive(Clone)]
pub struct WebSocketService {
    registry: Arc<ConnectionRegistry>,
    outbound_buffer: usize,
    ping_interval: Duration,
    join_timeout: Duration,
}

impl WebSocketService {
    pub fn new(registry: Arc<ConnectionRegistry>, config: &Config) -> Self {
        Self {
            registry,
            outbound_buffer: config.ws_outbound_buffer,
            ping_interval: Duration::from_secs(config.ws_ping_interval.max(1)),
            join_timeout: Duration::from_secs(config.ws_stale_timeout.max(1)),
        }
    }

    /// 处理新的WebSocket连接，直到连接关闭
    pub async fn handle_connection(&self, websocket: WebSocket, connection_id: String) -> Result<()> {
        info!("New WebSocket connection: {}", connection_id);

        let (mut ws_tx, mut ws_rx) = websocket.split();
        let (connection, mut rx) = Connection::new(connection_id.clone(), self.outbound_buffer);

        // 写任务：下行帧与心跳 Ping
        let writer_id = connection_id.clone();
        let ping_interval = self.ping_interval;
        let send_task = tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
            loop {
                tokio::select! {
                    frame = rx.recv() => {
                        let Some(frame) = frame else { break };
                        if let Err(e) = ws_tx.send(Message::Text(frame.to_string())).await {
                            error!("Failed to send WebSocket message to {}: {}", writer_id, e);
                            break;
                        }
                    }
                    _ = heartbeat.tick() => {
                        if let Err(e) = ws_tx.send(Message::Ping(Vec::new())).await {
                            debug!("Failed to ping connection {}: {}", writer_id, e);
                            break;
                        }
                    }
                }
            }
            let _ = ws_tx.close().await;
            debug!("Send task ended for connection: {}", writer_id);
        });

        let connect_msg = WebSocketMessage::new(
            WebSocketMessageType::Connect,
            json!({ "connection_id": connection_id }),
        );
        if let Err(e) = connection.send(&connect_msg) {
            error!("Failed to send connect message: {}", e);
        }

        let join_deadline = tokio::time::sleep(self.join_timeout);
        tokio::pin!(join_deadline);
        let mut awaiting_join = true;

        loop {
            tokio::select! {
                _ = connection.closed() => {
                    info!("Closing stale connection: {}", connection_id);
                    break;
                }
                _ = &mut join_deadline, if awaiting_join => {
                    awaiting_join = false;
                    if self.registry.user_for(&connection_id).is_none() {
                        warn!("Connection {} did not join within {:?}, closing", connection_id, self.join_timeout);
                        break;
                    }
                }
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = self.handle_incoming_message(&connection, &text) {
                            warn!("Rejected message from {}: {}", connection_id, e);
                            let reply = WebSocketMessage::error("INVALID_MESSAGE", &e.to_string());
                            if let Err(e) = connection.send(&reply) {
                                debug!("Failed to send error reply to {}: {}", connection_id, e);
                            }
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!("Ignoring binary message of {} bytes from {}", data.len(), connection_id);
                        self.registry.touch(&connection_id);
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // axum 自动回复 Ping；Pong 来自写任务的心跳
                        self.registry.touch(&connection_id);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket connection closed: {}", connection_id);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error for connection {}: {}", connection_id, e);
                        break;
                    }
                }
            }
        }

        self.registry.leave(&connection_id);
        // 丢掉最后一个发送端，写任务随之退出
        drop(connection);

        if tokio::time::timeout(WRITER_SHUTDOWN_TIMEOUT, send_task).await.is_err() {
            warn!("Send task for {} did not finish in time", connection_id);
        }

        info!("Connection {} finished", connection_id);
        Ok(())
    }

    /// 处理上行文本消息
    fn handle_incoming_message(&self, connection: &Connection, text: &str) -> Result<()> {
        debug!("Received message from {}: {}", connection.id(), text);

        let message: IncomingMessage = serde_json::from_str(text)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON: {}", e)))?;

        self.registry.touch(connection.id());

        let reply = match message.message_type {
            WebSocketMessageType::Join => {
                let join: JoinRequest = serde_json::from_value(message.data)
                    .map_err(|e| AppError::BadRequest(format!("Invalid join request: {}", e)))?;
                if join.user_id.trim().is_empty() {
                    return Err(AppError::bad_request("user_id is required"));
                }

                self.registry.join(connection, &join.user_id);
                WebSocketMessage::new(
                    WebSocketMessageType::Joined,
                    json!({
                        "connection_id": connection.id(),
                        "user_id": join.user_id,
                    }),
                )
            }
            WebSocketMessageType::Ping => WebSocketMessage::pong(connection.id()),
            other => {
                if self.registry.user_for(connection.id()).is_none() {
                    WebSocketMessage::error("NOT_JOINED", "Send a join message first")
                } else {
                    WebSocketMessage::error(
                        "UNSUPPORTED_MESSAGE",
                        &format!("Unsupported message type: {:?}", other),
                    )
                }
            }
        };

        match connection.send(&reply) {
            Ok(()) => Ok(()),
            Err(DeliveryError::QueueFull(id)) => {
                warn!("Dropped reply to {}: outbound queue full", id);
                Ok(())
            }
            Err(e) => Err(AppError::internal(&e.to_string())),
        }
    }

    pub fn stats(&self) -> WebSocketStats {
        self.registry.stats()
    }

    pub fn online_status(&self, user_id: &str) -> OnlineStatus {
        self.registry.online_status(user_id)
    }

    /// 清理过期连接，返回被清理的连接数
    pub fn cleanup_stale_connections(&self, max_idle: Duration) -> usize {
        let removed = self.registry.sweep_stale(max_idle);
        if !removed.is_empty() {
            info!("Cleaned up {} stale connection(s)", removed.len());
        }
        removed.len()
    }
}
