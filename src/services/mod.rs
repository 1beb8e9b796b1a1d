pub mod database;
pub mod user;
pub mod follow;
pub mod post;
pub mod notification;
pub mod connection;
pub mod realtime;
pub mod websocket;
pub mod fanout;

// 重新导出常用类型
pub use database::Database;
pub use user::UserService;
pub use follow::FollowService;
pub use post::PostService;
pub use notification::{NotificationService, NotificationWrite};
pub use connection::{Connection, ConnectionRegistry};
pub use realtime::RealtimeService;
pub use websocket::WebSocketService;
pub use fanout::{FanoutService, PostFanout};
