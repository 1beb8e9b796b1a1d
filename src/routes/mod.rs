pub mod follows;
pub mod health;
pub mod notifications;
pub mod posts;
pub mod users;
pub mod websocket;
