pub mod follow;
pub mod notification;
pub mod post;
pub mod user;
pub mod websocket;
