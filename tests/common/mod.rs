#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use social_notify::{app, config::Config, models::user::*, state::AppState};
use tower::ServiceExt;

pub async fn setup() -> (Router, Arc<AppState>) {
    setup_with(Config::default()).await
}

pub async fn setup_with(config: Config) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(config).await.unwrap());
    (app(state.clone()), state)
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(json) => Body::from(json.to_string()),
        None => Body::empty(),
    };
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub async fn create_user(state: &AppState, username: &str) -> User {
    state
        .user_service
        .create_user(CreateUserRequest {
            username: username.to_string(),
            email: format!("{}@example.com", username),
        })
        .await
        .unwrap()
}
