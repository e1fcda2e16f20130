//! Test utilities for integration tests
// Each test binary only uses some of these
#![allow(dead_code)]

use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::{Router, http::Request};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tower::util::ServiceExt;

use gemini_chat::ai::catalog::{ModelCatalog, ModelPreference};
use gemini_chat::ai::chat::ChatBuilder;
use gemini_chat::ai::retry::RetryPolicy;
use gemini_chat::api::{AppState, app};
use gemini_chat::api::public::chat::SessionResponse;
use gemini_chat::gemini::RemoteModel;

pub const FLASH: &str = "models/gemini-1.5-flash-latest";
pub const PRO: &str = "models/gemini-1.5-pro-latest";

/// Creates a test application router whose Gemini requests go to
/// `gemini_url`, usually a `mockito` server. The catalog holds Flash
/// (the default) and Pro.
pub fn test_app(gemini_url: &str) -> Router {
    test_app_with_state(gemini_url).0
}

/// Like `test_app` but also returns the shared state behind the router
pub fn test_app_with_state(gemini_url: &str) -> (Router, Arc<RwLock<AppState>>) {
    let available: Vec<RemoteModel> = [FLASH, PRO]
        .iter()
        .map(|name| RemoteModel {
            name: name.to_string(),
            display_name: name.to_string(),
            supported_generation_methods: vec!["generateContent".to_string()],
        })
        .collect();
    let preferences = vec![
        ModelPreference::new("Gemini 1.5 Flash", FLASH),
        ModelPreference::new("Gemini 1.5 Pro", PRO),
    ];
    let catalog = ModelCatalog::resolve(&available, &preferences).unwrap();

    let orchestrator = ChatBuilder::new(gemini_url, "test-api-key")
        .retry(RetryPolicy::default().with_unit(Duration::from_millis(1)))
        .build(catalog);
    let shared_state = Arc::new(RwLock::new(AppState::new(orchestrator)));
    (app(Arc::clone(&shared_state)), shared_state)
}

/// A Gemini host that accepts connections and never answers, so a
/// message sent to it keeps its session busy.
pub async fn stalled_gemini_host() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            open.push(socket);
        }
    });
    format!("http://{addr}")
}

/// A Gemini host that answers every request with `body` as a
/// streamed response after waiting for `delay`.
pub async fn slow_gemini_host(body: String, delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let body = body.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                // Keep the connection open, the client closes it
                let mut buf = vec![0u8; 4096];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                }
            });
        }
    });
    format!("http://{addr}")
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Create a session through the API and return it
pub async fn create_session(app: &Router) -> SessionResponse {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/sessions")
                .method("POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), http::StatusCode::CREATED);
    serde_json::from_str(&body_to_string(response.into_body()).await).unwrap()
}

/// The JSON payload of each `data:` line in an SSE body
pub fn sse_events(body: &str) -> Vec<serde_json::Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

/// A Gemini streaming response body made of one event per chunk
pub fn gemini_sse_body(chunks: &[&str]) -> String {
    chunks
        .iter()
        .map(|text| {
            let chunk = serde_json::json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
            });
            format!("data: {}\n\n", chunk)
        })
        .collect()
}
