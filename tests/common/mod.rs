//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header::USER_AGENT, Request, StatusCode};
use axum::Router;
use tokio::net::TcpListener;

use update_request_modifier::config::{ModifierConfig, SharedConfig};
use update_request_modifier::observability::RecordingSink;
use update_request_modifier::store::MemoryLogStore;
use update_request_modifier::UpdateInterceptor;

/// A request as the upstream received it.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    pub uri: String,
    pub user_agent: Option<String>,
    pub body: String,
}

pub type CaptureLog = Arc<Mutex<Vec<Captured>>>;

/// Start a programmable upstream on an ephemeral port. Every request is
/// captured; `f` decides the status and body of the reply.
pub async fn start_programmable_backend<F, Fut>(f: F) -> (SocketAddr, CaptureLog)
where
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured: CaptureLog = Arc::default();

    let log = captured.clone();
    let app = Router::new().fallback(move |request: Request<Body>| {
        let log = log.clone();
        let f = f.clone();
        async move {
            let method = request.method().to_string();
            let uri = request.uri().to_string();
            let user_agent = request
                .headers()
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = axum::body::to_bytes(request.into_body(), usize::MAX)
                .await
                .unwrap_or_default();
            log.lock().unwrap().push(Captured {
                method,
                uri,
                user_agent,
                body: String::from_utf8_lossy(&body).into_owned(),
            });

            let (status, body) = f().await;
            (StatusCode::from_u16(status).unwrap_or(StatusCode::OK), body)
        }
    });

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (addr, captured)
}

/// Start an upstream that always answers `status`.
pub async fn start_mock_backend(status: u16) -> (SocketAddr, CaptureLog) {
    start_programmable_backend(move || async move { (status, "{}".to_string()) }).await
}

/// Accept connections and never answer.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// Accept connections and close them at once; counts accepted sockets.
pub async fn start_hangup_backend() -> (SocketAddr, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicU32::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(socket);
        }
    });
    (addr, accepted)
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Interceptor over a memory store with a recording sink.
pub fn interceptor(config: ModifierConfig) -> (Arc<UpdateInterceptor>, Arc<MemoryLogStore>, RecordingSink) {
    let store = Arc::new(MemoryLogStore::new());
    let sink = RecordingSink::new();
    let interceptor = UpdateInterceptor::new(SharedConfig::new(config), store.clone())
        .with_events(Arc::new(sink.clone()));
    (Arc::new(interceptor), store, sink)
}

/// Default configuration monitoring `endpoints`.
pub fn config_for(endpoints: &[&str]) -> ModifierConfig {
    let mut config = ModifierConfig::default();
    config.interception.endpoints = endpoints.iter().map(|e| e.to_string()).collect();
    config.interception.site_url = "https://blog.example.com".into();
    config
}
