//! Mock web-hook endpoints for delivery tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::routing::any;
use axum::Router;

/// One request as seen by the mock endpoint.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// An in-process endpoint that answers every request with a fixed status
/// and records what it saw.
pub struct MockEndpoint {
    pub addr: SocketAddr,
    hits: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockEndpoint {
    /// Bind an ephemeral port and serve in the background.
    pub async fn start(status: StatusCode) -> Self {
        let hits: Arc<Mutex<Vec<RecordedRequest>>> = Arc::new(Mutex::new(Vec::new()));

        let app = Router::new()
            .route("/hook", any(record_handler))
            .with_state((status, hits.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock endpoint");
        let addr = listener.local_addr().expect("mock endpoint has no addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, hits }
    }

    pub fn url(&self) -> String {
        format!("http://{}/hook", self.addr)
    }

    pub fn hits(&self) -> Vec<RecordedRequest> {
        self.hits.lock().expect("hits poisoned").clone()
    }

    pub fn hit_count(&self) -> usize {
        self.hits.lock().expect("hits poisoned").len()
    }
}

async fn record_handler(
    State((status, hits)): State<(StatusCode, Arc<Mutex<Vec<RecordedRequest>>>)>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    hits.lock().expect("hits poisoned").push(RecordedRequest {
        method: method.to_string(),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    status
}

/// An address nothing listens on, for connection-failure tests.
pub async fn unreachable_url() -> String {
    // Bind then immediately drop to find a free port.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    let addr = listener.local_addr().expect("no addr");
    drop(listener);
    format!("http://{addr}/hook")
}
