// In-process pact API stand-in for tests
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::retry::RetryPolicy;

/// Scripted responses per endpoint (`local`, `send`, `poll`). Scripted
/// responses are served in order, then the `always` fallback, then 404.
#[derive(Default)]
pub struct MockNode {
    scripted: Mutex<HashMap<String, VecDeque<(u16, Value)>>>,
    fallback: Mutex<HashMap<String, (u16, Value)>>,
    hits: Mutex<HashMap<String, usize>>,
    bodies: Mutex<Vec<(String, Value)>>,
}

impl MockNode {
    pub fn script(&self, kind: &str, status: u16, body: Value) {
        self.scripted
            .lock()
            .unwrap()
            .entry(kind.to_string())
            .or_default()
            .push_back((status, body));
    }

    pub fn always(&self, kind: &str, status: u16, body: Value) {
        self.fallback
            .lock()
            .unwrap()
            .insert(kind.to_string(), (status, body));
    }

    pub fn hits(&self, kind: &str) -> usize {
        self.hits.lock().unwrap().get(kind).copied().unwrap_or(0)
    }

    pub fn bodies(&self, kind: &str) -> Vec<Value> {
        self.bodies
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == kind)
            .map(|(_, b)| b.clone())
            .collect()
    }

    pub fn last_body(&self, kind: &str) -> Option<Value> {
        self.bodies(kind).pop()
    }

    fn respond(&self, kind: &str, body: Value) -> (u16, Value) {
        *self.hits.lock().unwrap().entry(kind.to_string()).or_default() += 1;
        self.bodies.lock().unwrap().push((kind.to_string(), body));
        if let Some(next) = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(kind)
            .and_then(VecDeque::pop_front)
        {
            return next;
        }
        self.fallback
            .lock()
            .unwrap()
            .get(kind)
            .cloned()
            .unwrap_or((404, json!({})))
    }
}

async fn handle(
    State(node): State<Arc<MockNode>>,
    Path(kind): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let (status, reply) = node.respond(&kind, body);
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(reply),
    )
}

/// Serve `node` on an ephemeral port and return its base url.
pub async fn spawn_node(node: Arc<MockNode>) -> String {
    let app = Router::new()
        .route("/:kind", post(handle))
        .with_state(node);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/", addr)
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        initial_backoff: Duration::from_millis(5),
        backoff_factor: 2.0,
        receipt_retries: 3,
    }
}
