use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::{Json, Router};
use dialogflow_proxy::{app, build_state, AppConfig, AppState, Edition, TextSelection};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Tracks environment variable mutations and restores originals on drop.
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

#[allow(dead_code)]
impl EnvGuard {
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    pub fn set_many(&mut self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.capture(key);
        std::env::remove_var(key);
    }

    fn capture(&mut self, key: &str) {
        if self.originals.contains_key(key) {
            return;
        }
        let original = std::env::var(key).ok();
        self.originals.insert(key.to_string(), original);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// One request observed by the mock Dialogflow endpoint.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct RecordedCall {
    pub path: String,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct MockState {
    reply: Arc<(StatusCode, Value)>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

async fn mock_detect_intent(
    State(state): State<MockState>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.calls.lock().unwrap().push(RecordedCall {
        path: uri.path().to_string(),
        authorization,
        body,
    });
    let (status, reply) = state.reply.as_ref();
    (*status, Json(reply.clone()))
}

/// Spawn a stand-in for the Dialogflow REST endpoint that answers every
/// request with `reply` and records what it received.
#[allow(dead_code)]
pub async fn spawn_mock_dialogflow(
    status: StatusCode,
    reply: Value,
) -> (String, Arc<Mutex<Vec<RecordedCall>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let state = MockState {
        reply: Arc::new((status, reply)),
        calls: calls.clone(),
    };
    let router = Router::new()
        .fallback(mock_detect_intent)
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{}", addr), calls)
}

/// Configuration pointing at `endpoint` with a static ambient token.
#[allow(dead_code)]
pub fn test_config(edition: Edition, endpoint: &str) -> AppConfig {
    AppConfig {
        project_id: "demo-project".into(),
        location_id: "us-central1".into(),
        allowed_origin: "*".into(),
        port: 0,
        default_agent_id: None,
        cors_debug: false,
        edition,
        session_policy: edition.default_session_policy(),
        default_language_code: edition.default_language_code().into(),
        text_selection: TextSelection::FirstMessage,
        endpoint: endpoint.into(),
        upstream_timeout: Duration::from_secs(30),
        static_access_token: Some("ambient-token".into()),
        metadata_host: "metadata.google.internal".into(),
        max_request_bytes: None,
    }
}

#[allow(dead_code)]
pub async fn spawn_app_with_config(config: &AppConfig) -> (String, JoinHandle<()>) {
    spawn_app(build_state(config).unwrap()).await
}

// Helper to spawn an instance of the app bound to an available port.
#[allow(dead_code)]
pub async fn spawn_app(state: AppState) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = app(state);
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), handle)
}
