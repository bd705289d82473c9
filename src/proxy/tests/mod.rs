
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Router,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex as AsyncMutex;

/// One canned upstream response.
#[derive(Clone)]
pub struct ScriptedResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Bytes,
}

impl ScriptedResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: Bytes::from(body.to_string()),
        }
    }

    pub fn sse(body: &'static str) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            body: Bytes::from_static(body.as_bytes()),
        }
    }
}

#[derive(Clone)]
pub struct CapturedRequest {
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json_body(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("captured body should be JSON")
    }
}

#[derive(Clone, Default)]
pub struct MockUpstream {
    script: Arc<AsyncMutex<VecDeque<ScriptedResponse>>>,
    requests: Arc<AsyncMutex<Vec<CapturedRequest>>>,
}

impl MockUpstream {
    pub async fn push(&self, response: ScriptedResponse) {
        self.script.lock().await.push_back(response);
    }

    pub async fn captured(&self) -> Vec<CapturedRequest> {
        self.requests.lock().await.clone()
    }
}

async fn mock_handler(
    State(state): State<MockUpstream>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut captured = Vec::new();
    for (name, value) in &headers {
        captured.push((
            name.as_str().to_string(),
            value.to_str().unwrap_or("<non-utf8>").to_string(),
        ));
    }
    state.requests.lock().await.push(CapturedRequest {
        headers: captured,
        body,
    });

    let scripted = state
        .script
        .lock()
        .await
        .pop_front()
        .unwrap_or_else(|| ScriptedResponse::json(200, serde_json::json!({"ok": true})));

    Response::builder()
        .status(StatusCode::from_u16(scripted.status).expect("valid scripted status"))
        .header(header::CONTENT_TYPE, scripted.content_type)
        .body(Body::from(scripted.body))
        .expect("mock response")
}

/// Binds a scripted upstream on an ephemeral port. Returns its base URL.
pub async fn start_mock_upstream() -> (String, MockUpstream, tokio::task::JoinHandle<()>) {
    let state = MockUpstream::default();
    let app = Router::new()
        .fallback(mock_handler)
        .with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock upstream");
    });
    (format!("http://{}", addr), state, server)
}
