use axum::extract::State;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::AppState;

pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>pulse</title></head>
<body>
<h1>pulse market stream</h1>
<ul>
<li><code>GET /ws</code> websocket, one JSON snapshot per indicator update</li>
<li><code>GET /latest_data</code> most recent snapshot, <code>{}</code> before the first one</li>
<li><code>GET /health</code> liveness and subscriber count</li>
</ul>
</body>
</html>
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub subscribers: usize,
    pub history_len: usize,
    pub has_snapshot: bool,
}

pub(crate) async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub(crate) async fn latest_data(State(state): State<AppState>) -> Response {
    match state.hub.latest() {
        Some(snapshot) => Json(&*snapshot).into_response(),
        None => Json(json!({})).into_response(),
    }
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok".to_string(),
        subscribers: state.hub.subscriber_count(),
        history_len: state.feed.history().len(),
        has_snapshot: state.hub.latest().is_some(),
    })
}
