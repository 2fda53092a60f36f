use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use chrono::{TimeZone, Utc};
use futures_util::StreamExt;
use gateway::{router, serve, AppState, HealthReport};
use market::{BroadcastHub, Feed, Snapshot};
use pulse::{Bar, PriceTick, Timeframe};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

fn snapshot(minute: u32, close: f64) -> Arc<Snapshot> {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 14, minute, 0).unwrap();
    let mut indicators = BTreeMap::new();
    indicators.insert("RSI".to_string(), 55.5);
    Arc::new(Snapshot {
        symbol: "EUR/GBP".to_string(),
        interval: Timeframe::M1,
        latest_price: Some(PriceTick::new("EUR/GBP", close, at)),
        latest_indicators: indicators,
        recent_bars: vec![Bar::new(at, close, close, close, close, 1.0)],
        as_of: at,
    })
}

fn state() -> AppState {
    AppState::new(
        Arc::new(BroadcastHub::default()),
        Arc::new(Feed::new("EUR/GBP", Timeframe::M1)),
    )
}

fn origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

async fn get_json(state: AppState, uri: &str) -> (StatusCode, Value) {
    let response = router(state, &origins())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn latest_data_is_empty_object_before_first_publish() {
    let (status, body) = get_json(state(), "/latest_data").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({}));
}

#[tokio::test]
async fn latest_data_returns_current_snapshot() {
    let state = state();
    state.hub.publish(snapshot(5, 0.8561)).await;
    state.hub.publish(snapshot(6, 0.8570)).await;

    let (_, body) = get_json(state, "/latest_data").await;
    assert_eq!(body["symbol"], "EUR/GBP");
    assert_eq!(body["interval"], "1min");
    assert_eq!(body["latest_price"]["price"], 0.857);
    assert_eq!(body["latest_indicators"]["RSI"], 55.5);
    assert_eq!(body["recent_bars"][0]["close"], 0.857);
    assert_eq!(body["timestamp"], "2024-03-01T14:06:00Z");
}

#[tokio::test]
async fn health_reports_pipeline_state() {
    let state = state();
    let _held = state.hub.subscribe();
    state.feed.ingest_bar(Bar::new(Utc::now(), 1.0, 1.0, 1.0, 1.0, 0.0));

    let (_, body) = get_json(state.clone(), "/health").await;
    let report: HealthReport = serde_json::from_value(body).unwrap();
    assert_eq!(
        report,
        HealthReport {
            status: "ok".to_string(),
            subscribers: 1,
            history_len: 1,
            has_snapshot: false,
        }
    );
}

#[tokio::test]
async fn index_page_lists_endpoints() {
    let response = router(state(), &origins())
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("/latest_data"));
    assert!(html.contains("/ws"));
}

#[tokio::test]
async fn cors_allows_only_listed_origins() {
    let request = |origin: &str| {
        Request::builder()
            .uri("/health")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap()
    };

    let allowed = router(state(), &origins())
        .oneshot(request("http://localhost:3000"))
        .await
        .unwrap();
    assert_eq!(
        allowed.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:3000"
    );

    let denied = router(state(), &origins())
        .oneshot(request("http://evil.test"))
        .await
        .unwrap();
    assert!(denied.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

    let open = router(state(), &["*".to_string()])
        .oneshot(request("http://evil.test"))
        .await
        .unwrap();
    assert_eq!(open.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
}

async fn next_text<S>(stream: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("message within timeout")
            .expect("stream open")
            .expect("frame");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn websocket_streams_current_then_live_snapshots() {
    let state = state();
    let hub = Arc::clone(&state.hub);
    hub.publish(snapshot(5, 0.8561)).await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let server = tokio::spawn(serve(listener, router(state, &origins()), shutdown_rx));

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("websocket handshake");

    let first = next_text(&mut client).await;
    assert_eq!(first["timestamp"], "2024-03-01T14:05:00Z");

    hub.publish(snapshot(6, 0.8570)).await;
    let second = next_text(&mut client).await;
    assert_eq!(second["timestamp"], "2024-03-01T14:06:00Z");
    assert_eq!(hub.subscriber_count(), 1);

    hub.close();
    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(frame) = client.next().await {
            if matches!(frame, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
    })
    .await;
    assert!(ended.is_ok());
    assert_eq!(hub.subscriber_count(), 0);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server stops")
        .unwrap()
        .unwrap();
}
