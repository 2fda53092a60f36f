use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{Sink, SinkExt, StreamExt};
use market::BroadcastHub;
use tracing::{debug, info, warn};

use crate::AppState;

pub(crate) async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_snapshots(socket, state.hub))
}

/// Sends one frame, giving up after `limit`. A peer that stops reading
/// cannot park the connection task past its registry entry.
async fn send_bounded<S>(sender: &mut S, message: Message, limit: Duration) -> bool
where
    S: Sink<Message> + Unpin,
{
    matches!(tokio::time::timeout(limit, sender.send(message)).await, Ok(Ok(())))
}

// Inbound frames only keep the connection alive; their content is ignored.
async fn stream_snapshots(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let mut subscriber = hub.subscribe();
    let id = subscriber.id();
    let limit = hub.config().publish_timeout;
    let (mut sender, mut receiver) = socket.split();
    info!(subscriber = id, "websocket client connected");

    loop {
        tokio::select! {
            snapshot = subscriber.recv() => {
                let Some(snapshot) = snapshot else {
                    send_bounded(&mut sender, Message::Close(None), limit).await;
                    break;
                };
                let text = match snapshot.to_json() {
                    Ok(text) => text,
                    Err(error) => {
                        warn!(subscriber = id, %error, "snapshot serialization failed");
                        continue;
                    }
                };
                if !send_bounded(&mut sender, Message::Text(text), limit).await {
                    debug!(subscriber = id, "snapshot send failed or stalled");
                    break;
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Ping(payload))) => {
                        if !send_bounded(&mut sender, Message::Pong(payload), limit).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(error)) => {
                        debug!(subscriber = id, %error, "websocket read failed");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    hub.unsubscribe(id);
    info!(subscriber = id, "websocket client disconnected");
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::{Duration, Instant};

    use axum::extract::ws::Message;
    use futures_util::Sink;

    use super::send_bounded;

    // never accepts a frame, like a peer whose TCP window stays closed
    struct StalledPeer;

    impl Sink<Message> for StalledPeer {
        type Error = ();

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), ()>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), ()> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), ()>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), ()>> {
            Poll::Pending
        }
    }

    #[tokio::test]
    async fn stalled_peer_send_gives_up_after_limit() {
        let started = Instant::now();
        let sent = send_bounded(
            &mut StalledPeer,
            Message::Text("{}".to_string()),
            Duration::from_millis(50),
        )
        .await;
        assert!(!sent);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn ready_peer_send_succeeds() {
        let mut sink = futures_util::sink::drain();
        assert!(send_bounded(&mut sink, Message::Text("{}".to_string()), Duration::from_millis(50)).await);
    }
}
