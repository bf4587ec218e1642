//! Per-connection WebSocket lifecycle.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::dispatcher::Dispatcher;
use crate::protocol::ProtocolError;
use crate::registry::ConnectionRegistry;

/// How long the writer gets to flush queued frames after the reader stops.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a connection task needs from the server.
#[derive(Clone)]
pub struct SocketContext {
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub token: CancellationToken,
    pub heartbeat_interval: Duration,
}

enum Inbound<'a> {
    Frame(&'a str),
    Closed,
    Ignored,
    Invalid,
}

fn classify(msg: &WsMessage) -> Inbound<'_> {
    match msg {
        WsMessage::Text(text) => Inbound::Frame(text.as_str()),
        WsMessage::Binary(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Inbound::Frame(text),
            Err(_) => Inbound::Invalid,
        },
        WsMessage::Close(_) => Inbound::Closed,
        // axum answers pings itself.
        WsMessage::Ping(_) | WsMessage::Pong(_) => Inbound::Ignored,
    }
}

/// Register the connection, process its frames strictly in order, and
/// deregister it when the client leaves, misbehaves, or the server shuts down.
pub async fn handle_socket(socket: WebSocket, ctx: SocketContext) {
    let (conn, rx) = ctx.registry.register();
    let connection_id = conn.id.clone();
    info!(connection_id = %connection_id, "websocket client connected");

    let (ws_tx, mut ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        rx,
        ctx.heartbeat_interval,
        connection_id.to_string(),
    ));
    let mut writer_finished = false;

    loop {
        tokio::select! {
            _ = ctx.token.cancelled() => {
                debug!(connection_id = %connection_id, "shutdown, closing connection");
                break;
            }
            _ = &mut writer => {
                writer_finished = true;
                break;
            }
            next = ws_rx.next() => {
                let msg = match next {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        debug!(connection_id = %connection_id, error = %e, "websocket read failed");
                        break;
                    }
                    None => break,
                };
                match classify(&msg) {
                    Inbound::Frame(raw) => {
                        if let Err(e) = ctx.dispatcher.dispatch(&conn, raw).await {
                            warn!(connection_id = %connection_id, error = %e, "closing connection");
                            break;
                        }
                    }
                    Inbound::Invalid => {
                        warn!(
                            connection_id = %connection_id,
                            error = %ProtocolError::NotUtf8,
                            "closing connection"
                        );
                        break;
                    }
                    Inbound::Closed => break,
                    Inbound::Ignored => {}
                }
            }
        }
    }

    ctx.registry.deregister(&connection_id);
    let dropped = conn.drop_count();
    let age = conn.age();
    // Last sender gone: the writer drains what is queued, then closes.
    drop(conn);

    if !writer_finished
        && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
            .await
            .is_err()
    {
        debug!(connection_id = %connection_id, "writer did not drain in time");
        writer.abort();
    }

    info!(
        connection_id = %connection_id,
        dropped_frames = dropped,
        connected_secs = age.as_secs(),
        "websocket client disconnected"
    );
}

/// Forward queued frames to the socket and ping on an interval. Sends a
/// Close frame once the queue is closed and drained.
async fn write_loop<S>(
    mut ws_tx: S,
    mut rx: mpsc::Receiver<String>,
    heartbeat_interval: Duration,
    connection_id: String,
) where
    S: futures::Sink<WsMessage> + Unpin,
{
    let mut ping_interval = tokio::time::interval(heartbeat_interval);
    ping_interval.tick().await; // first tick is immediate

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(text) => {
                    if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                None => break,
            },
            _ = ping_interval.tick() => {
                if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    return;
                }
                trace!(connection_id = %connection_id, "sent ping");
            }
        }
    }

    let _ = ws_tx.send(WsMessage::Close(None)).await;
    let _ = ws_tx.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;

    #[test]
    fn classify_frames() {
        assert!(matches!(
            classify(&WsMessage::Text("load_chats|||".into())),
            Inbound::Frame("load_chats|||")
        ));
        assert!(matches!(
            classify(&WsMessage::Binary(b"load_chats|||".to_vec().into())),
            Inbound::Frame("load_chats|||")
        ));
        assert!(matches!(
            classify(&WsMessage::Binary(vec![0xff, 0xfe].into())),
            Inbound::Invalid
        ));
        assert!(matches!(classify(&WsMessage::Close(None)), Inbound::Closed));
        assert!(matches!(
            classify(&WsMessage::Ping(Vec::new().into())),
            Inbound::Ignored
        ));
    }

    #[tokio::test]
    async fn writer_drains_queue_then_closes() {
        let (sink_tx, mut sink_rx) = fmpsc::unbounded::<WsMessage>();
        let (tx, rx) = mpsc::channel(8);
        tx.send("a|||".to_string()).await.unwrap();
        tx.send("b|||".to_string()).await.unwrap();
        drop(tx);

        write_loop(sink_tx, rx, Duration::from_secs(60), "conn_test".into()).await;

        let mut texts = Vec::new();
        let mut saw_close = false;
        while let Some(msg) = sink_rx.next().await {
            match msg {
                WsMessage::Text(t) => texts.push(t.as_str().to_string()),
                WsMessage::Close(_) => saw_close = true,
                _ => {}
            }
        }
        assert_eq!(texts, vec!["a|||", "b|||"]);
        assert!(saw_close);
    }

    #[tokio::test(start_paused = true)]
    async fn writer_sends_heartbeat_pings() {
        let (sink_tx, mut sink_rx) = fmpsc::unbounded::<WsMessage>();
        let (tx, rx) = mpsc::channel::<String>(8);
        let writer = tokio::spawn(write_loop(sink_tx, rx, Duration::from_secs(30), "conn_test".into()));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(matches!(sink_rx.next().await, Some(WsMessage::Ping(_))));

        drop(tx);
        writer.await.unwrap();
    }
}
