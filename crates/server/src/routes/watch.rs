// crates/server/src/routes/watch.rs
//! Live status streaming over WebSocket.
//!
//! `GET /ws/{job_id}` upgrades and pushes one JSON frame per accepted
//! transition. Every connection starts with a hydration frame carrying the
//! current snapshot, so a client that reconnects mid-job never has to guess
//! what it missed. A job holds one live watcher at a time: a newer
//! connection supersedes the old one, which is closed with code 4001.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
    routing::get,
    Router,
};
use holoforge_core::{JobId, StatusEvent};
use tokio::sync::broadcast::error::RecvError;

use crate::registry::JobEntry;
use crate::state::AppState;

/// Job settled; the stream has nothing more to say.
pub const CLOSE_SETTLED: u16 = 1000;
/// Server is going away mid-job.
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// A newer watcher took over this job.
pub const CLOSE_SUPERSEDED: u16 = 4001;
/// No job with the requested id.
pub const CLOSE_NOT_FOUND: u16 = 4004;

const HEARTBEAT_SECS: u64 = 15;

/// GET /ws/{job_id} - stream status transitions for one job.
pub async fn watch_ws(
    ws: WebSocketUpgrade,
    Path(job_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let id = JobId::from(job_id);
    let Some(entry) = state.registry.get(&id) else {
        tracing::warn!(job_id = %id, "Watch requested for unknown job");
        return ws.on_upgrade(move |mut socket| async move {
            let frame = serde_json::json!({ "error": "Job not found" }).to_string();
            let _ = socket.send(Message::Text(frame.into())).await;
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_NOT_FOUND,
                    reason: "job not found".into(),
                })))
                .await;
        });
    };

    ws.on_upgrade(move |socket| stream_status(socket, entry))
}

async fn stream_status(mut socket: WebSocket, entry: Arc<JobEntry>) {
    // Subscribe before snapshotting so no transition can land between the
    // hydration frame and the first broadcast delivery.
    let mut watch = entry.watch();

    let snapshot = entry.snapshot().status_event();
    if send_event(&mut socket, &snapshot).await.is_err() {
        return;
    }
    if snapshot.is_terminal() {
        close(socket, CLOSE_SETTLED, "job settled").await;
        return;
    }

    tracing::debug!(job_id = %entry.id(), "Watcher attached");

    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_SECS));
    heartbeat.tick().await; // first tick fires immediately

    loop {
        if !entry.is_current(&watch) {
            tracing::debug!(job_id = %entry.id(), "Watcher superseded");
            close(socket, CLOSE_SUPERSEDED, "superseded by a newer watcher").await;
            return;
        }

        tokio::select! {
            event = watch.rx.recv() => match event {
                Ok(event) => {
                    // A watcher that lost its claim while parked must not
                    // steal frames from its successor.
                    if !entry.is_current(&watch) {
                        close(socket, CLOSE_SUPERSEDED, "superseded by a newer watcher").await;
                        return;
                    }
                    let terminal = event.is_terminal();
                    if send_event(&mut socket, &event).await.is_err() {
                        return;
                    }
                    if terminal {
                        close(socket, CLOSE_SETTLED, "job settled").await;
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(job_id = %entry.id(), skipped, "Watcher lagged; resending snapshot");
                    let snapshot = entry.snapshot().status_event();
                    let terminal = snapshot.is_terminal();
                    if send_event(&mut socket, &snapshot).await.is_err() {
                        return;
                    }
                    if terminal {
                        close(socket, CLOSE_SETTLED, "job settled").await;
                        return;
                    }
                }
                Err(RecvError::Closed) => {
                    // The registry outlives its watchers; this is shutdown.
                    close(socket, CLOSE_GOING_AWAY, "server shutting down").await;
                    return;
                }
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | None => {
                    tracing::debug!(job_id = %entry.id(), "Watcher disconnected");
                    return;
                }
                // Inbound frames carry nothing; the stream is one-way.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(job_id = %entry.id(), error = %e, "Watcher socket error");
                    return;
                }
            },
            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(vec![].into())).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &StatusEvent) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    socket.send(Message::Text(text.into())).await
}

async fn close(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws/{job_id}", get(watch_ws))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use futures_util::StreamExt;
    use holoforge_core::AppConfig;
    use tokio::net::TcpStream;
    use tokio::task::JoinHandle;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::Message as TgMessage;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start_test_server() -> (Arc<AppState>, SocketAddr, JoinHandle<()>, tempfile::TempDir)
    {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig {
            upload_dir: tmp.path().join("uploads"),
            output_dir: tmp.path().join("outputs"),
            ..AppConfig::default()
        };
        config.ensure_dirs().unwrap();
        let state = AppState::new(config);

        let app = router().with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (state, addr, handle, tmp)
    }

    async fn ws_connect(addr: SocketAddr, job_id: &str) -> WsClient {
        let url = format!("ws://{addr}/ws/{job_id}");
        let (ws, _) = connect_async(&url).await.expect("websocket connect");
        ws
    }

    async fn recv_frame(ws: &mut WsClient) -> TgMessage {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended unexpectedly")
                .expect("websocket error");
            match msg {
                TgMessage::Ping(_) | TgMessage::Pong(_) => continue,
                other => return other,
            }
        }
    }

    async fn recv_json(ws: &mut WsClient) -> serde_json::Value {
        match recv_frame(ws).await {
            TgMessage::Text(text) => {
                serde_json::from_str(text.as_str()).expect("frame is valid JSON")
            }
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    async fn expect_close(ws: &mut WsClient, code: u16) {
        match recv_frame(ws).await {
            TgMessage::Close(Some(frame)) => {
                assert_eq!(frame.code, CloseCode::from(code), "close code mismatch");
            }
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_job_gets_error_frame_and_4004() {
        let (_state, addr, server, _tmp) = start_test_server().await;

        let mut ws = ws_connect(addr, "no-such-job").await;
        let frame = recv_json(&mut ws).await;
        assert_eq!(frame["error"], "Job not found");
        expect_close(&mut ws, CLOSE_NOT_FOUND).await;

        server.abort();
    }

    #[tokio::test]
    async fn test_watcher_sees_hydration_then_every_transition() {
        let (state, addr, server, _tmp) = start_test_server().await;
        let entry = state.registry.create();

        let mut ws = ws_connect(addr, entry.id().as_str()).await;
        assert_eq!(recv_json(&mut ws).await["status"], "queued");

        entry.begin().unwrap();
        let frame = recv_json(&mut ws).await;
        assert_eq!(frame["status"], "processing");
        assert_eq!(frame["progress"], 0);

        entry.advance(50).unwrap();
        let frame = recv_json(&mut ws).await;
        assert_eq!(frame["status"], "processing");
        assert_eq!(frame["progress"], 50);

        entry.complete("hologram_photo_x.png").unwrap();
        let frame = recv_json(&mut ws).await;
        assert_eq!(frame["status"], "completed");
        assert_eq!(frame["output_ref"], "hologram_photo_x.png");

        expect_close(&mut ws, CLOSE_SETTLED).await;
        server.abort();
    }

    #[tokio::test]
    async fn test_settled_job_gets_snapshot_then_normal_close() {
        let (state, addr, server, _tmp) = start_test_server().await;
        let entry = state.registry.create();
        entry.begin().unwrap();
        entry.fail("decode error").unwrap();

        let mut ws = ws_connect(addr, entry.id().as_str()).await;
        let frame = recv_json(&mut ws).await;
        assert_eq!(frame["status"], "failed");
        assert_eq!(frame["error_detail"], "decode error");

        expect_close(&mut ws, CLOSE_SETTLED).await;
        server.abort();
    }

    #[tokio::test]
    async fn test_new_watcher_supersedes_old_with_4001() {
        let (state, addr, server, _tmp) = start_test_server().await;
        let entry = state.registry.create();

        let mut first = ws_connect(addr, entry.id().as_str()).await;
        assert_eq!(recv_json(&mut first).await["status"], "queued");

        // Once the second hydration frame arrives, its subscription (and
        // the epoch bump) is in place.
        let mut second = ws_connect(addr, entry.id().as_str()).await;
        assert_eq!(recv_json(&mut second).await["status"], "queued");

        entry.advance(10).unwrap();

        expect_close(&mut first, CLOSE_SUPERSEDED).await;
        let frame = recv_json(&mut second).await;
        assert_eq!(frame["status"], "processing");
        assert_eq!(frame["progress"], 10);

        server.abort();
    }

    #[tokio::test]
    async fn test_reconnect_after_drop_resumes_from_snapshot() {
        let (state, addr, server, _tmp) = start_test_server().await;
        let entry = state.registry.create();
        entry.begin().unwrap();

        let mut first = ws_connect(addr, entry.id().as_str()).await;
        assert_eq!(recv_json(&mut first).await["progress"], 0);
        drop(first);

        entry.advance(40).unwrap();

        let mut second = ws_connect(addr, entry.id().as_str()).await;
        let frame = recv_json(&mut second).await;
        assert_eq!(frame["status"], "processing");
        assert_eq!(frame["progress"], 40, "hydration carries missed progress");

        entry.complete("out.png").unwrap();
        assert_eq!(recv_json(&mut second).await["status"], "completed");
        expect_close(&mut second, CLOSE_SETTLED).await;

        server.abort();
    }
}
