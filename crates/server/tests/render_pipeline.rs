//! End-to-end tests for the upload -> watch -> download pipeline.
//!
//! Each test boots the full app (layers included) on an ephemeral port,
//! drives it with a real HTTP/WebSocket client, and scripts the render
//! pipeline so status sequences are deterministic.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use holoforge_core::AppConfig;
use holoforge_server::render::{ProgressSink, RenderError, Renderer};
use holoforge_server::{create_app, AppState};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

const ARTIFACT_BYTES: &[u8] = b"rendered-hologram-artifact";

/// Renderer that waits for the test's signal, reports the scripted progress
/// values, then completes or fails on cue.
struct ScriptedRenderer {
    gate: Arc<Notify>,
    steps: Vec<u8>,
    failure: Option<String>,
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn render(
        &self,
        _input: &Path,
        output: &Path,
        progress: ProgressSink,
    ) -> Result<(), RenderError> {
        self.gate.notified().await;
        for &pct in &self.steps {
            progress(pct);
        }
        if let Some(message) = &self.failure {
            return Err(RenderError::Pipeline {
                message: message.clone(),
            });
        }
        tokio::fs::write(output, ARTIFACT_BYTES)
            .await
            .map_err(|e| RenderError::Output {
                path: output.display().to_string(),
                source: e,
            })?;
        Ok(())
    }
}

struct TestServer {
    base: String,
    addr: SocketAddr,
    state: Arc<AppState>,
    handle: JoinHandle<()>,
    _tmp: tempfile::TempDir,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Boot the full app with the given renderer on an ephemeral port.
async fn start_server(renderer: Arc<dyn Renderer>) -> TestServer {
    let tmp = tempfile::tempdir().unwrap();
    let config = AppConfig {
        upload_dir: tmp.path().join("uploads"),
        output_dir: tmp.path().join("outputs"),
        ..AppConfig::default()
    };
    config.ensure_dirs().unwrap();
    let state = AppState::with_renderer(config, renderer);

    let app = create_app(state.clone(), None);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://{addr}"),
        addr,
        state,
        handle,
        _tmp: tmp,
    }
}

/// Upload one file through reqwest's multipart support, returning the
/// response as parsed JSON plus the HTTP status.
async fn upload(
    server: &TestServer,
    filename: &str,
    mime: &str,
    payload: Vec<u8>,
) -> (reqwest::StatusCode, serde_json::Value) {
    let part = reqwest::multipart::Part::bytes(payload)
        .file_name(filename.to_string())
        .mime_str(mime)
        .unwrap();
    let form = reqwest::multipart::Form::new().part("file", part);

    let response = reqwest::Client::new()
        .post(format!("{}/upload", server.base))
        .multipart(form)
        .send()
        .await
        .expect("upload request");

    let status = response.status();
    let body = response.json().await.expect("JSON body");
    (status, body)
}

fn jpeg_payload(len: usize) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.resize(len.max(4), 0x11);
    bytes
}

/// Collect every status frame on the watch socket until the server closes
/// it, returning the frames plus the close code.
async fn collect_frames(
    addr: SocketAddr,
    job_id: String,
) -> (Vec<serde_json::Value>, Option<u16>) {
    let url = format!("ws://{addr}/ws/{job_id}");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("websocket connect");

    let mut frames = Vec::new();
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame");
        match msg {
            Some(Ok(Message::Text(text))) => {
                frames.push(serde_json::from_str(text.as_str()).expect("JSON frame"));
            }
            Some(Ok(Message::Close(frame))) => {
                return (frames, frame.map(|f| u16::from(f.code)));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => panic!("websocket error: {e}"),
            None => return (frames, None),
        }
    }
}

fn position_of(frames: &[serde_json::Value], status: &str, progress: Option<u64>) -> usize {
    frames
        .iter()
        .position(|f| {
            f["status"] == status
                && progress.map_or(true, |p| f["progress"].as_u64() == Some(p))
        })
        .unwrap_or_else(|| panic!("no frame with status={status} progress={progress:?} in {frames:?}"))
}

// =============================================================================
// Tests
// =============================================================================

/// A watching client sees processing at 0 and 50 percent, then the terminal
/// completed frame, and can download the exact artifact bytes afterwards.
#[tokio::test]
async fn test_upload_watch_download_happy_path() {
    let gate = Arc::new(Notify::new());
    let server = start_server(Arc::new(ScriptedRenderer {
        gate: gate.clone(),
        steps: vec![50],
        failure: None,
    }))
    .await;

    let payload = jpeg_payload(2 * 1024 * 1024);
    let (status, body) = upload(&server, "clip.jpg", "image/jpeg", payload).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    let job_id = body["job_id"].as_str().expect("job_id in response");

    // Open the watch before releasing the renderer so every scripted
    // transition lands on this socket.
    let frames_task = tokio::spawn(collect_frames(server.addr, job_id.to_string()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    gate.notify_one();

    let (frames, close_code) = frames_task.await.unwrap();
    assert_eq!(close_code, Some(1000), "settled stream closes normally");

    let start = position_of(&frames, "processing", Some(0));
    let midway = position_of(&frames, "processing", Some(50));
    let done = position_of(&frames, "completed", None);
    assert!(start < midway && midway < done, "frames out of order: {frames:?}");

    let artifact = frames[done]["output_ref"].as_str().expect("artifact name");
    assert!(
        artifact.starts_with("hologram_clip_") && artifact.ends_with(".png"),
        "unexpected artifact name {artifact}"
    );

    // Progress never regresses across the whole stream.
    let observed: Vec<u64> = frames
        .iter()
        .filter_map(|f| f["progress"].as_u64())
        .collect();
    assert!(
        observed.windows(2).all(|w| w[0] <= w[1]),
        "progress regressed: {observed:?}"
    );

    let response = reqwest::get(format!("{}/download/{job_id}", server.base))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-disposition")
            .and_then(|v| v.to_str().ok()),
        Some(format!("attachment; filename=\"{artifact}\"").as_str())
    );
    assert_eq!(response.bytes().await.unwrap().as_ref(), ARTIFACT_BYTES);

    // The same artifact is reachable through the static outputs mount.
    let response = reqwest::get(format!("{}/outputs/{artifact}", server.base))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.bytes().await.unwrap().as_ref(), ARTIFACT_BYTES);
}

/// An upload over the ceiling is refused with the contractual message, and
/// no job record is created for it.
#[tokio::test]
async fn test_oversized_upload_rejected_with_exact_message() {
    let server = start_server(Arc::new(ScriptedRenderer {
        gate: Arc::new(Notify::new()),
        steps: vec![],
        failure: None,
    }))
    .await;

    let payload = vec![0u8; 60 * 1024 * 1024];
    let (status, body) = upload(&server, "clip.mp4", "video/mp4", payload).await;

    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "File size must be less than 50MB");
    assert!(server.state.registry.is_empty(), "no job for a rejected upload");
}

/// A pipeline failure surfaces its message verbatim on the watch stream and
/// in the snapshot, and the artifact endpoint refuses the job.
#[tokio::test]
async fn test_failed_render_reports_detail_and_refuses_download() {
    let gate = Arc::new(Notify::new());
    let server = start_server(Arc::new(ScriptedRenderer {
        gate: gate.clone(),
        steps: vec![30],
        failure: Some("decode error".to_string()),
    }))
    .await;

    let (status, body) = upload(&server, "photo.png", "image/png", png_payload()).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let frames_task = tokio::spawn(collect_frames(server.addr, job_id.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    gate.notify_one();

    let (frames, close_code) = frames_task.await.unwrap();
    assert_eq!(close_code, Some(1000));
    let last = frames.last().expect("at least the terminal frame");
    assert_eq!(last["status"], "failed");
    assert_eq!(last["error_detail"], "decode error");

    let snapshot = reqwest::get(format!("{}/status/{job_id}", server.base))
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(snapshot["status"], "failed");
    assert_eq!(snapshot["error_detail"], "decode error");
    assert_eq!(snapshot["progress"], 30, "failure keeps the last progress");

    let response = reqwest::get(format!("{}/download/{job_id}", server.base))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body = response.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["error"], "Result not ready or job failed");
}

/// Watching a job id that was never issued yields an error frame and a
/// 4004 close.
#[tokio::test]
async fn test_watch_unknown_job_closes_with_4004() {
    let server = start_server(Arc::new(ScriptedRenderer {
        gate: Arc::new(Notify::new()),
        steps: vec![],
        failure: None,
    }))
    .await;

    let url = format!("ws://{}/ws/never-issued", server.addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out")
        .expect("stream ended")
        .expect("socket error");
    match first {
        Message::Text(text) => {
            let frame: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(frame["error"], "Job not found");
        }
        other => panic!("expected error frame, got {other:?}"),
    }

    let second = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out")
        .expect("stream ended")
        .expect("socket error");
    match second {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::from(4004)),
        other => panic!("expected close frame, got {other:?}"),
    }
}

/// The health probe answers through the full app stack.
#[tokio::test]
async fn test_health_probe() {
    let server = start_server(Arc::new(ScriptedRenderer {
        gate: Arc::new(Notify::new()),
        steps: vec![],
        failure: None,
    }))
    .await;

    let body = reqwest::get(format!("{}/health", server.base))
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

fn png_payload() -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.resize(4096, 0x22);
    bytes
}
