// crates/client/src/watch.rs
//! Live progress transport: follows one job over its WebSocket channel,
//! degrading to `/status` polling when the channel is unavailable.
//!
//! [`follow`] drives a [`StatusReconciler`] to settlement. [`Monitor`] wraps
//! it in a spawned task and enforces the client half of the
//! single-subscription rule: starting a new watch tears the previous one
//! down first.

use std::time::Duration;

use futures_util::StreamExt;
use holoforge_core::{parse_frame, Frame, JobId};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::api::HoloClient;
use crate::error::{ClientError, Result};
use crate::reconciler::{Applied, Phase, StatusReconciler};

/// Fallback poll cadence once the live channel is gone.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// The server pings every 15s, so a silent channel is a dead one well
/// before this elapses.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Close code the server uses for an unknown job.
const CLOSE_NOT_FOUND: u16 = 4004;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open the raw progress channel for one job.
pub async fn connect_channel(client: &HoloClient, job_id: &JobId) -> Result<WsStream> {
    let (ws, _) = tokio_tungstenite::connect_async(client.ws_endpoint(job_id)).await?;
    Ok(ws)
}

enum LiveOutcome {
    Settled,
    Cancelled,
    Degraded(String),
}

/// Follow one job until it settles or the token is cancelled.
///
/// Tries the live channel first and falls back to polling `/status` when
/// the channel cannot be opened or goes quiet; either way the frames flow
/// through the same reconciler, so the monotonic and terminal guards hold.
/// `on_update` fires once per applied frame. There is no internal deadline;
/// callers own the overall timeout.
///
/// Returns the final phase. On cancellation that phase may be non-terminal.
pub async fn follow<F>(
    client: &HoloClient,
    job_id: &JobId,
    reconciler: &mut StatusReconciler,
    cancel: &CancellationToken,
    mut on_update: F,
) -> Result<Phase>
where
    F: FnMut(&Applied, &StatusReconciler),
{
    match watch_live(client, job_id, reconciler, cancel, &mut on_update).await? {
        LiveOutcome::Settled | LiveOutcome::Cancelled => Ok(reconciler.phase().clone()),
        LiveOutcome::Degraded(reason) => {
            reconciler.channel_unavailable(reason.clone());
            tracing::warn!(
                job_id = %job_id,
                reason = %reason,
                "live channel unavailable, falling back to polling"
            );
            poll_until_settled(client, job_id, reconciler, cancel, &mut on_update).await
        }
    }
}

async fn watch_live<F>(
    client: &HoloClient,
    job_id: &JobId,
    reconciler: &mut StatusReconciler,
    cancel: &CancellationToken,
    on_update: &mut F,
) -> Result<LiveOutcome>
where
    F: FnMut(&Applied, &StatusReconciler),
{
    let mut ws = match connect_channel(client, job_id).await {
        Ok(ws) => ws,
        Err(e) => return Ok(LiveOutcome::Degraded(format!("connect failed: {e}"))),
    };
    reconciler.channel_opened()?;
    tracing::debug!(job_id = %job_id, "progress channel open");

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws.close(None).await;
                return Ok(LiveOutcome::Cancelled);
            }
            next = tokio::time::timeout(IDLE_TIMEOUT, ws.next()) => next,
        };

        let message = match next {
            Err(_) => return Ok(LiveOutcome::Degraded("channel went quiet".into())),
            Ok(None) => {
                return Ok(LiveOutcome::Degraded(
                    "channel ended before the job settled".into(),
                ))
            }
            Ok(Some(Err(e))) => return Ok(LiveOutcome::Degraded(format!("channel error: {e}"))),
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                let applied = reconciler.apply(parse_frame(&text));
                on_update(&applied, reconciler);
                // The server closes right after the terminal frame; no need
                // to wait for it.
                if reconciler.is_settled() {
                    return Ok(LiveOutcome::Settled);
                }
            }
            Message::Close(frame) => {
                let code = frame.as_ref().map(|f| u16::from(f.code));
                if code == Some(CLOSE_NOT_FOUND) {
                    return Err(ClientError::JobNotFound);
                }
                if reconciler.is_settled() {
                    return Ok(LiveOutcome::Settled);
                }
                return Ok(LiveOutcome::Degraded(match code {
                    Some(code) => format!("channel closed ({code}) before the job settled"),
                    None => "channel closed before the job settled".into(),
                }));
            }
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
        }
    }
}

/// Manual status checks at a fixed cadence, feeding the reconciler the
/// snapshot projected onto the wire-event shape.
async fn poll_until_settled<F>(
    client: &HoloClient,
    job_id: &JobId,
    reconciler: &mut StatusReconciler,
    cancel: &CancellationToken,
    on_update: &mut F,
) -> Result<Phase>
where
    F: FnMut(&Applied, &StatusReconciler),
{
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(reconciler.phase().clone()),
            _ = ticker.tick() => {}
        }

        let snapshot = client.status(job_id).await?;
        let applied = reconciler.apply(Frame::Event(snapshot.to_event()));
        on_update(&applied, reconciler);
        if reconciler.is_settled() {
            return Ok(reconciler.phase().clone());
        }
    }
}

/// One observation from a [`Monitor`] watch task.
#[derive(Debug)]
pub enum WatchUpdate {
    /// A frame was folded into the display state.
    Applied { outcome: Applied, progress: u8 },
    /// The watch ended; a non-terminal phase means it was torn down.
    Finished(Phase),
    /// The watch failed outright (unknown job, transport failure while
    /// polling).
    Aborted(ClientError),
}

struct WatchTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns at most one live watch task.
///
/// `watch` cancels and awaits the previous task before connecting anew, so
/// two channels for different jobs never race each other's updates.
pub struct Monitor {
    client: HoloClient,
    active: Option<WatchTask>,
}

impl Monitor {
    pub fn new(client: HoloClient) -> Self {
        Self {
            client,
            active: None,
        }
    }

    pub fn is_watching(&self) -> bool {
        self.active.is_some()
    }

    /// Watch a job, tearing down any previous watch first. Updates arrive
    /// on the returned channel until the watch finishes or is superseded.
    pub async fn watch(&mut self, job_id: JobId) -> mpsc::UnboundedReceiver<WatchUpdate> {
        self.stop().await;

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let client = self.client.clone();
        let handle = tokio::spawn(async move {
            let mut reconciler = StatusReconciler::attached(job_id.clone());
            let updates = tx.clone();
            let result = follow(
                &client,
                &job_id,
                &mut reconciler,
                &task_cancel,
                move |outcome, state| {
                    let _ = updates.send(WatchUpdate::Applied {
                        outcome: outcome.clone(),
                        progress: state.progress(),
                    });
                },
            )
            .await;
            let _ = tx.send(match result {
                Ok(phase) => WatchUpdate::Finished(phase),
                Err(e) => WatchUpdate::Aborted(e),
            });
        });

        self.active = Some(WatchTask { cancel, handle });
        rx
    }

    /// Cancel the active watch and wait for its task to finish.
    pub async fn stop(&mut self) {
        if let Some(task) = self.active.take() {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                if e.is_panic() {
                    tracing::error!(error = %e, "watch task panicked");
                }
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        // Best effort: the task notices the token soon after; nothing to
        // await here.
        if let Some(task) = self.active.take() {
            task.cancel.cancel();
        }
    }
}
