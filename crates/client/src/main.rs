// crates/client/src/main.rs
//! Holoforge CLI — submit media, follow jobs to settlement, fetch artifacts.
//!
//! Re-expresses the browser flow as subcommands: `submit` uploads and (by
//! default) watches the job live until the artifact is ready; `watch`,
//! `status`, and `download` pick up existing jobs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use holoforge_client::{follow, Applied, ClientError, HoloClient, Phase, StatusReconciler};
use holoforge_core::JobId;

#[derive(Parser)]
#[command(name = "holoforge-cli")]
#[command(about = "Submit media to a Holoforge server and follow jobs to completion")]
struct Cli {
    /// Server endpoint
    #[arg(long, global = true, default_value = "http://127.0.0.1:47810")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a media file (PNG, JPG, AVI, MP4) and follow it to settlement
    Submit {
        /// File to upload
        file: PathBuf,
        /// Where to save the artifact (defaults to the artifact's name)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Print the job id and return without watching
        #[arg(long)]
        no_watch: bool,
        /// Seconds to wait for the job to settle
        #[arg(long, default_value_t = 600)]
        timeout: u64,
    },
    /// Follow an existing job until it settles
    Watch {
        job_id: String,
        /// Seconds to wait for the job to settle
        #[arg(long, default_value_t = 600)]
        timeout: u64,
    },
    /// Print one status snapshot
    Status { job_id: String },
    /// Download the artifact of a completed job
    Download {
        job_id: String,
        /// Where to save the artifact (defaults to the artifact's name)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check whether the server is reachable
    Health,
}

/// Progress display for the watch loop. Live frames and poll snapshots
/// render the same way, with the degraded mode called out.
fn print_update(applied: &Applied, state: &StatusReconciler) {
    match applied {
        Applied::Progress(pct) => {
            let mode = if state.live_updates() { "" } else { " (polling)" };
            eprint!("\rprocessing {pct:>3}%{mode}");
        }
        Applied::Completed { .. } | Applied::Failed { .. } => eprintln!(),
        Applied::Note(status) => eprintln!("status: {status}"),
        Applied::Ignored(_) => {}
    }
}

async fn follow_job(client: &HoloClient, job_id: &JobId, timeout_secs: u64) -> Result<Phase> {
    let mut reconciler = StatusReconciler::attached(job_id.clone());
    let cancel = CancellationToken::new();
    let phase = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        follow(client, job_id, &mut reconciler, &cancel, print_update),
    )
    .await
    .map_err(|_| ClientError::Timeout)??;
    Ok(phase)
}

/// Save a completed job's artifact next to the cwd (or at `output`).
async fn save_artifact(client: &HoloClient, job_id: &JobId, output: Option<PathBuf>) -> Result<()> {
    let artifact = client.download(job_id).await?;
    let path = output.unwrap_or_else(|| PathBuf::from(&artifact.filename));
    tokio::fs::write(&path, &artifact.bytes)
        .await
        .with_context(|| format!("cannot write {}", path.display()))?;
    println!("✓ saved {} ({} bytes)", path.display(), artifact.bytes.len());
    Ok(())
}

async fn cmd_submit(
    client: &HoloClient,
    file: &Path,
    output: Option<PathBuf>,
    no_watch: bool,
    timeout: u64,
) -> Result<()> {
    let submission = client.submit(file).await?;
    println!("✓ accepted as job {}", submission.job_id);

    if no_watch {
        println!("  follow with: holoforge-cli watch {}", submission.job_id);
        return Ok(());
    }

    match follow_job(client, &submission.job_id, timeout).await? {
        Phase::Done { output_ref } => {
            println!("✓ completed: {output_ref}");
            save_artifact(client, &submission.job_id, output).await
        }
        Phase::Errored { detail } => bail!("job failed: {detail}"),
        other => bail!("watch ended while {other}"),
    }
}

async fn cmd_watch(client: &HoloClient, job_id: JobId, timeout: u64) -> Result<()> {
    match follow_job(client, &job_id, timeout).await? {
        Phase::Done { output_ref } => {
            println!("✓ completed: {output_ref}");
            println!("  download with: holoforge-cli download {job_id}");
            Ok(())
        }
        Phase::Errored { detail } => bail!("job failed: {detail}"),
        other => bail!("watch ended while {other}"),
    }
}

async fn cmd_status(client: &HoloClient, job_id: JobId) -> Result<()> {
    let snapshot = client.status(&job_id).await?;
    println!(
        "{}  {}  {}%",
        snapshot.job_id, snapshot.status, snapshot.progress
    );
    if let Some(output_ref) = &snapshot.output_ref {
        println!("artifact: {output_ref}");
    }
    if let Some(detail) = &snapshot.error_detail {
        println!("error: {detail}");
    }
    Ok(())
}

async fn cmd_health(client: &HoloClient) -> Result<()> {
    if client.health().await? {
        println!("✓ {} is healthy", client.endpoint());
        Ok(())
    } else {
        bail!("{} responded unhealthy", client.endpoint())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let client = HoloClient::new(cli.endpoint);

    match cli.command {
        Commands::Submit {
            file,
            output,
            no_watch,
            timeout,
        } => cmd_submit(&client, &file, output, no_watch, timeout).await,
        Commands::Watch { job_id, timeout } => {
            cmd_watch(&client, JobId::from(job_id), timeout).await
        }
        Commands::Status { job_id } => cmd_status(&client, JobId::from(job_id)).await,
        Commands::Download { job_id, output } => {
            save_artifact(&client, &JobId::from(job_id), output).await
        }
        Commands::Health => cmd_health(&client).await,
    }
}
