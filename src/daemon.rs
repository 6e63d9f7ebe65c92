use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::runner::stream_lines;
use crate::store::WakeStore;
use crate::types::WakeRequest;

/// Operator-facing knobs for the poll loop.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub poll_interval: Duration,
    /// Process at most one request, then exit.
    pub once: bool,
    /// Only claim requests for this agent.
    pub agent_filter: Option<String>,
    /// Config file forwarded to wake subprocesses.
    pub config_path: PathBuf,
    /// Store URL, for the startup banner only.
    pub store_url: String,
}

/// Wake scripts and CLI agents announce created proposals in their output;
/// the daemon reports the id back to the store when it can find one.
static PROPOSAL_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)proposal[_-]?id[:\s]+([a-f0-9-]+)").expect("static regex")
});

pub fn extract_proposal_id(output: &str) -> Option<String> {
    PROPOSAL_ID_RE
        .captures(output)
        .map(|captures| captures[1].to_string())
}

/// Run the poll loop until interrupted (or once, in single-shot mode).
///
/// Every cycle: heartbeat, claim at most one request, process it in a
/// child process, report the outcome. Nothing in a cycle is allowed to
/// kill the loop; infra errors are logged and the next cycle proceeds.
/// Cross-daemon exclusivity rests entirely on the store's atomic claim.
pub async fn run(store: &dyn WakeStore, opts: &DaemonOptions) -> anyhow::Result<()> {
    info!("=== Agent Wake Daemon ===");
    info!(interval_ms = opts.poll_interval.as_millis() as u64, "Polling interval");
    if let Some(agent) = &opts.agent_filter {
        info!(agent = %agent, "Filtering for agent");
    }
    if opts.once {
        info!("Mode: process once and exit");
    }
    info!(store = %opts.store_url, "Task store");

    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());

    loop {
        if let Err(e) = store.update_heartbeat(&host).await {
            // Liveness is best-effort; a failed ping never stops the loop.
            warn!("Heartbeat failed: {:#}", e);
        }

        debug!("Checking for pending wake requests...");
        let request = match store.claim_wake_request(opts.agent_filter.as_deref()).await {
            Ok(request) => request,
            Err(e) => {
                error!("Error claiming request: {:#}", e);
                None
            }
        };

        let claimed = request.is_some();
        if let Some(request) = request {
            process_request(store, opts, &request).await;
        }

        if opts.once {
            if !claimed {
                info!("No pending requests. Exiting.");
            }
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(opts.poll_interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down daemon...");
                return Ok(());
            }
        }
    }
}

/// Handle one claimed request end to end. Never propagates: both success
/// and failure are reported to the store, and reporting failures are only
/// logged.
async fn process_request(store: &dyn WakeStore, opts: &DaemonOptions, request: &WakeRequest) {
    let age_secs = (Utc::now() - request.requested_at).num_seconds();
    info!(
        agent = %request.agent_slug,
        request = %request.request_id,
        age_secs,
        "Processing wake request"
    );

    match run_wake_child(&request.agent_slug, &opts.config_path).await {
        Ok(stdout) => {
            let proposal_id = extract_proposal_id(&stdout);
            info!(agent = %request.agent_slug, "Wake completed successfully");
            if let Some(id) = &proposal_id {
                info!(proposal = %id, "Proposal created");
            }
            if let Err(e) = store
                .complete_wake_request(&request.request_id, proposal_id.as_deref(), None)
                .await
            {
                error!("Failed to report completion: {:#}", e);
            }
        }
        Err(e) => {
            error!(agent = %request.agent_slug, "Wake failed: {:#}", e);
            let message = format!("{:#}", e);
            if let Err(e) = store
                .complete_wake_request(&request.request_id, None, Some(&message))
                .await
            {
                error!("Failed to report failure: {:#}", e);
            }
        }
    }
}

/// Spawn `wakerd wake <slug>` as an isolated child, streaming its output
/// live to the console while capturing it for proposal-id extraction.
async fn run_wake_child(slug: &str, config_path: &Path) -> anyhow::Result<String> {
    let exe = std::env::current_exe()?;
    info!(agent = %slug, "Spawning wake subprocess");

    let mut child = tokio::process::Command::new(&exe)
        .arg("wake")
        .arg(slug)
        .arg("--config")
        .arg(config_path)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| anyhow::anyhow!("Failed to spawn wake subprocess: {}", e))?;

    let stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("stdout not piped"))?;
    let stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("stderr not piped"))?;

    let stdout_buf = Arc::new(Mutex::new(String::new()));
    let stderr_buf = Arc::new(Mutex::new(String::new()));
    let stdout_task = tokio::spawn(stream_lines(stdout_pipe, stdout_buf.clone(), false));
    let stderr_task = tokio::spawn(stream_lines(stderr_pipe, stderr_buf.clone(), true));

    let status = child.wait().await?;
    let _ = stdout_task.await;
    let _ = stderr_task.await;

    let stdout = stdout_buf.lock().await.clone();
    let stderr = stderr_buf.lock().await.clone();

    if status.success() {
        Ok(stdout)
    } else {
        let code = status
            .code()
            .map_or("unknown".to_string(), |c| c.to_string());
        let detail = if stderr.trim().is_empty() {
            stdout
        } else {
            stderr
        };
        anyhow::bail!("Wake subprocess exited with code {}: {}", code, detail.trim())
    }
}
