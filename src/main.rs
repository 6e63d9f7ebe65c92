mod config;
mod daemon;
mod patterns;
mod prompt;
mod resolver;
mod runner;
mod state;
mod store;
mod submit;
mod transition;
mod types;
mod wake;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::daemon::DaemonOptions;
use crate::state::StateRepository;
use crate::store::TaskStore;
use crate::submit::{SubmitClient, Submission};
use crate::types::SubmissionType;

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("--version") | Some("-V") => {
            println!("wakerd {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some("--help") | Some("-h") => {
            print_usage();
            return Ok(());
        }
        _ => {}
    }

    let config_path = PathBuf::from(
        flag_value(&args, "--config").unwrap_or_else(|| "config.toml".to_string()),
    );

    match args.first().map(String::as_str) {
        Some("wake") => {
            let slug = match args.get(1).filter(|s| !s.starts_with("--")) {
                Some(slug) => slug.clone(),
                None => {
                    eprintln!("Usage: wakerd wake <agent-slug>");
                    if let Ok(config) = AppConfig::load(&config_path) {
                        let repo = StateRepository::new(&config.agents.dir);
                        let agents = repo.available_agents();
                        if !agents.is_empty() {
                            eprintln!("\nAvailable agents:");
                            for agent in agents {
                                eprintln!("  - {agent}");
                            }
                        }
                    }
                    std::process::exit(1);
                }
            };
            run_async(cmd_wake(config_path, slug))
        }
        Some("submit") => run_async(cmd_submit(config_path, args)),
        _ => run_async(cmd_daemon(config_path, args)),
    }
}

fn run_async<F: Future<Output = anyhow::Result<()>>>(future: F) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(future)
}

/// Run the wake-request poll daemon (the default command).
async fn cmd_daemon(config_path: PathBuf, args: Vec<String>) -> anyhow::Result<()> {
    let config = AppConfig::load(&config_path)?;
    let service_key = config::require_service_key()?;
    let store = TaskStore::new(
        &config.store.base_url,
        &service_key,
        config.store.timeout_secs,
    )?;

    let interval_ms = flag_value(&args, "--interval")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(config.daemon.poll_interval_ms);

    let opts = DaemonOptions {
        poll_interval: Duration::from_millis(interval_ms),
        once: has_flag(&args, "--once"),
        agent_filter: flag_value(&args, "--agent"),
        config_path,
        store_url: store.base_url().to_string(),
    };

    daemon::run(&store, &opts).await
}

/// Run one wake cycle for one agent (also the daemon's child entry point).
async fn cmd_wake(config_path: PathBuf, slug: String) -> anyhow::Result<()> {
    let config = AppConfig::load(&config_path)?;
    let service_key = config::require_service_key()?;
    let store = TaskStore::new(
        &config.store.base_url,
        &service_key,
        config.store.timeout_secs,
    )?;

    wake::wake_agent(&config, &store, &slug).await
}

/// Submit through the agent boundary and mirror the result locally.
async fn cmd_submit(config_path: PathBuf, args: Vec<String>) -> anyhow::Result<()> {
    let config = AppConfig::load(&config_path)?;

    let slug = flag_value(&args, "--agent")
        .ok_or_else(|| anyhow::anyhow!("--agent <slug> is required for submit"))?;
    let title = flag_value(&args, "--title")
        .ok_or_else(|| anyhow::anyhow!("--title is required for submit"))?;
    let content = flag_value(&args, "--content")
        .ok_or_else(|| anyhow::anyhow!("--content is required for submit"))?;

    let submission_type = match flag_value(&args, "--type") {
        Some(raw) => SubmissionType::parse(&raw).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown submission type '{}'. Valid: proposal, work_update, \
                 assistance_request, completion, small_telos_proposal",
                raw
            )
        })?,
        None => SubmissionType::Proposal,
    };

    let submission = Submission {
        title,
        content,
        category: flag_value(&args, "--category").unwrap_or_else(|| "feature".to_string()),
        submission_type,
        assistance_needed: flag_value(&args, "--assistance"),
        parent_proposal_id: flag_value(&args, "--parent"),
    };

    let repo = StateRepository::new(&config.agents.dir);
    repo.require_agent_dir(&slug)?;
    let mut state = repo.load(&slug)?;

    let agent_key = config::require_agent_key()?;
    let client = SubmitClient::new(&config.submit_url(), &agent_key)?;
    let proposal = client.submit(&submission).await?;

    submit::record_submission(&mut state, &submission, &proposal, Utc::now());
    repo.save(&slug, &state)?;

    // Parent processes (the wake chain) pick the id out of this line.
    println!("proposal_id: {}", proposal.id);
    Ok(())
}

fn print_usage() {
    println!("wakerd {}", env!("CARGO_PKG_VERSION"));
    println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
    println!("Usage: wakerd [COMMAND] [OPTIONS]\n");
    println!("Commands:");
    println!("  (default)            Run the wake-request poll daemon");
    println!("  wake <agent-slug>    Run one wake cycle for one agent");
    println!("  submit               Submit through the agent governance boundary");
    println!("\nDaemon options:");
    println!("  --interval <ms>   Polling interval in milliseconds (default: 5000)");
    println!("  --once            Process one request and exit");
    println!("  --agent <slug>    Only process requests for a specific agent");
    println!("  --config <path>   Config file (default: config.toml)");
    println!("\nSubmit options:");
    println!("  --agent <slug>        Agent whose state records the submission");
    println!("  --title <text>        Submission title (min 5 chars)");
    println!("  --content <text>      Submission body (min 20 chars)");
    println!("  --category <name>     feature|bug|app_idea|improvement|docs|integration|tokenomics");
    println!("  --type <name>         proposal|work_update|assistance_request|completion|small_telos_proposal");
    println!("  --assistance <text>   What help is needed (assistance_request)");
    println!("  --parent <id>         Parent proposal id");
    println!("\nEnvironment:");
    println!("  {}   Task Store service credential (daemon, wake)", config::SERVICE_KEY_ENV);
    println!("  {}         Agent submission key (submit)", config::AGENT_KEY_ENV);
    println!("  {}           Override the configured store URL", config::STORE_URL_ENV);
}

fn flag_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}
