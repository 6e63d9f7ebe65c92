use chrono::Utc;
use tracing::info;

use crate::config::AppConfig;
use crate::prompt::build_wake_prompt;
use crate::resolver::{self, ProposalSource, WakeMode};
use crate::runner::ProcessRunner;
use crate::state::StateRepository;
use crate::transition;

/// Run one full wake cycle for one agent: load state, resolve the wake
/// mode, apply the transition, persist, and hand the prompt to the CLI
/// agent. This is what the daemon runs as a child process per claimed
/// request, and what an operator runs by hand with `wakerd wake <slug>`.
pub async fn wake_agent(
    config: &AppConfig,
    proposals: &dyn ProposalSource,
    slug: &str,
) -> anyhow::Result<()> {
    info!(agent = %slug, "Wake cycle starting");

    let repo = StateRepository::new(&config.agents.dir);
    let agent_dir = repo.require_agent_dir(slug)?;

    let mut state = repo.load(slug)?;
    info!(
        status = ?state.current_status,
        total_proposals = state.total_proposals,
        "State loaded"
    );

    let mode = resolver::resolve(&state, proposals).await?;
    info!(mode = mode.tag(), "Wake mode resolved");

    let now = Utc::now();

    if mode.is_hold() {
        match mode {
            WakeMode::Waiting => {
                info!("Last proposal still awaiting a governance response; not proceeding")
            }
            _ => info!("No assistance yet; staying blocked"),
        }
        state.last_wake = Some(now);
        repo.save(slug, &state)?;
        return Ok(());
    }

    transition::apply(&mut state, &mode, now);
    state.last_wake = Some(now);
    repo.save(slug, &state)?;

    let Some(prompt) = build_wake_prompt(&mode, &state) else {
        return Ok(());
    };

    let runner = ProcessRunner::new(config.runner.clone());
    let output = runner.run(&agent_dir, &prompt).await?;
    info!(
        agent = %slug,
        output_bytes = output.len(),
        "Wake cycle finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::state::{AgentState, AgentStatus, ExecutionState, LastProposal};
    use crate::types::{Proposal, ProposalStatus};

    struct StubProposals {
        rows: HashMap<String, Proposal>,
    }

    #[async_trait]
    impl ProposalSource for StubProposals {
        async fn fetch_proposal(&self, id: &str) -> anyhow::Result<Option<Proposal>> {
            Ok(self.rows.get(id).cloned())
        }
    }

    /// Config pointing the runner at `echo` so the cycle runs without a
    /// real CLI agent installed.
    fn test_config(agents_dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.agents.dir = agents_dir.to_string_lossy().into_owned();
        config.runner.command = "echo".into();
        config
    }

    #[tokio::test]
    async fn first_wake_runs_cli_and_persists_idle_state() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("fresh-agent")).unwrap();
        let config = test_config(tmp.path());
        let stub = StubProposals {
            rows: HashMap::new(),
        };

        wake_agent(&config, &stub, "fresh-agent").await.unwrap();

        let repo = StateRepository::new(tmp.path());
        let state = repo.load("fresh-agent").unwrap();
        assert_eq!(state.execution_state, ExecutionState::Idle);
        assert!(state.last_wake.is_some());
        assert_eq!(state.total_proposals, 0);
    }

    #[tokio::test]
    async fn waiting_agent_holds_without_running_cli() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("patient-agent")).unwrap();
        let config = {
            let mut c = test_config(tmp.path());
            // A hold cycle must never spawn the runner; a broken command
            // proves it.
            c.runner.command = "definitely-not-a-real-binary".into();
            c
        };

        let repo = StateRepository::new(tmp.path());
        let state = AgentState {
            current_status: AgentStatus::Waiting,
            last_proposal: Some(LastProposal {
                id: "p1".into(),
                title: "Add export".into(),
                status: "submitted".into(),
                feedback: None,
            }),
            ..Default::default()
        };
        repo.save("patient-agent", &state).unwrap();

        let stub = StubProposals {
            rows: [(
                "p1".to_string(),
                Proposal {
                    id: "p1".into(),
                    title: "Add export".into(),
                    status: ProposalStatus::OpenVoting,
                    agent_feedback: None,
                    reject_reason: None,
                    assistance_response: None,
                    assistance_provided_at: None,
                },
            )]
            .into(),
        };

        wake_agent(&config, &stub, "patient-agent").await.unwrap();

        let after = repo.load("patient-agent").unwrap();
        assert_eq!(after.current_status, AgentStatus::Waiting);
        assert!(after.last_wake.is_some());
        // Hold cycles leave everything else untouched.
        assert_eq!(after.last_proposal, state.last_proposal);
        assert!(after.feedback_history.is_empty());
    }

    #[tokio::test]
    async fn passed_proposal_starts_execution_and_persists_task() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("builder-agent")).unwrap();
        let config = test_config(tmp.path());

        let repo = StateRepository::new(tmp.path());
        repo.save(
            "builder-agent",
            &AgentState {
                current_status: AgentStatus::Waiting,
                last_proposal: Some(LastProposal {
                    id: "p1".into(),
                    title: "Add export".into(),
                    status: "submitted".into(),
                    feedback: None,
                }),
                ..Default::default()
            },
        )
        .unwrap();

        let stub = StubProposals {
            rows: [(
                "p1".to_string(),
                Proposal {
                    id: "p1".into(),
                    title: "Add export".into(),
                    status: ProposalStatus::Passed,
                    agent_feedback: Some("Good, proceed.".into()),
                    reject_reason: None,
                    assistance_response: None,
                    assistance_provided_at: None,
                },
            )]
            .into(),
        };

        wake_agent(&config, &stub, "builder-agent").await.unwrap();

        let after = repo.load("builder-agent").unwrap();
        assert_eq!(after.execution_state, ExecutionState::Executing);
        assert_eq!(after.current_status, AgentStatus::Working);
        assert_eq!(after.current_task.as_ref().unwrap().proposal_id, "p1");
        assert_eq!(after.approved_proposals, 1);
        assert_eq!(after.feedback_history.len(), 1);
        assert_eq!(after.feedback_history[0].outcome, "passed");
    }

    #[tokio::test]
    async fn unknown_agent_directory_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        let stub = StubProposals {
            rows: HashMap::new(),
        };

        let err = wake_agent(&config, &stub, "ghost-agent")
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("Agent directory not found"), "got: {err}");
    }
}
