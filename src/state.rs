use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::patterns::RejectionPattern;
use crate::types::SubmissionType;

/// Overall agent lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Waiting,
    Working,
    Blocked,
}

/// Whether a claimed task is actively being worked. Orthogonal to
/// `AgentStatus`: an agent can be `working` overall while its execution is
/// `blocked` on an assistance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    #[default]
    Idle,
    Executing,
    Blocked,
}

/// Assistance a blocked task has received from governance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistanceNote {
    pub response: String,
    #[serde(default)]
    pub provided_at: Option<DateTime<Utc>>,
}

/// The task an agent is currently executing (an approved proposal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentTask {
    pub proposal_id: String,
    pub title: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub progress: Vec<String>,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub assistance: Option<AssistanceNote>,
}

/// Local mirror of the most recently submitted proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastProposal {
    pub id: String,
    pub title: String,
    pub status: String,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// One governance outcome, appended once per response. Never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub proposal_id: String,
    pub title: String,
    pub submission_type: SubmissionType,
    pub outcome: String,
    #[serde(default)]
    pub feedback: Option<String>,
    pub responded_at: DateTime<Utc>,
}

/// What the agent has learned from past governance responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LearnedPatterns {
    /// Rejection patterns, deduplicated by exact kind + text.
    #[serde(default)]
    pub rejection_patterns: Vec<RejectionPattern>,
    /// Titles of proposals that passed, deduplicated by exact text.
    #[serde(default)]
    pub successful_patterns: Vec<String>,
}

/// The durable per-agent state document. One JSON file per agent slug,
/// read and written whole once per wake cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AgentState {
    #[serde(default)]
    pub current_status: AgentStatus,
    #[serde(default)]
    pub execution_state: ExecutionState,
    #[serde(default)]
    pub current_task: Option<CurrentTask>,
    #[serde(default)]
    pub last_proposal: Option<LastProposal>,
    #[serde(default)]
    pub feedback_history: Vec<FeedbackEntry>,
    #[serde(default)]
    pub learned_patterns: LearnedPatterns,
    #[serde(default)]
    pub total_proposals: u32,
    #[serde(default)]
    pub approved_proposals: u32,
    #[serde(default)]
    pub rejected_proposals: u32,
    #[serde(default)]
    pub last_wake: Option<DateTime<Utc>>,
}

impl AgentState {
    /// Most recent assistance request recorded for the given proposal,
    /// if any.
    pub fn latest_assistance_request(&self, proposal_id: &str) -> Option<&FeedbackEntry> {
        self.feedback_history
            .iter()
            .rev()
            .find(|e| {
                e.proposal_id == proposal_id
                    && e.submission_type == SubmissionType::AssistanceRequest
            })
    }
}

/// Loads and saves agent state documents under `<agents_dir>/<slug>/`.
pub struct StateRepository {
    agents_dir: PathBuf,
}

impl StateRepository {
    pub fn new(agents_dir: impl Into<PathBuf>) -> Self {
        Self {
            agents_dir: agents_dir.into(),
        }
    }

    pub fn agent_dir(&self, slug: &str) -> PathBuf {
        self.agents_dir.join(slug)
    }

    fn state_path(&self, slug: &str) -> PathBuf {
        self.agent_dir(slug).join("state.json")
    }

    /// Subdirectory names under the agents dir, for operator error messages.
    pub fn available_agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = std::fs::read_dir(&self.agents_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().is_dir())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .collect()
            })
            .unwrap_or_default();
        agents.sort();
        agents
    }

    /// Check the agent's directory exists, returning it. A missing directory
    /// is a configuration error: fail loudly and list what is available.
    pub fn require_agent_dir(&self, slug: &str) -> anyhow::Result<PathBuf> {
        let dir = self.agent_dir(slug);
        if !dir.is_dir() {
            let available = self.available_agents();
            anyhow::bail!(
                "Agent directory not found: {}. Available agents: {}",
                dir.display(),
                if available.is_empty() {
                    "(none)".to_string()
                } else {
                    available.join(", ")
                }
            );
        }
        Ok(dir)
    }

    /// Load the agent's state document. A missing file bootstraps a default
    /// document (first wake cycle); an unreadable or malformed file is an
    /// error.
    pub fn load(&self, slug: &str) -> anyhow::Result<AgentState> {
        let path = self.state_path(slug);
        if !path.exists() {
            info!(agent = %slug, "No state document yet, starting fresh");
            return Ok(AgentState::default());
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Malformed state document {}: {}", path.display(), e))
    }

    /// Write the whole state document back. No partial updates.
    pub fn save(&self, slug: &str, state: &AgentState) -> anyhow::Result<()> {
        let path = self.state_path(slug);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(state)?;
        std::fs::write(&path, raw)
            .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::PatternKind;

    fn populated_state() -> AgentState {
        AgentState {
            current_status: AgentStatus::Working,
            execution_state: ExecutionState::Executing,
            current_task: Some(CurrentTask {
                proposal_id: "p1".into(),
                title: "Add barcode fallback".into(),
                started_at: Utc::now(),
                progress: vec!["scaffolded module".into()],
                blockers: vec![],
                assistance: Some(AssistanceNote {
                    response: "Use the v2 endpoint".into(),
                    provided_at: Some(Utc::now()),
                }),
            }),
            last_proposal: Some(LastProposal {
                id: "p1".into(),
                title: "Add barcode fallback".into(),
                status: "passed".into(),
                feedback: Some("Good, proceed.".into()),
            }),
            feedback_history: vec![FeedbackEntry {
                proposal_id: "p1".into(),
                title: "Add barcode fallback".into(),
                submission_type: SubmissionType::Proposal,
                outcome: "passed".into(),
                feedback: Some("Good, proceed.".into()),
                responded_at: Utc::now(),
            }],
            learned_patterns: LearnedPatterns {
                rejection_patterns: vec![RejectionPattern {
                    kind: PatternKind::RejectedBecauseTooBroad,
                    text: "Rebuild the app".into(),
                }],
                successful_patterns: vec!["Add barcode fallback".into()],
            },
            total_proposals: 3,
            approved_proposals: 1,
            rejected_proposals: 1,
            last_wake: Some(Utc::now()),
        }
    }

    #[test]
    fn state_round_trips_without_field_loss() {
        let state = populated_state();
        let json = serde_json::to_string_pretty(&state).unwrap();
        let reloaded: AgentState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, reloaded);
    }

    #[test]
    fn repository_round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = StateRepository::new(tmp.path());
        let state = populated_state();

        repo.save("foodvitals-agent", &state).unwrap();
        let reloaded = repo.load("foodvitals-agent").unwrap();
        assert_eq!(state, reloaded);
    }

    #[test]
    fn missing_document_bootstraps_default() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("new-agent")).unwrap();
        let repo = StateRepository::new(tmp.path());

        let state = repo.load("new-agent").unwrap();
        assert_eq!(state, AgentState::default());
        assert_eq!(state.total_proposals, 0);
        assert!(state.last_proposal.is_none());
    }

    #[test]
    fn malformed_document_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("broken-agent");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("state.json"), "{not json").unwrap();
        let repo = StateRepository::new(tmp.path());

        assert!(repo.load("broken-agent").is_err());
    }

    #[test]
    fn require_agent_dir_lists_available_agents() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("alpha")).unwrap();
        std::fs::create_dir_all(tmp.path().join("beta")).unwrap();
        let repo = StateRepository::new(tmp.path());

        let err = repo.require_agent_dir("gamma").unwrap_err().to_string();
        assert!(err.contains("alpha, beta"), "unexpected error: {err}");
        assert!(repo.require_agent_dir("alpha").is_ok());
    }

    #[test]
    fn latest_assistance_request_finds_most_recent_for_proposal() {
        let mut state = AgentState::default();
        for (id, q) in [("p1", "first"), ("p2", "other"), ("p1", "second")] {
            state.feedback_history.push(FeedbackEntry {
                proposal_id: id.into(),
                title: "t".into(),
                submission_type: SubmissionType::AssistanceRequest,
                outcome: "assistance_requested".into(),
                feedback: Some(q.into()),
                responded_at: Utc::now(),
            });
        }

        let entry = state.latest_assistance_request("p1").unwrap();
        assert_eq!(entry.feedback.as_deref(), Some("second"));
        assert!(state.latest_assistance_request("p3").is_none());
    }
}
