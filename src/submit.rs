use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::state::{AgentState, AgentStatus, ExecutionState, FeedbackEntry, LastProposal};
use crate::types::SubmissionType;

/// Categories the governance endpoint accepts; anything else falls back to
/// `feature` (mirrors the endpoint's own behavior).
const VALID_CATEGORIES: &[&str] = &[
    "feature",
    "bug",
    "app_idea",
    "improvement",
    "docs",
    "integration",
    "tokenomics",
];

/// Titles are truncated to this length on the wire.
const MAX_TITLE_LEN: usize = 100;

/// One submission through the agent boundary.
#[derive(Debug, Clone)]
pub struct Submission {
    pub title: String,
    pub content: String,
    pub category: String,
    pub submission_type: SubmissionType,
    pub assistance_needed: Option<String>,
    pub parent_proposal_id: Option<String>,
}

impl Submission {
    /// Client-side mirror of the endpoint's validation, so a doomed
    /// submission never leaves the machine.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.title.trim().len() < 5 {
            anyhow::bail!("Title must be at least 5 characters");
        }
        if self.content.trim().len() < 20 {
            anyhow::bail!("Content must be at least 20 characters");
        }
        Ok(())
    }

    pub fn normalized_category(&self) -> &str {
        if VALID_CATEGORIES.contains(&self.category.as_str()) {
            &self.category
        } else {
            "feature"
        }
    }

    fn wire_title(&self) -> String {
        let trimmed = self.title.trim();
        trimmed.chars().take(MAX_TITLE_LEN).collect()
    }
}

/// The proposal row the endpoint reports back on success.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedProposal {
    pub id: String,
    pub title: String,
    pub status: String,
}

#[derive(Deserialize)]
struct SubmitResponse {
    proposal: SubmittedProposal,
}

#[derive(Deserialize)]
struct SubmitErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    pending_proposal_id: Option<String>,
}

/// Client for the authenticated agent submission endpoint.
pub struct SubmitClient {
    client: Client,
    endpoint: String,
    agent_key: String,
}

impl Drop for SubmitClient {
    fn drop(&mut self) {
        self.agent_key.zeroize();
    }
}

impl SubmitClient {
    pub fn new(endpoint: &str, agent_key: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            agent_key: agent_key.to_string(),
        })
    }

    /// Submit through the boundary. A 409 means a `proposal`-type
    /// submission is still open for this agent and surfaces as a distinct
    /// error.
    pub async fn submit(&self, submission: &Submission) -> anyhow::Result<SubmittedProposal> {
        submission.validate()?;

        let body = json!({
            "title": submission.wire_title(),
            "content": submission.content.trim(),
            "category": submission.normalized_category(),
            "submission_type": submission.submission_type.as_str(),
            "assistance_needed": submission.assistance_needed,
            "parent_proposal_id": submission.parent_proposal_id,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-agent-key", &self.agent_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.as_u16() == 409 {
            let parsed: SubmitErrorBody = serde_json::from_str(&text).unwrap_or(SubmitErrorBody {
                error: None,
                pending_proposal_id: None,
            });
            anyhow::bail!(
                "Agent already has a pending proposal{}. Wait for a governance response before submitting again.",
                parsed
                    .pending_proposal_id
                    .map(|id| format!(" ({id})"))
                    .unwrap_or_default()
            );
        }
        if !status.is_success() {
            let parsed: Result<SubmitErrorBody, _> = serde_json::from_str(&text);
            let detail = parsed
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| text.clone());
            anyhow::bail!("Submission failed: {} - {}", status, detail);
        }

        let parsed: SubmitResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("Submission endpoint returned malformed JSON: {}", e))?;
        info!(proposal = %parsed.proposal.id, "Submission accepted");
        Ok(parsed.proposal)
    }
}

/// Mirror a successful submission into the local state document so it stays
/// consistent with what the store recorded server-side.
pub fn record_submission(
    state: &mut AgentState,
    submission: &Submission,
    proposal: &SubmittedProposal,
    now: DateTime<Utc>,
) {
    match submission.submission_type {
        SubmissionType::Proposal | SubmissionType::SmallTelosProposal => {
            state.last_proposal = Some(LastProposal {
                id: proposal.id.clone(),
                title: proposal.title.clone(),
                status: proposal.status.clone(),
                feedback: None,
            });
            state.current_status = AgentStatus::Waiting;
            state.total_proposals += 1;
        }
        SubmissionType::AssistanceRequest => {
            // The resolver finds this entry again when deciding whether the
            // blocked task can continue.
            state.feedback_history.push(FeedbackEntry {
                proposal_id: state
                    .current_task
                    .as_ref()
                    .map(|t| t.proposal_id.clone())
                    .unwrap_or_else(|| proposal.id.clone()),
                title: proposal.title.clone(),
                submission_type: SubmissionType::AssistanceRequest,
                outcome: "assistance_requested".to_string(),
                feedback: submission.assistance_needed.clone(),
                responded_at: now,
            });
            if let Some(task) = &mut state.current_task {
                if let Some(need) = &submission.assistance_needed {
                    task.blockers.push(need.clone());
                }
            } else {
                warn!("Assistance requested without a current task");
            }
            state.execution_state = ExecutionState::Blocked;
            state.current_status = AgentStatus::Blocked;
        }
        SubmissionType::WorkUpdate => {
            if let Some(task) = &mut state.current_task {
                task.progress.push(proposal.title.clone());
            }
        }
        SubmissionType::Completion => {
            state.feedback_history.push(FeedbackEntry {
                proposal_id: state
                    .current_task
                    .as_ref()
                    .map(|t| t.proposal_id.clone())
                    .unwrap_or_else(|| proposal.id.clone()),
                title: proposal.title.clone(),
                submission_type: SubmissionType::Completion,
                outcome: "completed".to_string(),
                feedback: None,
                responded_at: now,
            });
            state.current_task = None;
            state.execution_state = ExecutionState::Idle;
            state.current_status = AgentStatus::Idle;
        }
    }
    state.last_wake = Some(now);
}
