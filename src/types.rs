use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A claimed wake request as returned by the `claim_wake_request` RPC.
///
/// The queue row itself carries more (claim status, worker hostname,
/// completion timestamp, error message) but the store only ever hands us
/// this slice; everything else is written back through
/// `complete_wake_request`.
#[derive(Debug, Clone, Deserialize)]
pub struct WakeRequest {
    pub request_id: String,
    pub agent_slug: String,
    pub requested_at: DateTime<Utc>,
}

/// Lifecycle of a governance proposal as the store reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Submitted,
    OpenVoting,
    Passed,
    Rejected,
    Implemented,
}

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Submitted => "submitted",
            ProposalStatus::OpenVoting => "open_voting",
            ProposalStatus::Passed => "passed",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Implemented => "implemented",
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A governance proposal row. Read-mostly from this side: the daemon only
/// inspects it to decide wake modes; writes happen through the submission
/// endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub title: String,
    pub status: ProposalStatus,
    #[serde(default)]
    pub agent_feedback: Option<String>,
    #[serde(default)]
    pub reject_reason: Option<String>,
    #[serde(default)]
    pub assistance_response: Option<String>,
    #[serde(default)]
    pub assistance_provided_at: Option<DateTime<Utc>>,
}

impl Proposal {
    /// Governance feedback text, preferring explicit agent feedback over the
    /// bare rejection reason.
    pub fn feedback(&self) -> Option<&str> {
        self.agent_feedback
            .as_deref()
            .or(self.reject_reason.as_deref())
    }
}

/// What kind of submission an agent is sending through the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionType {
    Proposal,
    WorkUpdate,
    AssistanceRequest,
    Completion,
    SmallTelosProposal,
}

impl SubmissionType {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionType::Proposal => "proposal",
            SubmissionType::WorkUpdate => "work_update",
            SubmissionType::AssistanceRequest => "assistance_request",
            SubmissionType::Completion => "completion",
            SubmissionType::SmallTelosProposal => "small_telos_proposal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "proposal" => Some(SubmissionType::Proposal),
            "work_update" => Some(SubmissionType::WorkUpdate),
            "assistance_request" => Some(SubmissionType::AssistanceRequest),
            "completion" => Some(SubmissionType::Completion),
            "small_telos_proposal" => Some(SubmissionType::SmallTelosProposal),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubmissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
