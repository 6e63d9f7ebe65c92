use async_trait::async_trait;
use tracing::warn;

use crate::state::{AgentState, AgentStatus, ExecutionState};
use crate::types::{Proposal, ProposalStatus};

/// Read-only access to proposal rows. The resolver takes this instead of
/// the full store client so it stays side-effect free and testable with a
/// stub.
#[async_trait]
pub trait ProposalSource: Send + Sync {
    /// Fetch a proposal by id. `Ok(None)` means the row no longer exists.
    async fn fetch_proposal(&self, id: &str) -> anyhow::Result<Option<Proposal>>;
}

/// Why a proposing wake is happening.
#[derive(Debug, Clone, PartialEq)]
pub enum ProposeReason {
    /// The last proposal was rejected; carry it plus the feedback text.
    ProposalRejected {
        proposal: Proposal,
        feedback: Option<String>,
    },
    /// First wake cycle ever: nothing has been proposed yet.
    NoPriorProposal,
    /// The previous proposal has been fully processed; time for the next.
    Ready,
    /// The last proposal was implemented without this agent executing it.
    TaskCompletedExternally,
    /// The referenced proposal vanished from the store; recover by
    /// proposing fresh instead of crashing.
    ProposalNotFound,
}

impl ProposeReason {
    pub fn tag(&self) -> &'static str {
        match self {
            ProposeReason::ProposalRejected { .. } => "proposal_rejected",
            ProposeReason::NoPriorProposal => "no_prior_proposal",
            ProposeReason::Ready => "ready",
            ProposeReason::TaskCompletedExternally => "task_completed_externally",
            ProposeReason::ProposalNotFound => "proposal_not_found",
        }
    }
}

/// The single decision a wake cycle acts on. One variant per mode; the
/// payload shape is fixed by the variant, never by optional fields.
#[derive(Debug, Clone, PartialEq)]
pub enum WakeMode {
    /// Assistance arrived for a blocked task; resume with the response.
    ContinueExecution {
        response: String,
        provided_at: Option<chrono::DateTime<chrono::Utc>>,
    },
    /// Still blocked, no assistance yet. Do not proceed.
    StillBlocked,
    /// A task is mid-execution; resume it.
    Execute,
    /// The last proposal is still awaiting a governance response. Do not
    /// proceed.
    Waiting,
    /// The last proposal passed; start executing it.
    StartExecution { proposal: Proposal },
    /// Generate a new proposal.
    Propose { reason: ProposeReason },
}

impl WakeMode {
    /// Hold modes stop the cycle before any state mutation or CLI run.
    pub fn is_hold(&self) -> bool {
        matches!(self, WakeMode::Waiting | WakeMode::StillBlocked)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            WakeMode::ContinueExecution { .. } => "continue_execution",
            WakeMode::StillBlocked => "still_blocked",
            WakeMode::Execute => "execute",
            WakeMode::Waiting => "waiting",
            WakeMode::StartExecution { .. } => "start_execution",
            WakeMode::Propose { .. } => "propose",
        }
    }
}

/// Decide the wake mode for an agent. Read-only: inspects local state and
/// proposal rows, mutates nothing.
///
/// The branch order is a priority policy: an in-flight task (blocked or
/// executing) always wins over proposal bookkeeping, and only a `waiting`
/// agent consults the store about its last proposal.
pub async fn resolve(
    state: &AgentState,
    proposals: &dyn ProposalSource,
) -> anyhow::Result<WakeMode> {
    // 1. Blocked mid-task: has governance answered the assistance request?
    if state.execution_state == ExecutionState::Blocked {
        if let Some(task) = &state.current_task {
            if state.latest_assistance_request(&task.proposal_id).is_none() {
                warn!(
                    proposal = %task.proposal_id,
                    "Blocked task has no recorded assistance request"
                );
            }
            let proposal = proposals.fetch_proposal(&task.proposal_id).await?;
            if let Some(response) = proposal.as_ref().and_then(|p| p.assistance_response.clone())
            {
                return Ok(WakeMode::ContinueExecution {
                    response,
                    provided_at: proposal.and_then(|p| p.assistance_provided_at),
                });
            }
            return Ok(WakeMode::StillBlocked);
        }
    }

    // 2. Task already executing: just resume it.
    if state.execution_state == ExecutionState::Executing && state.current_task.is_some() {
        return Ok(WakeMode::Execute);
    }

    // 3. Waiting on the last proposal: ask the store what happened to it.
    if let (Some(last), AgentStatus::Waiting) = (&state.last_proposal, state.current_status) {
        let Some(proposal) = proposals.fetch_proposal(&last.id).await? else {
            return Ok(WakeMode::Propose {
                reason: ProposeReason::ProposalNotFound,
            });
        };

        return Ok(match proposal.status {
            ProposalStatus::Submitted | ProposalStatus::OpenVoting => WakeMode::Waiting,
            ProposalStatus::Passed => WakeMode::StartExecution { proposal },
            ProposalStatus::Rejected => {
                let feedback = proposal.feedback().map(str::to_string);
                WakeMode::Propose {
                    reason: ProposeReason::ProposalRejected { proposal, feedback },
                }
            }
            ProposalStatus::Implemented => WakeMode::Propose {
                reason: ProposeReason::TaskCompletedExternally,
            },
        });
    }

    // 4. Idle: propose the next thing (or the first thing).
    Ok(WakeMode::Propose {
        reason: if state.last_proposal.is_some() {
            ProposeReason::Ready
        } else {
            ProposeReason::NoPriorProposal
        },
    })
}
