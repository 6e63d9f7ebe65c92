use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::patterns::extract_patterns;
use crate::resolver::{ProposeReason, WakeMode};
use crate::state::{AgentState, AgentStatus, AssistanceNote, CurrentTask, ExecutionState, FeedbackEntry};
use crate::types::{ProposalStatus, SubmissionType};

/// Apply a resolved wake mode to the agent state.
///
/// This is the only place agent state changes during a wake cycle; the
/// caller persists the result. Hold modes (`waiting`, `still_blocked`) and
/// `execute` leave the state untouched. Apply at most once per resolved
/// mode per cycle; nothing in here guards against double application.
pub fn apply(state: &mut AgentState, mode: &WakeMode, now: DateTime<Utc>) {
    match mode {
        WakeMode::StartExecution { proposal } => {
            state.current_task = Some(CurrentTask {
                proposal_id: proposal.id.clone(),
                title: proposal.title.clone(),
                started_at: now,
                progress: Vec::new(),
                blockers: Vec::new(),
                assistance: None,
            });
            state.execution_state = ExecutionState::Executing;
            state.current_status = AgentStatus::Working;

            state.feedback_history.push(FeedbackEntry {
                proposal_id: proposal.id.clone(),
                title: proposal.title.clone(),
                submission_type: SubmissionType::Proposal,
                outcome: ProposalStatus::Passed.to_string(),
                feedback: proposal.feedback().map(str::to_string),
                responded_at: now,
            });
            state.approved_proposals += 1;

            if !state
                .learned_patterns
                .successful_patterns
                .iter()
                .any(|t| t == &proposal.title)
            {
                state
                    .learned_patterns
                    .successful_patterns
                    .push(proposal.title.clone());
            }

            if let Some(last) = &mut state.last_proposal {
                last.status = ProposalStatus::Passed.to_string();
                last.feedback = proposal.feedback().map(str::to_string);
            }

            info!(
                proposal = %proposal.id,
                approved = state.approved_proposals,
                "Proposal approved, task started"
            );
        }

        WakeMode::ContinueExecution {
            response,
            provided_at,
        } => {
            if let Some(task) = &mut state.current_task {
                task.assistance = Some(AssistanceNote {
                    response: response.clone(),
                    provided_at: *provided_at,
                });
            }
            state.execution_state = ExecutionState::Executing;
            state.current_status = AgentStatus::Working;
            info!("Assistance received, resuming execution");
        }

        WakeMode::Propose { reason } => {
            if let ProposeReason::ProposalRejected { proposal, feedback } = reason {
                state.feedback_history.push(FeedbackEntry {
                    proposal_id: proposal.id.clone(),
                    title: proposal.title.clone(),
                    submission_type: SubmissionType::Proposal,
                    outcome: ProposalStatus::Rejected.to_string(),
                    feedback: feedback.clone(),
                    responded_at: now,
                });
                state.rejected_proposals += 1;

                if let Some(text) = feedback {
                    let learned = extract_patterns(text, &proposal.title);
                    for pattern in learned {
                        if !state
                            .learned_patterns
                            .rejection_patterns
                            .iter()
                            .any(|p| *p == pattern)
                        {
                            debug!(kind = ?pattern.kind, "Learned rejection pattern");
                            state.learned_patterns.rejection_patterns.push(pattern);
                        }
                    }
                }

                if let Some(last) = &mut state.last_proposal {
                    last.status = ProposalStatus::Rejected.to_string();
                    last.feedback = feedback.clone();
                }

                info!(
                    proposal = %proposal.id,
                    rejected = state.rejected_proposals,
                    "Proposal rejected, feedback recorded"
                );
            }

            // Every propose reason resets to a clean idle slate.
            state.execution_state = ExecutionState::Idle;
            state.current_status = AgentStatus::Idle;
            state.current_task = None;
            debug!(reason = reason.tag(), "Agent reset to idle for proposing");
        }

        // "Do not proceed" signals: leave the document alone.
        WakeMode::Waiting | WakeMode::StillBlocked | WakeMode::Execute => {}
    }
}
