use std::collections::BTreeSet;

use crate::patterns::PatternKind;
use crate::resolver::{ProposeReason, WakeMode};
use crate::state::AgentState;

const PROPOSE_SUFFIX: &str = "Remember: Submit ONE proposal, then STOP.";
const WORK_SUFFIX: &str = "Record progress in your state.json. Submit a work_update when you have something to report, then STOP.";

fn pitfall_advice(kind: PatternKind) -> &'static str {
    match kind {
        PatternKind::RejectedBecauseTooBroad => "keep the scope narrow",
        PatternKind::RejectedBecauseWrongPriority => "match governance priorities",
        PatternKind::RejectedBecauseMissingJustification => "justify the why",
        PatternKind::RejectedBecauseOutOfScope => "stay inside your telos",
    }
}

/// Summarize learned rejection patterns into one guidance clause.
fn learned_guidance(state: &AgentState) -> Option<String> {
    let advice: BTreeSet<&str> = state
        .learned_patterns
        .rejection_patterns
        .iter()
        .map(|p| pitfall_advice(p.kind))
        .collect();
    if advice.is_empty() {
        return None;
    }
    Some(format!(
        "Known pitfalls from past rejections: {}.",
        advice.into_iter().collect::<Vec<_>>().join(", ")
    ))
}

/// Build the prompt handed to the CLI agent for this wake mode.
///
/// Hold modes (`waiting`, `still_blocked`) never reach the CLI and yield
/// `None`.
pub fn build_wake_prompt(mode: &WakeMode, state: &AgentState) -> Option<String> {
    let prompt = match mode {
        WakeMode::Waiting | WakeMode::StillBlocked => return None,

        WakeMode::Execute => format!(
            "Wake up. You have a task in progress. Read your state.json for where you \
             left off and continue executing. {WORK_SUFFIX}"
        ),

        WakeMode::ContinueExecution { response, .. } => format!(
            "Wake up. Governance answered your assistance request: \"{response}\". \
             Continue executing your current task with this guidance. {WORK_SUFFIX}"
        ),

        WakeMode::StartExecution { proposal } => {
            let mut p = format!("Wake up. Your proposal \"{}\" was approved.", proposal.title);
            if let Some(feedback) = proposal.feedback() {
                p.push_str(&format!(" Feedback: \"{feedback}\"."));
            }
            p.push_str(&format!(
                " Begin executing the work it describes. {WORK_SUFFIX}"
            ));
            p
        }

        WakeMode::Propose { reason } => {
            let mut p = match reason {
                ProposeReason::NoPriorProposal => {
                    "Wake up. This is your first wake cycle. Read your telos-objective.md \
                     to understand your mission, then generate your first proposal."
                        .to_string()
                }
                ProposeReason::Ready => {
                    "Wake up. Your last proposal has been processed. Read your state.json \
                     to see what happened, then generate your next proposal."
                        .to_string()
                }
                ProposeReason::ProposalRejected { proposal, feedback } => {
                    let mut p =
                        format!("Wake up. Your proposal \"{}\" was rejected.", proposal.title);
                    if let Some(feedback) = feedback {
                        p.push_str(&format!(" Feedback: \"{feedback}\"."));
                    }
                    p.push_str(
                        " Read your state.json, adjust your approach, then generate your \
                         next proposal.",
                    );
                    p
                }
                ProposeReason::TaskCompletedExternally => {
                    "Wake up. Your last proposal was implemented without your involvement. \
                     Pick the next most valuable piece of work and generate a proposal for it."
                        .to_string()
                }
                ProposeReason::ProposalNotFound => {
                    "Wake up. Your last proposal no longer exists in governance. Treat this \
                     as a fresh start and generate your next proposal."
                        .to_string()
                }
            };
            if let Some(guidance) = learned_guidance(state) {
                p.push(' ');
                p.push_str(&guidance);
            }
            p.push(' ');
            p.push_str(PROPOSE_SUFFIX);
            p
        }
    };
    Some(prompt)
}
