use serde::{Deserialize, Serialize};

/// Why governance rejected a proposal, as inferred from feedback text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    RejectedBecauseTooBroad,
    RejectedBecauseWrongPriority,
    RejectedBecauseMissingJustification,
    RejectedBecauseOutOfScope,
}

/// One learned rejection pattern: the inferred category plus the title of
/// the proposal that taught it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionPattern {
    #[serde(rename = "type")]
    pub kind: PatternKind,
    pub text: String,
}

/// Trigger phrases per pattern kind. Matching is case-insensitive substring
/// containment; this is a heuristic over free-text feedback, not NLP.
const RULES: &[(&[&str], PatternKind)] = &[
    (
        &["too broad", "too large", "focus on one"],
        PatternKind::RejectedBecauseTooBroad,
    ),
    (
        &["priority", "first", "before"],
        PatternKind::RejectedBecauseWrongPriority,
    ),
    (
        &["justify", "why", "reason"],
        PatternKind::RejectedBecauseMissingJustification,
    ),
    (
        &["scope", "not your", "out of"],
        PatternKind::RejectedBecauseOutOfScope,
    ),
];

/// Classify rejection feedback into zero or more tagged patterns.
///
/// Each kind fires at most once no matter how many of its trigger phrases
/// appear. Unrecognized feedback yields an empty vec rather than an error.
pub fn extract_patterns(feedback: &str, proposal_title: &str) -> Vec<RejectionPattern> {
    let lowered = feedback.to_lowercase();
    let mut found = Vec::new();

    for (phrases, kind) in RULES {
        if phrases.iter().any(|p| lowered.contains(p)) {
            found.push(RejectionPattern {
                kind: *kind,
                text: proposal_title.to_string(),
            });
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_broad_fires_once_for_overlapping_phrases() {
        // "too broad" and "focus on one" both map to the same kind; the tag
        // must not be duplicated.
        let patterns =
            extract_patterns("This is too broad, please focus on one metric", "Big plan");
        assert_eq!(
            patterns,
            vec![RejectionPattern {
                kind: PatternKind::RejectedBecauseTooBroad,
                text: "Big plan".to_string(),
            }]
        );
    }

    #[test]
    fn multiple_kinds_can_fire_for_one_feedback() {
        let patterns = extract_patterns(
            "Out of scope, and you should justify the priority",
            "Rewrite everything",
        );
        let kinds: Vec<PatternKind> = patterns.iter().map(|p| p.kind).collect();
        assert!(kinds.contains(&PatternKind::RejectedBecauseOutOfScope));
        assert!(kinds.contains(&PatternKind::RejectedBecauseMissingJustification));
        assert!(kinds.contains(&PatternKind::RejectedBecauseWrongPriority));
        assert!(!kinds.contains(&PatternKind::RejectedBecauseTooBroad));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let patterns = extract_patterns("TOO BROAD. Focus On One thing.", "t");
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].kind, PatternKind::RejectedBecauseTooBroad);
    }

    #[test]
    fn unrecognized_feedback_yields_nothing() {
        assert!(extract_patterns("We went another direction.", "t").is_empty());
        assert!(extract_patterns("", "t").is_empty());
    }

    #[test]
    fn extraction_is_deterministic() {
        let a = extract_patterns("wrong priority, do X first", "t");
        let b = extract_patterns("wrong priority, do X first", "t");
        assert_eq!(a, b);
    }

    #[test]
    fn patterns_carry_the_proposal_title() {
        let patterns = extract_patterns("too large", "Add CSV export");
        assert_eq!(patterns[0].text, "Add CSV export");
    }

    #[test]
    fn pattern_kind_serializes_to_snake_case_tags() {
        let json = serde_json::to_string(&PatternKind::RejectedBecauseTooBroad).unwrap();
        assert_eq!(json, r#""rejected_because_too_broad""#);
    }
}
