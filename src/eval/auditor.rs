//! Auditor: judges each step's reply for acceptance and completion.

use std::sync::LazyLock;

use regex::Regex;

static COMPLETION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(COMPLETE|FINISHED|DONE)\b").expect("completion marker pattern is valid")
});

/// Whether `text` contains a whole-word completion marker.
pub fn has_completion_marker(text: &str) -> bool {
    COMPLETION_MARKER.is_match(text)
}

/// An auditor's judgement of one reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub accepted: bool,
    pub complete: bool,
    pub reason: String,
}

/// Judges replies produced by the evaluation loop.
pub trait Auditor {
    fn audit(&self, response: &str, confidence: Option<f32>) -> Verdict;
}

/// Accepts replies with enough content and confidence; completes on a marker word.
#[derive(Debug, Clone)]
pub struct CompletionAuditor {
    /// Trimmed replies must be longer than this.
    pub min_chars: usize,
    /// Replies reporting a confidence must exceed this. Zero counts as unreported.
    pub min_confidence: f32,
}

impl Default for CompletionAuditor {
    fn default() -> Self {
        Self {
            min_chars: 10,
            min_confidence: 0.3,
        }
    }
}

impl Auditor for CompletionAuditor {
    fn audit(&self, response: &str, confidence: Option<f32>) -> Verdict {
        let has_content = response.trim().chars().count() > self.min_chars;
        let confident = confidence.is_none_or(|c| c == 0.0 || c > self.min_confidence);
        let accepted = has_content && confident;

        Verdict {
            accepted,
            complete: has_completion_marker(response),
            reason: if accepted {
                "accepted by evaluator".into()
            } else {
                "low confidence or quality".into()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_matches_whole_words_case_insensitively() {
        assert!(has_completion_marker("All work is COMPLETE"));
        assert!(has_completion_marker("we are done."));
        assert!(has_completion_marker("Finished!"));
        assert!(!has_completion_marker("still INCOMPLETE"));
        assert!(!has_completion_marker("undone work remains"));
        assert!(!has_completion_marker("keep going"));
    }

    #[test]
    fn short_or_unconfident_replies_are_rejected() {
        let auditor = CompletionAuditor::default();
        assert!(!auditor.audit("   tiny   ", None).accepted);
        assert!(!auditor.audit("a perfectly long reply", Some(0.2)).accepted);
        assert!(auditor.audit("a perfectly long reply", Some(0.8)).accepted);
        assert!(auditor.audit("a perfectly long reply", None).accepted);
    }

    #[test]
    fn rejected_reply_can_still_complete() {
        let verdict = CompletionAuditor::default().audit("DONE", None);
        assert!(!verdict.accepted);
        assert!(verdict.complete);
    }

    #[test]
    fn zero_confidence_is_treated_as_unreported() {
        let auditor = CompletionAuditor::default();
        assert!(auditor.audit("a perfectly long reply", Some(0.0)).accepted);
        assert!(!auditor.audit("a perfectly long reply", Some(0.1)).accepted);
    }
}
