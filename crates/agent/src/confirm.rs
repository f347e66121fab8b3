//! Confirmation-intent matching for the post-synthesis gate.
//!
//! Once a plan has been presented the next user turn is interpreted here,
//! before the graph ever sees it: a clear yes creates the activity, anything
//! else reopens gathering with every slot preserved.

use std::sync::LazyLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmIntent {
    Affirm,
    Decline,
    /// Neither a clear yes nor a clear no; treated as a change request.
    Revise,
}

static AFFIRM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:yes|yep|yeah|yup|sure|ok(?:ay)?|sounds good|looks good|perfect|great|confirm(?:ed)?|do it|let's do it|go ahead|create it|ship it|please do)\b",
    )
    .expect("affirm regex")
});

static DECLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:no|nope|nah|not yet|wait|hold on|don't|do not|cancel)\b")
        .expect("decline regex")
});

pub fn classify(message: &str) -> ConfirmIntent {
    if AFFIRM.is_match(message) {
        ConfirmIntent::Affirm
    } else if DECLINE.is_match(message) {
        ConfirmIntent::Decline
    } else {
        ConfirmIntent::Revise
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_yes_variants_affirm() {
        for message in ["yes", "Yes, create it", "sounds good!", "ok", "let's do it", "go ahead"] {
            assert_eq!(classify(message), ConfirmIntent::Affirm, "{message:?}");
        }
    }

    #[test]
    fn clear_no_variants_decline() {
        for message in ["no", "No, change the hotel", "not yet", "hold on"] {
            assert_eq!(classify(message), ConfirmIntent::Decline, "{message:?}");
        }
    }

    #[test]
    fn everything_else_is_a_revision() {
        for message in ["can you add a museum day?", "make it cheaper", "hmm"] {
            assert_eq!(classify(message), ConfirmIntent::Revise, "{message:?}");
        }
    }

    #[test]
    fn leading_whitespace_is_tolerated() {
        assert_eq!(classify("  yes please"), ConfirmIntent::Affirm);
    }
}
