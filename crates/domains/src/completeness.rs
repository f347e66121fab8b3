//! Slot-completeness accounting.
//!
//! Pure and LLM-free: given the current slot map, a domain label, and a plan
//! mode, report which required questions remain, how far along the session
//! is, and whether the plan is ready to generate. The orchestrator's
//! `ready_to_generate` decision defers to this engine, so readiness is
//! checkable in isolation.

use crate::slots::{SlotMap, is_filled, slot_lookup};
use crate::{DomainRegistry, PlanMode, Question};

/// Completeness report for one session snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletenessReport {
    pub is_ready: bool,
    /// Rounded percentage over the full question set.
    pub completion_percentage: u8,
    /// Ids of required questions that remain unanswered, in ask order.
    pub missing_required: Vec<String>,
    /// Ids of optional questions that have been answered.
    pub filled_optional: Vec<String>,
    pub missing_optional_count: usize,
    /// Id of the next question to pursue, in list order.
    pub next_priority_slot: Option<String>,
}

/// Whether the question's slot holds an answer, checking the question id
/// first and the dotted slot path second.
pub fn question_answered(slots: &SlotMap, question: &Question) -> bool {
    is_filled(slot_lookup(slots, &question.id)) || is_filled(slot_lookup(slots, &question.slot_path))
}

/// Evaluate completeness for `(slots, domain, mode)`.
///
/// In quick mode the session is ready as soon as every required question is
/// answered. Smart mode additionally wants enough overall context: at least
/// `smart_early_stop_threshold` answers (capped at the size of the question
/// set) before synthesis is allowed.
pub fn evaluate_completeness(
    registry: &DomainRegistry,
    slots: &SlotMap,
    domain: &str,
    mode: PlanMode,
    smart_early_stop_threshold: usize,
) -> CompletenessReport {
    let config = registry.get(domain);
    let questions = config.questions_for(mode);
    let total = questions.len();

    let mut answered = 0usize;
    let mut missing_required = Vec::new();
    let mut filled_optional = Vec::new();
    let mut missing_optional_count = 0usize;
    let mut next_priority_slot = None;

    for question in questions {
        if question_answered(slots, question) {
            answered += 1;
            if !question.required {
                filled_optional.push(question.id.clone());
            }
        } else {
            if question.required {
                missing_required.push(question.id.clone());
            } else {
                missing_optional_count += 1;
            }
            if next_priority_slot.is_none() {
                next_priority_slot = Some(question.id.clone());
            }
        }
    }

    let completion_percentage = if total == 0 {
        0
    } else {
        ((answered as f64 / total as f64) * 100.0).round() as u8
    };

    let is_ready = missing_required.is_empty()
        && match mode {
            PlanMode::Quick => true,
            PlanMode::Smart => answered >= smart_early_stop_threshold.min(total),
        };

    CompletenessReport {
        is_ready,
        completion_percentage,
        missing_required,
        filled_optional,
        missing_optional_count,
        next_priority_slot,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn slots(value: serde_json::Value) -> SlotMap {
        value.as_object().cloned().unwrap_or_default()
    }

    fn registry() -> DomainRegistry {
        DomainRegistry::builtin()
    }

    #[test]
    fn empty_slots_report_zero_and_not_ready() {
        let report =
            evaluate_completeness(&registry(), &slots(json!({})), "travel", PlanMode::Smart, 3);
        assert!(!report.is_ready);
        assert_eq!(report.completion_percentage, 0);
        assert_eq!(report.missing_required, vec!["destination", "dates"]);
        assert_eq!(report.next_priority_slot.as_deref(), Some("destination"));
        assert_eq!(report.missing_optional_count, 3);
    }

    #[test]
    fn quick_mode_is_ready_once_required_fill() {
        let map = slots(json!({ "destination": "Dallas", "timing": { "date": "the 10th" } }));
        let report = evaluate_completeness(&registry(), &map, "travel", PlanMode::Quick, 3);
        assert!(report.is_ready);
        assert!(report.missing_required.is_empty());
        // budget is still open.
        assert_eq!(report.next_priority_slot.as_deref(), Some("budget"));
    }

    #[test]
    fn smart_mode_waits_for_sufficient_context() {
        let map = slots(json!({ "destination": "Dallas", "timing": { "date": "the 10th" } }));
        let report = evaluate_completeness(&registry(), &map, "travel", PlanMode::Smart, 3);
        // Required questions are done, but only two answers overall.
        assert!(!report.is_ready);
        assert_eq!(report.completion_percentage, 40);

        let map = slots(json!({
            "destination": "Dallas",
            "timing": { "date": "the 10th" },
            "budget": "flexible"
        }));
        let report = evaluate_completeness(&registry(), &map, "travel", PlanMode::Smart, 3);
        assert!(report.is_ready);
        assert_eq!(report.filled_optional, vec!["budget"]);
    }

    #[test]
    fn threshold_is_capped_by_question_count() {
        let map = slots(json!({ "destination": "Dallas", "timing": { "date": "June" }, "budget": "1000" }));
        // A threshold larger than the quick set must not make readiness
        // unreachable.
        let report = evaluate_completeness(&registry(), &map, "travel", PlanMode::Quick, 10);
        assert!(report.is_ready);
    }

    #[test]
    fn sentinel_answers_do_not_count() {
        let map = slots(json!({ "destination": "TBD", "timing": { "date": "unknown" } }));
        let report = evaluate_completeness(&registry(), &map, "travel", PlanMode::Quick, 3);
        assert!(!report.is_ready);
        assert_eq!(report.missing_required.len(), 2);
    }

    #[test]
    fn slot_path_and_question_id_both_satisfy_a_question() {
        // Answer stored under the question id rather than the slot path.
        let map = slots(json!({ "dates": "next weekend", "destination": "Austin" }));
        let report = evaluate_completeness(&registry(), &map, "travel", PlanMode::Quick, 3);
        assert!(report.missing_required.is_empty());
    }

    #[test]
    fn alias_labels_resolve_before_evaluation() {
        let map = slots(json!({ "company": "Disney", "role": "data engineer" }));
        let report = evaluate_completeness(&registry(), &map, "interview prep", PlanMode::Quick, 3);
        assert!(report.is_ready);
    }

    #[test]
    fn unknown_domain_uses_general_table() {
        let map = slots(json!({ "goal": "organize garage" }));
        let report = evaluate_completeness(&registry(), &map, "garage-ology", PlanMode::Quick, 3);
        assert!(report.is_ready, "general quick set requires only the goal");
    }
}
