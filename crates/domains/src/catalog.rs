//! Built-in domain catalog.
//!
//! Question ids are stable; they double as slot keys, so renaming one is a
//! breaking change for persisted sessions. Required questions come before
//! optional ones; gap analysis asks in list order.

use crate::{DomainConfig, EnrichmentRule, Question, QuestionSets};

fn q(id: &str, question: &str, required: bool, slot_path: &str) -> Question {
    Question {
        id: id.to_string(),
        question: question.to_string(),
        required,
        slot_path: slot_path.to_string(),
    }
}

fn rule(condition: &str, web_searches: &[&str]) -> EnrichmentRule {
    EnrichmentRule {
        condition: condition.to_string(),
        web_searches: web_searches.iter().map(|s| s.to_string()).collect(),
        cache_fields: vec![],
    }
}

pub fn builtin_domains() -> Vec<DomainConfig> {
    vec![
        travel(),
        interview_prep(),
        daily_planning(),
        event_planning(),
        fitness(),
        learning(),
        general(),
    ]
}

fn travel() -> DomainConfig {
    DomainConfig {
        id: "travel".to_string(),
        questions: QuestionSets {
            quick_plan: vec![
                q("destination", "Where are you headed?", true, "destination"),
                q("dates", "What dates are you traveling?", true, "timing.date"),
                q("budget", "Do you have a budget in mind?", false, "budget"),
            ],
            smart_plan: vec![
                q("destination", "Where are you headed?", true, "destination"),
                q("dates", "What dates are you traveling?", true, "timing.date"),
                q("budget", "What's your budget for this trip?", false, "budget"),
                q(
                    "transportation",
                    "How are you getting there — flying, driving, or something else?",
                    false,
                    "transportation",
                ),
                q(
                    "interests",
                    "Anything you especially want to do there (food, museums, nightlife, outdoors)?",
                    false,
                    "interests",
                ),
            ],
        },
        enrichment_rules: vec![
            rule(
                "has_destination",
                &[
                    "current weather forecast for {destination}",
                    "top attractions and events in {destination} this month",
                ],
            ),
            rule(
                "has_destination && has_timing.date",
                &[
                    "typical hotel price ranges in {destination} around {timing.date}",
                    "flight price bands to {destination} around {timing.date}",
                ],
            ),
            rule(
                "transportation == \"driving\"",
                &["road conditions and traffic advisories on routes into {destination}"],
            ),
        ],
    }
}

fn interview_prep() -> DomainConfig {
    DomainConfig {
        id: "interview_prep".to_string(),
        questions: QuestionSets {
            quick_plan: vec![
                q("company", "Which company is the interview with?", true, "company"),
                q("role", "What role are you interviewing for?", true, "role"),
                q(
                    "interview_type",
                    "Is it technical, behavioral, or a mix?",
                    false,
                    "interview_type",
                ),
            ],
            smart_plan: vec![
                q("company", "Which company is the interview with?", true, "company"),
                q("role", "What role are you interviewing for?", true, "role"),
                q(
                    "interview_type",
                    "Is it technical, behavioral, or a mix?",
                    true,
                    "interview_type",
                ),
                q(
                    "tech_stack",
                    "Any particular technologies or skills they'll focus on?",
                    false,
                    "tech_stack",
                ),
                q("schedule", "When is the interview?", false, "timing.date"),
            ],
        },
        enrichment_rules: vec![
            rule(
                "has_company",
                &[
                    "recent news and business updates about {company}",
                    "what {company} looks for in interviews",
                ],
            ),
            rule(
                "has_company && has_role",
                &["common {company} interview questions for {role} candidates"],
            ),
        ],
    }
}

fn daily_planning() -> DomainConfig {
    DomainConfig {
        id: "daily_planning".to_string(),
        questions: QuestionSets {
            quick_plan: vec![
                q("focus", "What's the main thing you want to get done?", true, "focus"),
                q("timeframe", "Which day (or part of the day) are we planning?", true, "timing.date"),
                q("constraints", "Any fixed commitments I should plan around?", false, "constraints"),
            ],
            smart_plan: vec![
                q("focus", "What's the main thing you want to get done?", true, "focus"),
                q("timeframe", "Which day (or part of the day) are we planning?", true, "timing.date"),
                q("constraints", "Any fixed commitments I should plan around?", false, "constraints"),
                q("priorities", "What else is on your list, in rough priority order?", false, "priorities"),
                q("energy", "When are you usually most focused — morning or afternoon?", false, "energy_pattern"),
            ],
        },
        enrichment_rules: vec![],
    }
}

fn event_planning() -> DomainConfig {
    DomainConfig {
        id: "event_planning".to_string(),
        questions: QuestionSets {
            quick_plan: vec![
                q("occasion", "What's the occasion?", true, "occasion"),
                q("date", "When is it happening?", true, "timing.date"),
                q("guests", "Roughly how many people?", false, "guest_count"),
            ],
            smart_plan: vec![
                q("occasion", "What's the occasion?", true, "occasion"),
                q("date", "When is it happening?", true, "timing.date"),
                q("guests", "Roughly how many people?", false, "guest_count"),
                q("budget", "What budget are you working with?", false, "budget"),
                q("venue", "Do you have a venue or area in mind?", false, "venue"),
            ],
        },
        enrichment_rules: vec![
            rule(
                "has_venue",
                &["typical booking practices and price ranges for venues like {venue}"],
            ),
            rule(
                "has_occasion && has_timing.date",
                &["seasonal considerations for a {occasion} around {timing.date}"],
            ),
        ],
    }
}

fn fitness() -> DomainConfig {
    DomainConfig {
        id: "fitness".to_string(),
        questions: QuestionSets {
            quick_plan: vec![
                q("goal", "What's the goal of this workout?", true, "goal"),
                q("duration", "How much time do you have?", true, "timing.duration"),
                q("equipment", "What equipment do you have access to?", false, "equipment"),
            ],
            smart_plan: vec![
                q("goal", "What's the goal — strength, cardio, mobility, weight loss?", true, "goal"),
                q("duration", "How much time per session?", true, "timing.duration"),
                q("level", "How would you rate your current fitness level?", false, "experience_level"),
                q("equipment", "What equipment do you have access to?", false, "equipment"),
                q("schedule", "Which days work for training?", false, "timing.date"),
            ],
        },
        enrichment_rules: vec![rule(
            "has_goal",
            &["current best-practice programming guidelines for {goal} training"],
        )],
    }
}

fn learning() -> DomainConfig {
    DomainConfig {
        id: "learning".to_string(),
        questions: QuestionSets {
            quick_plan: vec![
                q("topic", "What do you want to learn?", true, "topic"),
                q("timeframe", "What's your timeframe?", true, "timing.date"),
                q("level", "Are you starting fresh or building on experience?", false, "experience_level"),
            ],
            smart_plan: vec![
                q("topic", "What do you want to learn?", true, "topic"),
                q("timeframe", "What's your timeframe or deadline?", true, "timing.date"),
                q("level", "Are you starting fresh or building on experience?", false, "experience_level"),
                q("goal", "What do you want to be able to do with it?", false, "goal"),
                q("time_per_week", "How many hours a week can you put in?", false, "timing.duration"),
            ],
        },
        enrichment_rules: vec![rule(
            "has_topic",
            &["well-regarded learning resources and roadmaps for {topic}"],
        )],
    }
}

fn general() -> DomainConfig {
    DomainConfig {
        id: "general".to_string(),
        questions: QuestionSets {
            quick_plan: vec![
                q("goal", "What are you trying to accomplish?", true, "goal"),
                q("timeframe", "When does this need to happen?", false, "timing.date"),
                q("constraints", "Any constraints I should know about?", false, "constraints"),
            ],
            smart_plan: vec![
                q("goal", "What are you trying to accomplish?", true, "goal"),
                q("timeframe", "When does this need to happen?", false, "timing.date"),
                q("constraints", "Any constraints I should know about?", false, "constraints"),
                q("resources", "What do you already have to work with?", false, "resources"),
                q("success", "What does success look like?", false, "success_criteria"),
            ],
        },
        enrichment_rules: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;

    #[test]
    fn every_rule_condition_parses() {
        for domain in builtin_domains() {
            for rule in &domain.enrichment_rules {
                Condition::parse(&rule.condition)
                    .unwrap_or_else(|e| panic!("{}: bad condition {:?}: {e}", domain.id, rule.condition));
            }
        }
    }

    #[test]
    fn question_ids_are_unique_within_domain_and_mode() {
        for domain in builtin_domains() {
            for set in [&domain.questions.quick_plan, &domain.questions.smart_plan] {
                let mut ids: Vec<&str> = set.iter().map(|q| q.id.as_str()).collect();
                let before = ids.len();
                ids.sort();
                ids.dedup();
                assert_eq!(ids.len(), before, "duplicate question id in {}", domain.id);
            }
        }
    }

    #[test]
    fn every_domain_has_at_least_one_required_question() {
        for domain in builtin_domains() {
            assert!(
                domain.questions.smart_plan.iter().any(|q| q.required),
                "{} smart set has no required question",
                domain.id
            );
        }
    }

    #[test]
    fn placeholders_reference_real_slot_paths() {
        // Every {placeholder} in a search template must be a slot path some
        // question in the same domain can fill.
        for domain in builtin_domains() {
            let paths: Vec<&str> = domain
                .questions
                .smart_plan
                .iter()
                .chain(domain.questions.quick_plan.iter())
                .map(|q| q.slot_path.as_str())
                .collect();
            for rule in &domain.enrichment_rules {
                for template in &rule.web_searches {
                    let mut rest = template.as_str();
                    while let Some(start) = rest.find('{') {
                        let Some(end) = rest[start..].find('}') else { break };
                        let placeholder = &rest[start + 1..start + end];
                        assert!(
                            paths.contains(&placeholder),
                            "{}: template placeholder {{{placeholder}}} has no question slot",
                            domain.id
                        );
                        rest = &rest[start + end + 1..];
                    }
                }
            }
        }
    }
}
