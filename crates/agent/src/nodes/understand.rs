//! Parallel domain detection and slot extraction.
//!
//! Both LLM calls are fired together and awaited as one structured-
//! concurrency step; results merge deterministically, domain first, then
//! slots. Domain switching runs through hysteresis so a single weak
//! classification cannot hijack an established topic.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use planmind_config::DomainConfigSection;
use planmind_domains::{KNOWN_DOMAINS, Question, SlotMap, is_filled, normalize_domain};
use planmind_graph::{Node, Phase, SessionState, StateUpdate};
use planmind_llm::{
    ChatMessage, FunctionDef, LlmError, StructuredOptions, parse_structured,
};

use crate::Core;
use crate::keyword_extract::{insert_path, keyword_extract, short_reply};
use crate::nodes::{latest_user_message, transcript};

pub(crate) struct UnderstandNode {
    core: Arc<Core>,
}

impl UnderstandNode {
    pub(crate) fn new(core: Arc<Core>) -> Self {
        Self { core }
    }

    async fn classify(&self, state: &SessionState) -> Result<DomainClassification, LlmError> {
        let function = FunctionDef {
            name: "classify_domain".to_string(),
            description: "Classify which planning domain the user's request belongs to".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "domain": { "type": "string", "enum": KNOWN_DOMAINS },
                    "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 }
                },
                "required": ["domain", "confidence"]
            }),
        };

        let messages = [
            ChatMessage::system(format!(
                "Classify the conversation into exactly one planning domain from: {}. \
                 Judge the whole conversation, weighting the latest message. \
                 Report your confidence in [0, 1].",
                KNOWN_DOMAINS.join(", ")
            )),
            ChatMessage::user(transcript(state, 12)),
        ];

        let options = StructuredOptions {
            function_call: Some("classify_domain".to_string()),
            ..Default::default()
        };
        let routed = self
            .core
            .router
            .structured(planmind_llm::TaskType::DomainDetection, &messages, &[function], &options)
            .await?;

        parse_structured(&routed.response).ok_or(LlmError::Malformed {
            provider: routed.provider,
            detail: "classification arguments did not parse".to_string(),
        })
    }

    async fn extract(
        &self,
        state: &SessionState,
        questions: &[Question],
    ) -> Result<SlotMap, LlmError> {
        if questions.is_empty() {
            return Ok(SlotMap::new());
        }

        let mut properties = serde_json::Map::new();
        for question in questions {
            properties.insert(
                question.id.clone(),
                json!({ "type": "string", "description": question.question }),
            );
        }
        let function = FunctionDef {
            name: "extract_slots".to_string(),
            description: "Extract answers to the planning questions from the conversation"
                .to_string(),
            parameters: json!({ "type": "object", "properties": properties }),
        };

        let messages = [
            ChatMessage::system(
                "Extract answers to the planning questions from the ENTIRE conversation. \
                 Only report values the user explicitly stated or clearly implied; use the \
                 string \"unknown\" for anything else. A short reply answers the question \
                 that was just asked.",
            ),
            ChatMessage::user(transcript(state, 24)),
        ];

        let options = StructuredOptions {
            function_call: Some("extract_slots".to_string()),
            ..Default::default()
        };
        let routed = self
            .core
            .router
            .structured(planmind_llm::TaskType::SlotExtraction, &messages, &[function], &options)
            .await?;

        let raw: serde_json::Map<String, serde_json::Value> =
            parse_structured(&routed.response).ok_or(LlmError::Malformed {
                provider: routed.provider,
                detail: "extraction arguments did not parse".to_string(),
            })?;

        // Re-key from question id to slot path, nesting composites.
        let mut slots = SlotMap::new();
        for question in questions {
            if let Some(value) = raw.get(&question.id) {
                insert_path(&mut slots, &question.slot_path, value.clone());
            }
        }
        Ok(slots)
    }
}

#[derive(Debug, Deserialize)]
struct DomainClassification {
    domain: String,
    #[serde(default)]
    confidence: f64,
}

#[async_trait]
impl Node<SessionState> for UnderstandNode {
    fn name(&self) -> &'static str {
        crate::nodes::UNDERSTAND
    }

    async fn run(&self, state: &SessionState) -> Result<StateUpdate> {
        if latest_user_message(state).is_none() {
            return Ok(StateUpdate::default());
        }
        let message = latest_user_message(state).unwrap_or_default().to_string();

        // The question list for extraction: the loaded set, else the prior
        // domain's table. On the very first turn neither exists and the LLM
        // pass is skipped; the keyword pass still runs below.
        let questions: Vec<Question> = if !state.all_questions.is_empty() {
            state.all_questions.clone()
        } else if let Some(domain) = &state.domain {
            self.core.registry.get(domain).questions_for(state.plan_mode).to_vec()
        } else {
            Vec::new()
        };

        let (classified, extracted) =
            tokio::join!(self.classify(state), self.extract(state, &questions));

        // Domain first.
        let (domain, confidence) = match classified {
            Ok(classification) => {
                let candidate = normalize_domain(&classification.domain);
                decide_domain(
                    state.domain.as_deref(),
                    state.domain_confidence,
                    &candidate,
                    classification.confidence.clamp(0.0, 1.0),
                    &self.core.config.domain,
                )
            }
            Err(err) => {
                warn!(%err, "domain classifier unavailable; keeping prior domain");
                (
                    state.domain.clone().unwrap_or_else(|| "general".to_string()),
                    state.domain_confidence,
                )
            }
        };

        // Then slots: keyword pass first, LLM pass layered over it.
        let scoped_questions: Vec<Question> = if questions.is_empty() {
            self.core.registry.get(&domain).questions_for(state.plan_mode).to_vec()
        } else {
            questions
        };
        let mut slots = keyword_extract(&message, &scoped_questions);
        match extracted {
            Ok(llm_slots) => overlay(&mut slots, llm_slots),
            Err(err) => {
                warn!(%err, "slot extraction failed; treating this turn as empty");
            }
        }
        if let Some(extra) = short_reply(&message, state.next_question.as_ref(), &slots, &state.slots)
        {
            overlay(&mut slots, extra);
        }

        debug!(domain = %domain, confidence, slot_count = slots.len(), "understand complete");

        let mut update = StateUpdate {
            domain: Some(domain.clone()),
            domain_confidence: Some(confidence),
            slots,
            ..Default::default()
        };
        if state.phase == Phase::ContextRecognition {
            update.phase = Some(Phase::Gathering);
        }
        // A genuine topic switch invalidates the loaded question set; routing
        // will send the turn back through question generation.
        if let Some(prior) = &state.domain {
            if *prior != domain && !state.all_questions.is_empty() {
                update.all_questions = Some(Vec::new());
            }
        }
        Ok(update)
    }
}

/// Hysteresis-based domain switching.
///
/// Same domain: accept the new confidence. A different candidate must beat
/// both the decayed-incumbent-plus-margin bar and the absolute floor;
/// otherwise the incumbent stays, at its decayed confidence.
pub(crate) fn decide_domain(
    prior: Option<&str>,
    prior_confidence: f64,
    candidate: &str,
    candidate_confidence: f64,
    settings: &DomainConfigSection,
) -> (String, f64) {
    let Some(prior) = prior else {
        return (candidate.to_string(), candidate_confidence);
    };

    if candidate == prior {
        return (prior.to_string(), candidate_confidence);
    }
    if prior == "general" {
        return (candidate.to_string(), candidate_confidence);
    }

    let decayed = prior_confidence * settings.decay_factor;
    let required = decayed + settings.switch_margin;
    if candidate_confidence >= required && candidate_confidence >= settings.switch_absolute_floor {
        (candidate.to_string(), candidate_confidence)
    } else {
        (prior.to_string(), decayed)
    }
}

/// Layer `incoming` over `base`, one level deep, incoming wins per leaf.
/// Sentinel filtering happens later in the slot reducer, so "unknown" from
/// the LLM never clobbers a keyword match once merged into session state,
/// but it must not clobber it here either.
fn overlay(base: &mut SlotMap, incoming: SlotMap) {
    for (key, value) in incoming {
        if !is_filled(Some(&value)) {
            continue;
        }
        match (base.get_mut(&key), value) {
            (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(new)) => {
                for (sub_key, sub_value) in new {
                    if is_filled(Some(&sub_value)) {
                        existing.insert(sub_key, sub_value);
                    }
                }
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
