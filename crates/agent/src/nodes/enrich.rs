//! Real-world context enrichment.
//!
//! Quick plans skip research entirely. Smart plans consult the TTL cache,
//! and on a miss issue one combined web-search request built from the
//! domain's rules. Enrichment is advisory: every failure path degrades to an
//! empty record and moves on to synthesis.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use planmind_domains::PlanMode;
use planmind_graph::{Node, Phase, SessionState, StateUpdate};

use crate::Core;
use crate::enrichment::{WebSearchAdapter, build_queries, cache_key};

pub(crate) struct EnrichNode {
    core: Arc<Core>,
}

impl EnrichNode {
    pub(crate) fn new(core: Arc<Core>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl Node<SessionState> for EnrichNode {
    fn name(&self) -> &'static str {
        crate::nodes::ENRICH
    }

    async fn run(&self, state: &SessionState) -> Result<StateUpdate> {
        if state.plan_mode == PlanMode::Quick {
            return Ok(StateUpdate {
                enriched_data: Some(json!({
                    "contextual_advice": "Quick plan requested — skipping external research.",
                    "source": "stub"
                })),
                phase: Some(Phase::Synthesis),
                ..Default::default()
            });
        }

        let domain = state.domain.clone().unwrap_or_else(|| "general".to_string());
        let config = self.core.registry.get(&domain);
        let key = cache_key(&config, &state.slots);

        if let Some(cached) = self.core.cache.get(&key) {
            debug!(%key, "enrichment cache hit");
            return Ok(StateUpdate {
                enriched_data: Some(cached),
                phase: Some(Phase::Synthesis),
                ..Default::default()
            });
        }

        let queries = build_queries(&config, &state.slots);
        let request = if queries.is_empty() {
            format!(
                "Practical, current context that would improve a {} plan. Known details: {}",
                domain.replace('_', " "),
                serde_json::Value::Object(state.slots.clone())
            )
        } else {
            format!(
                "Research the following for a {} plan:\n- {}",
                domain.replace('_', " "),
                queries.join("\n- ")
            )
        };

        let enriched = match WebSearchAdapter::search(&self.core.router, &request).await {
            Ok(data) => {
                self.core.cache.put(&key, data.clone());
                data
            }
            Err(err) => {
                warn!(%err, "enrichment failed; proceeding without context");
                json!({})
            }
        };

        Ok(StateUpdate {
            enriched_data: Some(enriched),
            phase: Some(Phase::Synthesis),
            ..Default::default()
        })
    }
}
