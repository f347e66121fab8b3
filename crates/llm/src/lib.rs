//! LLM provider abstraction for the planning engine.
//!
//! Exposes a uniform completion/structured-call surface over several hosted
//! providers, selects a provider per task type with one-shot fallback, and
//! accounts for token cost per call. Callers never talk to a vendor client
//! directly; they go through [`router::ProviderRouter`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod providers;
pub mod router;

pub use providers::{ClaudeProvider, DeepSeekProvider, LlmProvider, OpenAiProvider};
pub use router::{
    CostSummary, ProviderModels, ProviderRouter, RoutedCompletion, RoutedStructured, TaskStrategy,
    TaskType,
};

// ── Chat message types ───────────────────────────────────────────────────────

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

// ── Request options ──────────────────────────────────────────────────────────

/// Sampling options applied to a completion call. Unset fields use the
/// provider's defaults.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub stop_sequences: Vec<String>,
}

/// A function/tool the model may (or must) call.
///
/// `parameters` is a JSON-Schema object built with `serde_json::json!`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Options for a structured call. When `function_call` names a function the
/// provider is asked to force that call.
#[derive(Debug, Clone, Default)]
pub struct StructuredOptions {
    pub function_call: Option<String>,
    pub completion: CompletionOptions,
}

// ── Responses ────────────────────────────────────────────────────────────────

/// Token accounting as reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Response from a plain completion call.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: Option<Usage>,
}

/// A function call returned by the model: the function name plus a single
/// JSON arguments blob, exactly as the provider emitted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments_json: String,
}

/// Response from a structured call. `content` carries any free text the
/// model produced alongside (or instead of) the function call.
#[derive(Debug, Clone)]
pub struct StructuredResponse {
    pub content: String,
    pub function_call: Option<FunctionCall>,
    pub usage: Option<Usage>,
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider {provider} is unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("provider {provider} request failed: {source}")]
    Request {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("provider {provider} returned an API error (status {status}): {body}")]
    Api { provider: String, status: u16, body: String },

    #[error("provider {provider} returned a malformed response: {detail}")]
    Malformed { provider: String, detail: String },

    #[error("unknown task type or provider in routing table: {0}")]
    UnknownRoute(String),

    #[error("all providers failed for task {task} (primary {primary}, fallback {fallback})")]
    AllProvidersFailed {
        task: &'static str,
        primary: String,
        fallback: String,
    },
}

// ── Structured argument parsing ──────────────────────────────────────────────

/// Parse the typed arguments out of a structured response.
///
/// Prefers the forced-function arguments blob. When the model ignored the
/// tool and answered in prose, falls back to extracting a JSON object from
/// the text content, so callers survive providers that are sloppy about
/// honoring `tool_choice`.
pub fn parse_structured<T: serde::de::DeserializeOwned>(response: &StructuredResponse) -> Option<T> {
    if let Some(call) = &response.function_call {
        if let Ok(value) = serde_json::from_str(&call.arguments_json) {
            return Some(value);
        }
    }
    extract_json_output(&response.content)
}

/// Extract the first valid JSON value from an LLM text reply.
///
/// Looks for a fenced ` ```json ` block first, then for a bare object
/// spanning the first `{` to the last `}`. Returns `None` when neither
/// parses.
pub fn extract_json_output<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
    // Strategy 1: fenced ```json ... ``` blocks.
    if let Some(fence_start) = response.find("```json") {
        let after_fence = &response[fence_start + "```json".len()..];
        if let Some(json_start) = after_fence.find(|c: char| !c.is_whitespace()) {
            let json_body = &after_fence[json_start..];
            if let Some(fence_end) = json_body.find("```") {
                let json_str = json_body[..fence_end].trim();
                if let Ok(val) = serde_json::from_str(json_str) {
                    return Some(val);
                }
            }
        }
    }

    // Strategy 2: bare JSON object, first '{' to the last '}'.
    let trimmed = response.trim();
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                let candidate = &trimmed[start..=end];
                if let Ok(val) = serde_json::from_str(candidate) {
                    return Some(val);
                }
            }
        }
    }

    None
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    struct Classification {
        domain: String,
        confidence: f64,
    }

    #[test]
    fn extract_fenced_json() {
        let raw = "Classified.\n```json\n{\"domain\":\"travel\",\"confidence\":0.94}\n```";
        let out = extract_json_output::<Classification>(raw).unwrap();
        assert_eq!(out.domain, "travel");
        assert!((out.confidence - 0.94).abs() < 1e-9);
    }

    #[test]
    fn extract_bare_json_with_surrounding_text() {
        let raw = "the result is {\"domain\":\"fitness\",\"confidence\":0.7} as requested";
        let out = extract_json_output::<Classification>(raw).unwrap();
        assert_eq!(out.domain, "fitness");
    }

    #[test]
    fn extract_fenced_takes_precedence_over_bare() {
        let raw = "Bare: {\"domain\":\"wrong\",\"confidence\":0.1}\n```json\n{\"domain\":\"travel\",\"confidence\":0.9}\n```";
        let out = extract_json_output::<Classification>(raw).unwrap();
        assert_eq!(out.domain, "travel");
    }

    #[test]
    fn extract_returns_none_for_plain_text() {
        assert!(extract_json_output::<Classification>("no json here").is_none());
        assert!(extract_json_output::<Classification>("").is_none());
    }

    #[test]
    fn extract_returns_none_for_malformed_fence() {
        let raw = "```json\n{not valid}\n```";
        assert!(extract_json_output::<Classification>(raw).is_none());
    }

    #[test]
    fn parse_structured_prefers_function_arguments() {
        let response = StructuredResponse {
            content: "{\"domain\":\"text-path\",\"confidence\":0.2}".to_string(),
            function_call: Some(FunctionCall {
                name: "classify_domain".to_string(),
                arguments_json: "{\"domain\":\"travel\",\"confidence\":0.92}".to_string(),
            }),
            usage: None,
        };
        let out = parse_structured::<Classification>(&response).unwrap();
        assert_eq!(out.domain, "travel");
    }

    #[test]
    fn parse_structured_falls_back_to_content() {
        let response = StructuredResponse {
            content: "Here you go: {\"domain\":\"learning\",\"confidence\":0.8}".to_string(),
            function_call: Some(FunctionCall {
                name: "classify_domain".to_string(),
                arguments_json: "not json".to_string(),
            }),
            usage: None,
        };
        let out = parse_structured::<Classification>(&response).unwrap();
        assert_eq!(out.domain, "learning");
    }

    #[test]
    fn chat_message_constructors_set_roles() {
        assert_eq!(ChatMessage::system("s").role, ChatRole::System);
        assert_eq!(ChatMessage::user("u").role, ChatRole::User);
        assert_eq!(ChatMessage::assistant("a").role, ChatRole::Assistant);
    }
}
