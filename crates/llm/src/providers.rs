//! Hosted provider clients.
//!
//! Three variants share one closed interface: OpenAI and DeepSeek speak the
//! OpenAI chat-completions wire format, Claude speaks the Anthropic messages
//! format. Credentials come from the environment; a missing key makes the
//! provider report unavailable rather than fail at construction, so the
//! router can route around it.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::{
    ChatMessage, ChatRole, CompletionOptions, CompletionResponse, FunctionCall, FunctionDef,
    LlmError, StructuredOptions, StructuredResponse, Usage,
};

/// Uniform surface over a single hosted model.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    /// USD per million input tokens.
    fn input_cost_per_mtok(&self) -> f64;
    /// USD per million output tokens.
    fn output_cost_per_mtok(&self) -> f64;
    /// True when credentials are present. Routing skips unavailable providers.
    fn is_available(&self) -> bool;

    async fn generate_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, LlmError>;

    /// Ask the model to call one of `functions` and return the arguments as a
    /// single JSON blob. `options.function_call` forces a specific function.
    async fn generate_structured(
        &self,
        messages: &[ChatMessage],
        functions: &[FunctionDef],
        options: &StructuredOptions,
    ) -> Result<StructuredResponse, LlmError>;
}

// ── OpenAI-compatible wire helpers ───────────────────────────────────────────

fn messages_to_openai(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                ChatRole::System => "system",
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            json!({ "role": role, "content": m.content })
        })
        .collect()
}

fn openai_payload(
    model: &str,
    messages: &[ChatMessage],
    functions: &[FunctionDef],
    options: &CompletionOptions,
    forced_call: Option<&str>,
) -> serde_json::Value {
    let mut payload = json!({
        "model": model,
        "messages": messages_to_openai(messages),
    });
    if let Some(t) = options.temperature {
        payload["temperature"] = json!(t);
    }
    if let Some(m) = options.max_tokens {
        payload["max_tokens"] = json!(m);
    }
    if let Some(p) = options.top_p {
        payload["top_p"] = json!(p);
    }
    if !options.stop_sequences.is_empty() {
        payload["stop"] = json!(options.stop_sequences);
    }
    if !functions.is_empty() {
        let tools: Vec<serde_json::Value> = functions
            .iter()
            .map(|f| {
                json!({
                    "type": "function",
                    "function": {
                        "name": f.name,
                        "description": f.description,
                        "parameters": f.parameters,
                    }
                })
            })
            .collect();
        payload["tools"] = json!(tools);
        if let Some(name) = forced_call {
            payload["tool_choice"] = json!({ "type": "function", "function": { "name": name } });
        }
    }
    payload
}

fn parse_openai_usage(body: &serde_json::Value) -> Option<Usage> {
    let usage = body.get("usage")?;
    Some(Usage {
        prompt_tokens: usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        completion_tokens: usage.get("completion_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
    })
}

fn parse_openai_structured(
    provider: &str,
    body: &serde_json::Value,
) -> Result<StructuredResponse, LlmError> {
    let message = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| LlmError::Malformed {
            provider: provider.to_string(),
            detail: "response has no choices[0].message".to_string(),
        })?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let function_call = message
        .get("tool_calls")
        .and_then(|v| v.as_array())
        .and_then(|calls| calls.first())
        .and_then(|call| call.get("function"))
        .and_then(|func| {
            let name = func.get("name")?.as_str()?.to_string();
            let arguments_json = match func.get("arguments") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => "{}".to_string(),
            };
            Some(FunctionCall { name, arguments_json })
        });

    Ok(StructuredResponse {
        content,
        function_call,
        usage: parse_openai_usage(body),
    })
}

async fn post_json(
    provider: &str,
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    payload: &serde_json::Value,
) -> Result<serde_json::Value, LlmError> {
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(payload)
        .send()
        .await
        .map_err(|source| LlmError::Request { provider: provider.to_string(), source })?;

    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|source| LlmError::Request { provider: provider.to_string(), source })?;

    if !status.is_success() {
        return Err(LlmError::Api {
            provider: provider.to_string(),
            status: status.as_u16(),
            body: body.to_string(),
        });
    }
    Ok(body)
}

// ── OpenAI ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    model: String,
    api_key: Option<String>,
    input_cost: f64,
    output_cost: f64,
}

impl OpenAiProvider {
    pub fn new(model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            model: model.into(),
            api_key: non_empty_env("OPENAI_API_KEY"),
            input_cost: 0.15,
            output_cost: 0.60,
        }
    }

    fn key(&self) -> Result<&str, LlmError> {
        self.api_key.as_deref().ok_or_else(|| LlmError::ProviderUnavailable {
            provider: "openai".to_string(),
            reason: "OPENAI_API_KEY is not set".to_string(),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }
    fn model(&self) -> &str {
        &self.model
    }
    fn input_cost_per_mtok(&self) -> f64 {
        self.input_cost
    }
    fn output_cost_per_mtok(&self) -> f64 {
        self.output_cost
    }
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, LlmError> {
        let payload = openai_payload(&self.model, messages, &[], options, None);
        let body = post_json(
            self.name(),
            &self.client,
            "https://api.openai.com/v1/chat/completions",
            self.key()?,
            &payload,
        )
        .await?;
        let parsed = parse_openai_structured(self.name(), &body)?;
        Ok(CompletionResponse { content: parsed.content, usage: parsed.usage })
    }

    async fn generate_structured(
        &self,
        messages: &[ChatMessage],
        functions: &[FunctionDef],
        options: &StructuredOptions,
    ) -> Result<StructuredResponse, LlmError> {
        let payload = openai_payload(
            &self.model,
            messages,
            functions,
            &options.completion,
            options.function_call.as_deref(),
        );
        let body = post_json(
            self.name(),
            &self.client,
            "https://api.openai.com/v1/chat/completions",
            self.key()?,
            &payload,
        )
        .await?;
        parse_openai_structured(self.name(), &body)
    }
}

// ── DeepSeek ─────────────────────────────────────────────────────────────────

/// DeepSeek exposes the OpenAI chat-completions format on its own host.
#[derive(Debug, Clone)]
pub struct DeepSeekProvider {
    client: reqwest::Client,
    model: String,
    api_key: Option<String>,
    input_cost: f64,
    output_cost: f64,
}

impl DeepSeekProvider {
    pub fn new(model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            model: model.into(),
            api_key: non_empty_env("DEEPSEEK_API_KEY"),
            input_cost: 0.27,
            output_cost: 1.10,
        }
    }

    fn key(&self) -> Result<&str, LlmError> {
        self.api_key.as_deref().ok_or_else(|| LlmError::ProviderUnavailable {
            provider: "deepseek".to_string(),
            reason: "DEEPSEEK_API_KEY is not set".to_string(),
        })
    }
}

#[async_trait]
impl LlmProvider for DeepSeekProvider {
    fn name(&self) -> &str {
        "deepseek"
    }
    fn model(&self) -> &str {
        &self.model
    }
    fn input_cost_per_mtok(&self) -> f64 {
        self.input_cost
    }
    fn output_cost_per_mtok(&self) -> f64 {
        self.output_cost
    }
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, LlmError> {
        let payload = openai_payload(&self.model, messages, &[], options, None);
        let body = post_json(
            self.name(),
            &self.client,
            "https://api.deepseek.com/chat/completions",
            self.key()?,
            &payload,
        )
        .await?;
        let parsed = parse_openai_structured(self.name(), &body)?;
        Ok(CompletionResponse { content: parsed.content, usage: parsed.usage })
    }

    async fn generate_structured(
        &self,
        messages: &[ChatMessage],
        functions: &[FunctionDef],
        options: &StructuredOptions,
    ) -> Result<StructuredResponse, LlmError> {
        let payload = openai_payload(
            &self.model,
            messages,
            functions,
            &options.completion,
            options.function_call.as_deref(),
        );
        let body = post_json(
            self.name(),
            &self.client,
            "https://api.deepseek.com/chat/completions",
            self.key()?,
            &payload,
        )
        .await?;
        parse_openai_structured(self.name(), &body)
    }
}

// ── Claude ───────────────────────────────────────────────────────────────────

/// Claude's messages API takes system text as a top-level field and returns
/// content as a block list; tool calls arrive as `tool_use` blocks.
#[derive(Debug, Clone)]
pub struct ClaudeProvider {
    client: reqwest::Client,
    model: String,
    api_key: Option<String>,
    input_cost: f64,
    output_cost: f64,
}

impl ClaudeProvider {
    pub fn new(model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            model: model.into(),
            api_key: non_empty_env("ANTHROPIC_API_KEY"),
            input_cost: 3.0,
            output_cost: 15.0,
        }
    }

    fn key(&self) -> Result<&str, LlmError> {
        self.api_key.as_deref().ok_or_else(|| LlmError::ProviderUnavailable {
            provider: "claude".to_string(),
            reason: "ANTHROPIC_API_KEY is not set".to_string(),
        })
    }

    fn payload(
        &self,
        messages: &[ChatMessage],
        functions: &[FunctionDef],
        options: &CompletionOptions,
        forced_call: Option<&str>,
    ) -> serde_json::Value {
        let system = messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let chat: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| {
                let role = if m.role == ChatRole::User { "user" } else { "assistant" };
                json!({ "role": role, "content": m.content })
            })
            .collect();

        let mut payload = json!({
            "model": self.model,
            "max_tokens": options.max_tokens.unwrap_or(1024),
            "messages": chat,
        });
        if !system.is_empty() {
            payload["system"] = json!(system);
        }
        if let Some(t) = options.temperature {
            payload["temperature"] = json!(t);
        }
        if let Some(p) = options.top_p {
            payload["top_p"] = json!(p);
        }
        if !options.stop_sequences.is_empty() {
            payload["stop_sequences"] = json!(options.stop_sequences);
        }
        if !functions.is_empty() {
            let tools: Vec<serde_json::Value> = functions
                .iter()
                .map(|f| {
                    json!({
                        "name": f.name,
                        "description": f.description,
                        "input_schema": f.parameters,
                    })
                })
                .collect();
            payload["tools"] = json!(tools);
            if let Some(name) = forced_call {
                payload["tool_choice"] = json!({ "type": "tool", "name": name });
            }
        }
        payload
    }

    async fn post(&self, payload: &serde_json::Value) -> Result<serde_json::Value, LlmError> {
        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", self.key()?)
            .header("anthropic-version", "2023-06-01")
            .json(payload)
            .send()
            .await
            .map_err(|source| LlmError::Request { provider: "claude".to_string(), source })?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|source| LlmError::Request { provider: "claude".to_string(), source })?;

        if !status.is_success() {
            return Err(LlmError::Api {
                provider: "claude".to_string(),
                status: status.as_u16(),
                body: body.to_string(),
            });
        }
        Ok(body)
    }

    fn parse(&self, body: &serde_json::Value) -> Result<StructuredResponse, LlmError> {
        let blocks = body
            .get("content")
            .and_then(|v| v.as_array())
            .ok_or_else(|| LlmError::Malformed {
                provider: "claude".to_string(),
                detail: "response has no content blocks".to_string(),
            })?;

        let mut content = String::new();
        let mut function_call = None;
        for block in blocks {
            match block.get("type").and_then(|v| v.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|v| v.as_str()) {
                        content.push_str(text);
                    }
                }
                Some("tool_use") => {
                    if function_call.is_none() {
                        let name = block
                            .get("name")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string();
                        let arguments_json = block
                            .get("input")
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "{}".to_string());
                        function_call = Some(FunctionCall { name, arguments_json });
                    }
                }
                _ => {}
            }
        }

        let usage = body.get("usage").map(|usage| Usage {
            prompt_tokens: usage.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            completion_tokens: usage.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        });

        Ok(StructuredResponse { content, function_call, usage })
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    fn name(&self) -> &str {
        "claude"
    }
    fn model(&self) -> &str {
        &self.model
    }
    fn input_cost_per_mtok(&self) -> f64 {
        self.input_cost
    }
    fn output_cost_per_mtok(&self) -> f64 {
        self.output_cost
    }
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, LlmError> {
        let payload = self.payload(messages, &[], options, None);
        let body = self.post(&payload).await?;
        let parsed = self.parse(&body)?;
        debug!(model = %self.model, reply_len = parsed.content.len(), "claude completion");
        Ok(CompletionResponse { content: parsed.content, usage: parsed.usage })
    }

    async fn generate_structured(
        &self,
        messages: &[ChatMessage],
        functions: &[FunctionDef],
        options: &StructuredOptions,
    ) -> Result<StructuredResponse, LlmError> {
        let payload = self.payload(
            messages,
            functions,
            &options.completion,
            options.function_call.as_deref(),
        );
        let body = self.post(&payload).await?;
        self.parse(&body)
    }
}

// ── Shared construction helpers ──────────────────────────────────────────────

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
