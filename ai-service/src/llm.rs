//! LLM provider client.
//!
//! [`LlmClient`] is the boundary the generator talks to. [`HttpLlmClient`] speaks
//! the OpenAI-compatible chat API (OpenAI, Groq), the Anthropic messages API and
//! the Gemini `generateContent` API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use common::models::generation::Provider;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 1024;

/// One completion call.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub provider: Provider,
    pub model: &'a str,
    pub system: &'a str,
    pub user: &'a str,
}

/// LLM call failures.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("no API key configured for {provider} (set {env})")]
    MissingKey { provider: Provider, env: &'static str },

    #[error("request to {0} failed: {1}")]
    Transport(Provider, String),

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: Provider,
        status: u16,
        body: String,
    },

    #[error("unexpected response from {0}: {1}")]
    Decode(Provider, String),

    #[error("request timed out")]
    Timeout,
}

/// LLM completion capability.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError>;
}

/// Environment variable holding the provider's API key.
pub fn api_key_env(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => "OPENAI_API_KEY",
        Provider::Anthropic => "ANTHROPIC_API_KEY",
        Provider::Groq => "GROQ_API_KEY",
        Provider::Gemini => "GEMINI_API_KEY",
    }
}

fn base_url_env(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => "OPENAI_BASE_URL",
        Provider::Anthropic => "ANTHROPIC_BASE_URL",
        Provider::Groq => "GROQ_BASE_URL",
        Provider::Gemini => "GEMINI_BASE_URL",
    }
}

fn default_base_url(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => "https://api.openai.com/v1",
        Provider::Anthropic => "https://api.anthropic.com/v1",
        Provider::Groq => "https://api.groq.com/openai/v1",
        Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
    }
}

/// Provider keys and endpoints.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    api_keys: HashMap<Provider, String>,
    base_urls: HashMap<Provider, String>,
}

impl LlmConfig {
    /// Reads `<PROVIDER>_API_KEY` and `<PROVIDER>_BASE_URL` for every provider.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        for provider in Provider::ALL {
            if let Some(key) = lookup(api_key_env(provider)).filter(|k| !k.trim().is_empty()) {
                config.api_keys.insert(provider, key.trim().to_string());
            }
            if let Some(url) = lookup(base_url_env(provider)).filter(|u| !u.trim().is_empty()) {
                config
                    .base_urls
                    .insert(provider, url.trim().trim_end_matches('/').to_string());
            }
        }
        config
    }

    pub fn api_key(&self, provider: Provider) -> Result<&str, LlmError> {
        self.api_keys
            .get(&provider)
            .map(String::as_str)
            .ok_or(LlmError::MissingKey {
                provider,
                env: api_key_env(provider),
            })
    }

    pub fn base_url(&self, provider: Provider) -> &str {
        self.base_urls
            .get(&provider)
            .map(String::as_str)
            .unwrap_or_else(|| default_base_url(provider))
    }

    pub fn is_configured(&self, provider: Provider) -> bool {
        self.api_keys.contains_key(&provider)
    }
}

/// reqwest-backed client for the supported providers.
pub struct HttpLlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl HttpLlmClient {
    pub fn new(config: LlmConfig, timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    async fn chat_completions(&self, req: &CompletionRequest<'_>) -> Result<String, LlmError> {
        let key = self.config.api_key(req.provider)?;
        let url = format!("{}/chat/completions", self.config.base_url(req.provider));
        let body = json!({
            "model": req.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": req.system },
                { "role": "user", "content": req.user },
            ],
        });
        let response = self.http.post(&url).bearer_auth(key).json(&body).send().await;
        let parsed: ChatResponse = decode(req.provider, response).await?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn anthropic_messages(&self, req: &CompletionRequest<'_>) -> Result<String, LlmError> {
        let key = self.config.api_key(req.provider)?;
        let url = format!("{}/messages", self.config.base_url(req.provider));
        let body = json!({
            "model": req.model,
            "max_tokens": ANTHROPIC_MAX_TOKENS,
            "system": req.system,
            "messages": [{ "role": "user", "content": req.user }],
        });
        let response = self
            .http
            .post(&url)
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await;
        let parsed: AnthropicResponse = decode(req.provider, response).await?;
        Ok(parsed
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join(""))
    }

    async fn gemini_generate(&self, req: &CompletionRequest<'_>) -> Result<String, LlmError> {
        let key = self.config.api_key(req.provider)?;
        let model = req.model.strip_prefix("gemini/").unwrap_or(req.model);
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url(req.provider),
            model
        );
        let body = json!({
            "systemInstruction": { "parts": [{ "text": req.system }] },
            "contents": [{ "role": "user", "parts": [{ "text": req.user }] }],
            "generationConfig": { "temperature": 0 },
        });
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await;
        let parsed: GeminiResponse = decode(req.provider, response).await?;
        Ok(parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError> {
        tracing::debug!(provider = %request.provider, model = %request.model, "调用 LLM");
        match request.provider {
            Provider::OpenAi | Provider::Groq => self.chat_completions(request).await,
            Provider::Anthropic => self.anthropic_messages(request).await,
            Provider::Gemini => self.gemini_generate(request).await,
        }
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(
    provider: Provider,
    response: Result<reqwest::Response, reqwest::Error>,
) -> Result<T, LlmError> {
    let response = response.map_err(|e| transport(provider, e))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Status {
            provider,
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| LlmError::Decode(provider, e.to_string()))
}

fn transport(provider: Provider, e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Transport(provider, e.to_string())
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_lookup() {
        let config = LlmConfig::from_lookup(|key| match key {
            "OPENAI_API_KEY" => Some("sk-test".into()),
            "GROQ_API_KEY" => Some("   ".into()),
            "GEMINI_BASE_URL" => Some("http://localhost:9000/v1beta/".into()),
            _ => None,
        });
        assert_eq!(config.api_key(Provider::OpenAi).unwrap(), "sk-test");
        assert!(matches!(
            config.api_key(Provider::Groq),
            Err(LlmError::MissingKey { env: "GROQ_API_KEY", .. })
        ));
        assert_eq!(config.base_url(Provider::Gemini), "http://localhost:9000/v1beta");
        assert_eq!(config.base_url(Provider::Anthropic), "https://api.anthropic.com/v1");
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let client = HttpLlmClient::new(LlmConfig::default(), Duration::from_secs(1)).unwrap();
        let err = client
            .complete(&CompletionRequest {
                provider: Provider::Anthropic,
                model: "claude-3-haiku-20240307",
                system: "s",
                user: "u",
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MissingKey { provider: Provider::Anthropic, .. }));
    }

    #[test]
    fn test_response_shapes_decode() {
        let chat: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"SELECT 1"}}]}"#,
        )
        .unwrap();
        assert_eq!(chat.choices[0].message.content.as_deref(), Some("SELECT 1"));

        let anthropic: AnthropicResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"SELECT 2"}],"stop_reason":"end_turn"}"#,
        )
        .unwrap();
        assert_eq!(anthropic.content[0].text.as_deref(), Some("SELECT 2"));

        let gemini: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"SELECT "},{"text":"3"}]}}]}"#,
        )
        .unwrap();
        let parts = &gemini.candidates[0].content.as_ref().unwrap().parts;
        assert_eq!(parts.len(), 2);
    }
}
