//! SQL generation models.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Groq,
    Gemini,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Groq,
        Provider::Gemini,
    ];

    /// Suggested models for the provider picker.
    pub fn suggested_models(&self) -> &'static [&'static str] {
        match self {
            Provider::OpenAi => &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo"],
            Provider::Anthropic => &[
                "claude-sonnet-4-20250514",
                "claude-3-5-sonnet-20241022",
                "claude-3-haiku-20240307",
            ],
            Provider::Groq => &[
                "llama-3.3-70b-versatile",
                "llama-3.1-8b-instant",
                "mixtral-8x7b-32768",
            ],
            Provider::Gemini => &[
                "gemini-2.5-flash",
                "gemini-1.5-pro",
                "gemini-1.5-flash",
            ],
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAi => write!(f, "openai"),
            Provider::Anthropic => write!(f, "anthropic"),
            Provider::Groq => write!(f, "groq"),
            Provider::Gemini => write!(f, "gemini"),
        }
    }
}

/// Provider entry for `GET /api/providers`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProviderModels {
    pub provider: Provider,
    pub models: Vec<String>,
    /// Whether an API key is configured for the provider.
    pub configured: bool,
}

/// Request body for `POST /api/generate`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GenerateRequest {
    /// Connection whose harvested metadata grounds the prompt.
    #[validate(length(min = 1, message = "Connection name is required"))]
    pub connection: String,
    /// Natural-language question.
    #[validate(length(min = 1, max = 4000, message = "Question must be 1-4000 characters"))]
    pub question: String,
    pub provider: Provider,
    #[validate(length(min = 1, message = "Model is required"))]
    pub model: String,
    /// Context budget in characters (service default when absent).
    #[validate(range(min = 1, message = "Budget must be positive"))]
    pub budget: Option<usize>,
}

/// Result of `POST /api/generate`.
#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateResponse {
    /// The single extracted SQL statement.
    pub sql: String,
    /// Unmodified model output.
    pub raw_response: String,
    /// Whether the statement looks read-only.
    pub read_only: bool,
    pub dialect: String,
    pub context_chars: usize,
    pub tables_included: usize,
    pub tables_total: usize,
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_wire_name() {
        for provider in Provider::ALL {
            let wire: Provider = serde_json::from_value(serde_json::json!(provider.to_string())).unwrap();
            assert_eq!(wire, provider);
            assert!(!provider.suggested_models().is_empty());
        }
        assert!(serde_json::from_str::<Provider>("\"bedrock\"").is_err());
    }

    #[test]
    fn test_provider_serde_names() {
        let p: Provider = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(p, Provider::OpenAi);
        assert_eq!(serde_json::to_string(&Provider::Gemini).unwrap(), "\"gemini\"");
    }
}
