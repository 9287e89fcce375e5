//! Pluggable AI text-generation providers.

mod anthropic;
mod openai;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::{
    Deserialize, Serialize,
    de::{DeserializeOwned, IgnoredAny},
};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tracing::warn;
use ts_rs::TS;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

use super::config::AiConfig;

#[derive(Debug, Clone, Error)]
pub enum AiProviderError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("json error: {0}")]
    Serde(String),
    #[error("missing api key: set AI_API_KEY or {0}")]
    MissingApiKey(&'static str),
}

impl AiProviderError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AiProviderKind {
    #[default]
    Anthropic,
    OpenAi,
}

impl AiProviderKind {
    pub const ALL: [AiProviderKind; 2] = [Self::Anthropic, Self::OpenAi];

    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::OpenAi => "gpt-4o-mini",
        }
    }
}

/// One prompt/response exchange
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, system: Option<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            system,
            max_tokens,
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub usage: TokenUsage,
}

/// Outcome of a provider connectivity check
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ConnectionTest {
    pub provider: AiProviderKind,
    pub model: String,
    pub ok: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
    /// Tokens billed for the check, when the provider answered
    pub usage: Option<TokenUsage>,
}

/// A text-generation backend
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn kind(&self) -> AiProviderKind;

    fn model(&self) -> &str;

    /// Single attempt, no retries
    async fn send(&self, request: &CompletionRequest) -> Result<Completion, AiProviderError>;

    /// Send with retries on transient failures
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, AiProviderError> {
        self.send(request).await
    }

    /// Issue a minimal request and report whether the provider answered
    async fn test_connection(&self) -> ConnectionTest {
        let started = std::time::Instant::now();
        let request = CompletionRequest::new("Reply with the single word: pong", None, 16);
        let result = self.send(&request).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        let (usage, error) = match result {
            Ok(completion) => (Some(completion.usage), None),
            Err(e) => (None, Some(e.to_string())),
        };
        ConnectionTest {
            provider: self.kind(),
            model: self.model().to_string(),
            ok: error.is_none(),
            latency_ms,
            error,
            usage,
        }
    }
}

/// Run `send` with exponential backoff, retrying only transient errors.
pub(crate) async fn send_with_retry<P: AiProvider + ?Sized>(
    provider: &P,
    request: &CompletionRequest,
    max_retries: usize,
) -> Result<Completion, AiProviderError> {
    if max_retries == 0 {
        return provider.send(request).await;
    }

    (|| async { provider.send(request).await })
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(30))
                .with_max_times(max_retries)
                .with_jitter(),
        )
        .when(|e: &AiProviderError| e.should_retry())
        .notify(|e, dur| {
            warn!(
                provider = %provider.kind(),
                "AI provider call failed, retrying after {:.2}s: {}",
                dur.as_secs_f64(),
                e
            )
        })
        .await
}

/// Builds the configured provider
pub struct AiProviderFactory;

impl AiProviderFactory {
    pub fn from_config(config: &AiConfig) -> Result<Arc<dyn AiProvider>, AiProviderError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(AiProviderError::MissingApiKey(config.provider.api_key_env()))?;
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| config.provider.default_model().to_string());

        let provider: Arc<dyn AiProvider> = match config.provider {
            AiProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
                api_key,
                model,
                config.base_url.clone(),
                config.max_retries,
            )?),
            AiProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
                api_key,
                model,
                config.base_url.clone(),
                config.max_retries,
            )?),
        };
        Ok(provider)
    }
}

/// Response text and usage from a JSON-producing prompt
#[derive(Debug, Clone)]
pub struct JsonCompletion<T> {
    pub value: T,
    pub model: String,
    pub usage: TokenUsage,
}

/// Send a prompt expecting JSON in the response
pub async fn ask_json<T: DeserializeOwned>(
    provider: &dyn AiProvider,
    prompt: &str,
    system: Option<String>,
    max_tokens: u32,
) -> Result<JsonCompletion<T>, AiProviderError> {
    let completion = provider
        .complete(&CompletionRequest::new(prompt, system, max_tokens))
        .await?;

    if completion.text.trim().is_empty() {
        tracing::error!(provider = %provider.kind(), "AI provider returned an empty response");
        return Err(AiProviderError::Serde("Empty response from provider".to_string()));
    }

    // The JSON might be wrapped in markdown code blocks
    let json_str = extract_json(&completion.text);

    let value = serde_json::from_str(json_str).map_err(|e| {
        tracing::error!(
            json_error = %e,
            response_length = completion.text.len(),
            extracted_json_preview = %json_str.chars().take(500).collect::<String>(),
            "Failed to parse JSON response from AI provider"
        );
        AiProviderError::Serde(format!(
            "{} (response preview: {})",
            e,
            json_str.chars().take(500).collect::<String>()
        ))
    })?;

    Ok(JsonCompletion {
        value,
        model: completion.model,
        usage: completion.usage,
    })
}

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> AiProviderError {
    if e.is_timeout() {
        AiProviderError::Timeout
    } else {
        AiProviderError::Transport(e.to_string())
    }
}

/// Extract JSON from a string that might contain markdown code blocks
pub(crate) fn extract_json(text: &str) -> &str {
    let text = text.trim();

    // Fences may appear inside string values, so a body that already parses wins.
    if serde_json::from_str::<IgnoredAny>(text).is_ok() {
        return text;
    }

    if let Some(fenced) = text.strip_prefix("```") {
        // Skip past any language identifier on the opening line
        let body = fenced.find('\n').map(|i| &fenced[i + 1..]).unwrap_or(fenced);
        if let Some(end) = body.rfind("```") {
            return body[..end].trim();
        }
    }

    // Prose around a bare object: take the outermost braces
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return &text[start..=end];
        }
    }

    text
}


#[cfg(test)]
mod tests {
    use super::{testing::ScriptedProvider, *};

    #[test]
    fn test_extract_json_plain() {
        let input = r#"{"key": "value"}"#;
        assert_eq!(extract_json(input), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_code_block() {
        let input = r#"Here's the JSON:
```json
{"key": "value"}
```"#;
        assert_eq!(extract_json(input), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_generic_code_block() {
        let input = r#"```
{"key": "value"}
```"#;
        assert_eq!(extract_json(input), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_keeps_fences_inside_strings() {
        let draft = r###"{"title": "Setup", "content": "## Install\n```bash\npip install x\n```\nDone."}"###;
        assert_eq!(extract_json(draft), draft);

        let fenced = format!("```json\n{draft}\n```");
        assert_eq!(extract_json(&fenced), draft);

        let prose = format!("Here it is:\n```json\n{draft}\n```");
        assert_eq!(extract_json(&prose), draft);
    }

    #[test]
    fn test_extract_json_surrounded_by_prose() {
        let input = r#"Sure! {"titles": ["a"]} Hope that helps."#;
        assert_eq!(extract_json(input), r#"{"titles": ["a"]}"#);
    }

    #[test]
    fn test_retry_classification() {
        assert!(AiProviderError::RateLimited.should_retry());
        assert!(AiProviderError::Http { status: 503, body: String::new() }.should_retry());
        assert!(!AiProviderError::Http { status: 400, body: String::new() }.should_retry());
        assert!(!AiProviderError::InvalidApiKey.should_retry());
    }

    #[test]
    fn test_factory_requires_api_key() {
        let config = AiConfig::default();
        match AiProviderFactory::from_config(&config) {
            Err(AiProviderError::MissingApiKey(env)) => assert_eq!(env, "ANTHROPIC_API_KEY"),
            other => panic!("expected missing key, got {:?}", other.map(|p| p.model().to_string())),
        }
    }

    #[test]
    fn test_factory_builds_configured_provider() {
        let config = AiConfig {
            provider: AiProviderKind::OpenAi,
            api_key: Some("sk-test".to_string()),
            ..AiConfig::default()
        };
        let provider = AiProviderFactory::from_config(&config).unwrap();
        assert_eq!(provider.kind(), AiProviderKind::OpenAi);
        assert_eq!(provider.model(), "gpt-4o-mini");
    }

    #[derive(Debug, Deserialize)]
    struct Titles {
        titles: Vec<String>,
    }

    #[tokio::test]
    async fn test_ask_json_parses_fenced_response() {
        let provider = ScriptedProvider::new(vec![Ok(
            "```json\n{\"titles\": [\"One\", \"Two\"]}\n```".to_string(),
        )]);
        let result: JsonCompletion<Titles> = ask_json(&provider, "titles please", None, 256)
            .await
            .unwrap();
        assert_eq!(result.value.titles, vec!["One", "Two"]);
        assert_eq!(result.usage.input_tokens, 1000);
    }

    #[derive(Debug, Deserialize)]
    struct Draft {
        content: String,
    }

    #[tokio::test]
    async fn test_ask_json_keeps_code_blocks_in_content() {
        let provider = ScriptedProvider::new(vec![Ok(
            "{\"content\": \"## Setup\\n```bash\\npip install x\\n```\\nDone.\"}".to_string(),
        )]);
        let result: JsonCompletion<Draft> = ask_json(&provider, "write it", None, 256)
            .await
            .unwrap();
        assert_eq!(result.value.content, "## Setup\n```bash\npip install x\n```\nDone.");
    }

    #[tokio::test]
    async fn test_ask_json_rejects_empty_response() {
        let provider = ScriptedProvider::new(vec![Ok("   ".to_string())]);
        let result = ask_json::<Titles>(&provider, "titles please", None, 256).await;
        assert!(matches!(result, Err(AiProviderError::Serde(_))));
    }

    #[tokio::test]
    async fn test_connection_reports_failure() {
        let provider = ScriptedProvider::new(vec![Err(AiProviderError::InvalidApiKey)]);
        let report = provider.test_connection().await;
        assert!(!report.ok);
        assert_eq!(report.error.as_deref(), Some("invalid api key"));
        assert!(report.usage.is_none());
    }
}
