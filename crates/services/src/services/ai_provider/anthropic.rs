//! Anthropic Messages API provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{
    AiProvider, AiProviderError, AiProviderKind, Completion, CompletionRequest, TokenUsage,
    map_reqwest_error, send_with_retry,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    http: Client,
    api_key: String,
    model: String,
    url: String,
    max_retries: usize,
}

impl AnthropicProvider {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        max_retries: usize,
    ) -> Result<Self, AiProviderError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("ipshopy-blogs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AiProviderError::Transport(e.to_string()))?;

        let url = base_url
            .map(|base| format!("{}/v1/messages", base.trim_end_matches('/')))
            .unwrap_or_else(|| ANTHROPIC_API_URL.to_string());

        Ok(Self {
            http,
            api_key,
            model,
            url,
            max_retries,
        })
    }
}

#[async_trait]
impl AiProvider for AnthropicProvider {
    fn kind(&self) -> AiProviderKind {
        AiProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, request: &CompletionRequest) -> Result<Completion, AiProviderError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            system: request.system.as_deref(),
        };

        let res = self
            .http
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => {
                let response = res
                    .json::<MessagesResponse>()
                    .await
                    .map_err(|e| AiProviderError::Serde(e.to_string()))?;
                let text = response
                    .content
                    .into_iter()
                    .filter_map(|block| match block {
                        ContentBlock::Text { text } => Some(text),
                        ContentBlock::Other => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(Completion {
                    text,
                    model: response.model,
                    usage: TokenUsage {
                        input_tokens: response.usage.input_tokens,
                        output_tokens: response.usage.output_tokens,
                    },
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AiProviderError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(AiProviderError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(AiProviderError::Http { status, body })
            }
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, AiProviderError> {
        send_with_retry(self, request, self.max_retries).await
    }
}
