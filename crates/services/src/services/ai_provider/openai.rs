//! OpenAI-compatible chat completions provider (OpenAI, Groq, Together, local gateways).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{
    AiProvider, AiProviderError, AiProviderKind, Completion, CompletionRequest, TokenUsage,
    map_reqwest_error, send_with_retry,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    http: Client,
    api_key: String,
    model: String,
    url: String,
    max_retries: usize,
}

impl OpenAiProvider {
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

        let base = base_url.unwrap_or_else(|| OPENAI_BASE_URL.to_string());
        let url = format!("{}/chat/completions", base.trim_end_matches('/'));

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
impl AiProvider for OpenAiProvider {
    fn kind(&self) -> AiProviderKind {
        AiProviderKind::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, request: &CompletionRequest) -> Result<Completion, AiProviderError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            messages,
        };

        let res = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => {
                let response = res
                    .json::<ChatResponse>()
                    .await
                    .map_err(|e| AiProviderError::Serde(e.to_string()))?;
                let text = response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .ok_or_else(|| AiProviderError::Serde("No choices in response".to_string()))?;
                let usage = response
                    .usage
                    .map(|u| TokenUsage {
                        input_tokens: u.prompt_tokens,
                        output_tokens: u.completion_tokens,
                    })
                    .unwrap_or_default();
                Ok(Completion {
                    text,
                    model: response.model,
                    usage,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_response_without_usage() {
        let raw = r#"{"model": "gpt-4o-mini", "choices": [{"message": {"role": "assistant", "content": "hi"}}]}"#;
        let response: ChatResponse = serde_json::from_str(raw).unwrap();
        assert!(response.usage.is_none());
        assert_eq!(response.choices[0].message.content.as_deref(), Some("hi"));
    }

    #[test]
    fn test_url_from_base() {
        let provider =
            OpenAiProvider::new("k".to_string(), "m".to_string(), Some("https://api.groq.com/openai/v1/".to_string()), 0)
                .unwrap();
        assert_eq!(provider.url, "https://api.groq.com/openai/v1/chat/completions");
    }
}
