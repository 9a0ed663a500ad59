use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};

use stockpilot_core::config::{LlmConfig, LlmProvider};

/// Sampling temperature used for every stage.
pub const TEMPERATURE: f32 = 0.2;
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 4096;

/// One system + user exchange. Stages never keep a running conversation.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self { system: system.into(), user: user.into(), temperature: TEMPERATURE }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Chat client for the configured provider over plain HTTPS.
#[derive(Clone, Debug)]
pub struct HttpLlmClient {
    provider: LlmProvider,
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        config.ensure_credentials()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let api_key = config.api_key.as_ref().map(|key| key.expose_secret().trim().to_string());

        match (config.provider, api_key) {
            (LlmProvider::OpenAi, Some(key)) => {
                let value = HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|_| anyhow!("llm api key contains invalid header characters"))?;
                headers.insert(AUTHORIZATION, value);
            }
            (LlmProvider::Anthropic, Some(key)) => {
                let value = HeaderValue::from_str(&key)
                    .map_err(|_| anyhow!("llm api key contains invalid header characters"))?;
                headers.insert("x-api-key", value);
                headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
            }
            (LlmProvider::Ollama, Some(key)) if !key.is_empty() => {
                let value = HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|_| anyhow!("llm api key contains invalid header characters"))?;
                headers.insert(AUTHORIZATION, value);
            }
            _ => {}
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .default_headers(headers)
            .build()
            .context("failed to build llm http client")?;

        Ok(Self {
            provider: config.provider,
            http,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            model: config.model().to_string(),
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::OpenAi => format!("{}/chat/completions", self.base_url),
            LlmProvider::Anthropic => format!("{}/v1/messages", self.base_url),
            LlmProvider::Ollama => format!("{}/api/chat", self.base_url),
        }
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        match self.provider {
            LlmProvider::OpenAi => json!({
                "model": self.model,
                "temperature": request.temperature,
                "messages": [
                    { "role": "system", "content": request.system },
                    { "role": "user", "content": request.user },
                ],
            }),
            LlmProvider::Anthropic => json!({
                "model": self.model,
                "max_tokens": ANTHROPIC_MAX_TOKENS,
                "temperature": request.temperature,
                "system": request.system,
                "messages": [{ "role": "user", "content": request.user }],
            }),
            LlmProvider::Ollama => json!({
                "model": self.model,
                "stream": false,
                "options": { "temperature": request.temperature },
                "messages": [
                    { "role": "system", "content": request.system },
                    { "role": "user", "content": request.user },
                ],
            }),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let endpoint = self.endpoint();
        tracing::debug!(
            event_name = "llm.request.started",
            provider = self.provider.as_str(),
            model = %self.model,
            "sending completion request"
        );

        let response = self
            .http
            .post(&endpoint)
            .json(&self.body(request))
            .send()
            .await
            .with_context(|| format!("llm request to {endpoint} failed"))?;
        let status = response.status();
        let text = response.text().await.context("failed to read llm response body")?;
        if !status.is_success() {
            let preview: String = text.chars().take(300).collect();
            bail!("llm provider returned {status}: {preview}");
        }

        let content = parse_completion(self.provider, &text)?;
        tracing::debug!(
            event_name = "llm.request.completed",
            provider = self.provider.as_str(),
            chars = content.len(),
            "completion received"
        );
        Ok(content)
    }
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
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
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

fn parse_completion(provider: LlmProvider, body: &str) -> Result<String> {
    let content = match provider {
        LlmProvider::OpenAi => serde_json::from_str::<OpenAiResponse>(body)
            .context("unexpected openai response shape")?
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content),
        LlmProvider::Anthropic => serde_json::from_str::<AnthropicResponse>(body)
            .context("unexpected anthropic response shape")?
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text),
        LlmProvider::Ollama => Some(
            serde_json::from_str::<OllamaResponse>(body)
                .context("unexpected ollama response shape")?
                .message
                .content,
        ),
    };

    match content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(anyhow!("{} returned an empty completion", provider.as_str())),
    }
}
