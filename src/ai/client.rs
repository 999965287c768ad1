use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{AppError, Feature, Result};

const REFERER: &str = "https://skillforge.local";
const APP_TITLE: &str = "SkillForge Analyst";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub finish_reason: Option<String>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse>;

    fn model_name(&self) -> &str;

    /// Single-turn completion: optional system prompt followed by one user message.
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));

        let response = self
            .complete(LlmRequest {
                messages,
                ..LlmRequest::default()
            })
            .await?;
        Ok(response.content)
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client (OpenRouter by default).
pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenRouterClient {
    pub fn new(config: &Config, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.llm_model.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
        })
    }

    fn request_body<'a>(&'a self, request: &'a LlmRequest) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature.unwrap_or(self.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
        }
    }
}

fn classify_send_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::LlmTimeout
    } else if e.is_connect() {
        AppError::LlmConnection(e.to_string())
    } else {
        AppError::Http(e)
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let body = self.request_body(&request);
        if let Some(last) = request.messages.last() {
            tracing::debug!(model = %self.model, prompt = %preview(&last.content, 200), "LLM request");
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", APP_TITLE)
            .json(&body)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::LlmHttp {
                status: status.as_u16(),
                body: preview(&error_text, 200),
            });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::LlmResponse(e.to_string()))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LlmResponse("no choices in response".to_string()))?;

        match choice.finish_reason.as_deref() {
            Some("length") => tracing::warn!("LLM response truncated by token limit"),
            Some("stop") => tracing::debug!("LLM response finished normally"),
            other => tracing::info!(finish_reason = ?other, "LLM response finished"),
        }

        let content = choice.message.content.unwrap_or_default();
        tracing::debug!(answer = %preview(&content, 200), "LLM response");

        Ok(LlmResponse {
            content,
            finish_reason: choice.finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Stand-in used when no API key is configured.
pub struct DisabledClient;

#[async_trait]
impl LlmClient for DisabledClient {
    async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
        Err(AppError::FeatureUnavailable(Feature::LanguageModel))
    }

    fn model_name(&self) -> &str {
        "disabled"
    }
}

pub fn build_llm_client(config: &Config) -> Result<Arc<dyn LlmClient>> {
    match config.llm_api_key.as_ref().filter(|k| !k.trim().is_empty()) {
        Some(key) => {
            tracing::info!(model = %config.llm_model, "Language model enabled");
            Ok(Arc::new(OpenRouterClient::new(config, key.clone())?))
        }
        None => {
            tracing::warn!("No LLM API key configured, plan generation is disabled");
            Ok(Arc::new(DisabledClient))
        }
    }
}
