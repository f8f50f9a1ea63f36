use std::env;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::settings::LlmSettings;

#[derive(Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub temperature: f32,
}

#[derive(Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Deserialize)]
pub struct Choice {
    pub message: ChatMessageResponse,
}

#[derive(Deserialize)]
pub struct ChatMessageResponse {
    pub content: Option<String>,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM response could not be decoded: {0}")]
    Decode(String),

    #[error("LLM response contained no message content")]
    EmptyResponse,
}

/// Single-turn text completion. Implemented by [`ChatClient`] and by test fakes.
pub trait LanguageModel {
    fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Blocking chat-completions client, built once and handed to the pipeline.
pub struct ChatClient {
    http: Client,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: String,
}

impl ChatClient {
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, LlmError> {
        let api_key = env::var(&settings.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(settings.api_key_env.clone()))?;

        let http = Client::builder().timeout(settings.timeout()).build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            api_key,
        })
    }

    pub fn check_connection(&self) -> Result<String, LlmError> {
        let resp = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }

        let value: serde_json::Value = resp.json()?;
        Ok(format!(
            "Connected ({} models available)",
            value["data"].as_array().map(|a| a.len()).unwrap_or(0)
        ))
    }
}

impl LanguageModel for ChatClient {
    fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let req = ChatCompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        tracing::debug!(model = %self.model, chars = prompt.len(), "sending completion request");

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()?;

        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        decode_completion(&body)
    }
}

fn decode_completion(body: &str) -> Result<String, LlmError> {
    let resp: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Decode(e.to_string()))?;

    resp.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or(LlmError::EmptyResponse)
}
