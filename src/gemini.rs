//! Gemini `generateContent` REST backend
//!
//! Sends one prompt with the profile's fixed generation parameters and
//! returns the concatenated text parts of the first candidate. No retry;
//! no request timeout unless one is configured.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::pipeline::{AiBackend, PipelineError};
use crate::profile::PROFILE;

/// Environment variables checked for the credential, in order
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

// ─── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    pub thinking_budget: u32,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

/// Request body for one prompt with the profile's generation parameters.
pub fn build_request(prompt: &str) -> GenerateRequest {
    let g = &PROFILE.generation;
    GenerateRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: Some(prompt.to_string()),
                thought: None,
            }],
        }],
        generation_config: GenerationConfig {
            temperature: g.temperature,
            max_output_tokens: g.max_output_tokens,
            thinking_config: ThinkingConfig {
                thinking_budget: g.thinking_budget,
            },
        },
    }
}

/// Text of the first candidate, thought parts skipped.
pub fn response_text(response: &GenerateResponse) -> Option<String> {
    let content = response.candidates.first()?.content.as_ref()?;
    let text: String = content
        .parts
        .iter()
        .filter(|p| !p.thought.unwrap_or(false))
        .filter_map(|p| p.text.as_deref())
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

// ─── Backend ─────────────────────────────────────────────────────────

/// Blocking Gemini client
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl GeminiBackend {
    /// Client with the profile's model and endpoint and no request timeout.
    pub fn new(api_key: impl Into<String>) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_client(None)?,
            api_key: api_key.into(),
            model: PROFILE.generation.model.clone(),
            endpoint: PROFILE.generation.endpoint.clone(),
        })
    }

    /// Read the credential from `GEMINI_API_KEY`, then `API_KEY`.
    pub fn from_env() -> Result<Self, PipelineError> {
        let key = API_KEY_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .ok_or(PipelineError::MissingApiKey)?;
        Self::new(key)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Result<Self, PipelineError> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

fn build_client(timeout: Option<Duration>) -> Result<Client, PipelineError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PipelineError::AiError(e.to_string()))
}

impl AiBackend for GeminiBackend {
    fn send_prompt(&self, prompt: &str) -> Result<String, PipelineError> {
        info!(model = %self.model, "calling generation service");
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(prompt))
            .send()
            .map_err(|e| PipelineError::AiError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PipelineError::AiError(format!("HTTP {}: {}", status, body)));
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| PipelineError::AiError(e.to_string()))?;
        if let Some(reason) = parsed
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(PipelineError::AiError(format!("prompt blocked: {}", reason)));
        }
        debug!(
            finish_reason = ?parsed.candidates.first().and_then(|c| c.finish_reason.as_deref()),
            "generation finished"
        );
        response_text(&parsed).ok_or_else(|| PipelineError::AiError("no text in response".to_string()))
    }
}
