//! Google Gemini text-generation client
//!
//! The rest of the crate only sees the [`TextGenerator`] trait, so the
//! pipeline, the chat and the tests never depend on HTTP details.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::GeminiSettings;
use crate::error::{AnalyzerError, ApiError, Result};
use crate::rate_limiter::RateLimiter;

/// One synchronous prompt -> text call against a generative model
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates text for the prompt or returns a typed API failure
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ApiError>;
}

/// Builds a generator for a given API key
///
/// Jobs submitted through the web form each carry their own key.
pub trait GeneratorFactory: Send + Sync {
    /// Creates a generator bound to `api_key`
    fn create(&self, api_key: &str) -> Result<Arc<dyn TextGenerator>>;
}

/// Request structure for the `generateContent` endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

/// Response structure from the Gemini API
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<PartResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    message: String,
    status: String,
}

enum CallError {
    UnknownModel(String),
    Api(ApiError),
}

/// Gemini API client
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    models: Vec<String>,
    active_model: AtomicUsize,
    generation: GenerationConfig,
    limiter: RateLimiter,
}

impl GeminiClient {
    /// Creates a client from the Gemini settings and an API key
    pub fn new(settings: &GeminiSettings, api_key: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(AnalyzerError::Config("Gemini API key is empty".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .user_agent(concat!("reposcribe/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut models = vec![settings.model.clone()];
        models.extend(
            settings
                .fallback_models
                .iter()
                .filter(|m| **m != settings.model)
                .cloned(),
        );

        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            models,
            active_model: AtomicUsize::new(0),
            generation: GenerationConfig {
                temperature: settings.temperature,
                max_output_tokens: settings.max_output_tokens,
            },
            limiter: RateLimiter::per_minute(settings.requests_per_minute),
        })
    }

    /// Model currently used for requests
    pub fn active_model(&self) -> &str {
        &self.models[self.active_model.load(Ordering::Relaxed).min(self.models.len() - 1)]
    }

    async fn call_model(&self, model: &str, prompt: &str) -> std::result::Result<String, CallError> {
        let url = format!("{}/{}:generateContent", self.base_url, model);
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: self.generation,
        };

        self.limiter.acquire().await;
        debug!("POST {} ({} prompt chars)", url, prompt.chars().count());

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| CallError::Api(ApiError::Transport(e.without_url().to_string())))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CallError::Api(ApiError::Transport(e.without_url().to_string())))?;

        if !status.is_success() {
            return Err(classify_failure(status, &text));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text).map_err(|e| {
            CallError::Api(ApiError::Transport(format!("unreadable response body: {}", e)))
        })?;
        extract_text(parsed).map_err(CallError::Api)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ApiError> {
        let mut index = self.active_model.load(Ordering::Relaxed);
        loop {
            let model = &self.models[index];
            match self.call_model(model, prompt).await {
                Ok(text) => {
                    self.active_model.store(index, Ordering::Relaxed);
                    return Ok(text);
                }
                Err(CallError::Api(e)) => return Err(e),
                Err(CallError::UnknownModel(message)) => {
                    if index + 1 >= self.models.len() {
                        return Err(ApiError::MalformedRequest(format!(
                            "no usable model ({}): {}",
                            self.models.join(", "),
                            message
                        )));
                    }
                    warn!("Model {} unavailable, falling back to {}", model, self.models[index + 1]);
                    index += 1;
                }
            }
        }
    }
}

fn classify_failure(status: StatusCode, body: &str) -> CallError {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let message = if envelope.error.message.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, envelope.error.message)
    };

    // Gemini reports a bad key as 400 INVALID_ARGUMENT with an API_KEY_INVALID reason
    let bad_key = body.contains("API_KEY_INVALID") || envelope.error.message.contains("API key not valid");

    let api = match status {
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::AuthFailed(message),
        StatusCode::NOT_FOUND => return CallError::UnknownModel(message),
        _ if bad_key => ApiError::AuthFailed(message),
        s if s.is_server_error() => ApiError::Transport(message),
        _ if envelope.error.status == "RESOURCE_EXHAUSTED" => ApiError::RateLimited(message),
        _ => ApiError::MalformedRequest(message),
    };
    CallError::Api(api)
}

fn extract_text(response: GenerateResponse) -> std::result::Result<String, ApiError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ApiError::ContentFiltered(format!("prompt blocked: {}", reason)));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(ApiError::Transport("response contained no candidates".into()));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return match candidate.finish_reason.as_deref() {
            Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT")) => {
                Err(ApiError::ContentFiltered(format!("response blocked: {}", reason)))
            }
            Some(reason) => Err(ApiError::Transport(format!("empty response (finish reason {})", reason))),
            None => Err(ApiError::Transport("empty response".into())),
        };
    }
    Ok(text)
}

/// Factory producing [`GeminiClient`]s that share the same settings
pub struct GeminiFactory {
    settings: GeminiSettings,
}

impl GeminiFactory {
    /// Creates a factory for the given settings
    pub fn new(settings: GeminiSettings) -> Self {
        Self { settings }
    }
}

impl GeneratorFactory for GeminiFactory {
    fn create(&self, api_key: &str) -> Result<Arc<dyn TextGenerator>> {
        Ok(Arc::new(GeminiClient::new(&self.settings, api_key)?))
    }
}
