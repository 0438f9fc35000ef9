//! Gemini vision estimator
//!
//! Sends the food image together with a fixed nutrition prompt to the
//! `generateContent` endpoint and parses the JSON the model is asked to
//! produce.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::estimator::{EstimateError, EstimateResult, Estimator, parse_model_output};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Sampling temperature; kept low so repeated estimates stay stable
const TEMPERATURE: f32 = 0.2;

const ESTIMATE_PROMPT: &str = r#"You are a nutrition analysis assistant. Analyze this food image and estimate total calories.

Output ONLY valid JSON with this exact structure:
{
  "calories": <number>,
  "confidence": "low|medium|high",
  "items": ["food1", "food2", ...],
  "reasoning": "brief explanation"
}

Confidence levels:
- high: Common foods, clear portions visible
- medium: Some foods recognizable, portions estimated
- low: Unclear foods or portions, or non-food image

If no food detected, return:
{"calories": 0, "confidence": "low", "items": [], "reasoning": "No food detected"}

Example (grilled chicken with vegetables):
{"calories": 450, "confidence": "high", "items": ["Grilled chicken breast (200g)", "Steamed broccoli (100g)", "Brown rice (150g)"], "reasoning": "Standard portions for grilled chicken plate"}"#;

/// Connection settings for the Gemini API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_GEMINI_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: default_model(),
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Production estimator backed by the Gemini `generateContent` API
#[derive(Debug, Clone)]
pub struct GeminiEstimator {
    api_key: String,
    model: String,
    base_url: String,
    timeout_seconds: u64,
    client: Client,
}

impl GeminiEstimator {
    /// Creates an estimator from configuration.
    ///
    /// Fails when the API key is empty or the HTTP client cannot be built.
    pub fn new(config: GeminiConfig) -> Result<Self, EstimateError> {
        if config.api_key.trim().is_empty() {
            return Err(EstimateError::config("Gemini API key is not set"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| EstimateError::config(format!("Failed to build HTTP client: {}", e)))?;

        info!(model = %config.model, "Gemini estimator initialized");

        Ok(Self {
            api_key: config.api_key,
            model: config.model,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_seconds: config.timeout_seconds,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_request(image: &[u8], mime_type: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part {
                        text: Some(ESTIMATE_PROMPT.to_string()),
                        inline_data: None,
                    },
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: mime_type.to_string(),
                            data: BASE64.encode(image),
                        }),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
            },
        }
    }

    /// Extracts the text of the first part of the first candidate.
    fn extract_text(response: GenerateContentResponse) -> Result<String, EstimateError> {
        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| EstimateError::provider("No response from Gemini API", None::<&str>))?;

        if text.trim().is_empty() {
            return Err(EstimateError::provider(
                "Unexpected empty response from Gemini API",
                None::<&str>,
            ));
        }
        Ok(text)
    }

    async fn error_from_response(resp: reqwest::Response) -> EstimateError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let (message, code) = match serde_json::from_str::<ApiErrorEnvelope>(&body) {
            Ok(envelope) => (envelope.error.message, envelope.error.status),
            Err(_) => (body, None),
        };

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                EstimateError::auth(format!("Authentication failed ({}): {}", status, message))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                EstimateError::rate_limit(format!("{}: {}", status, message))
            }
            _ => EstimateError::provider(
                format!("Gemini API call failed ({}): {}", status, message),
                Some(code.unwrap_or_else(|| status.as_u16().to_string())),
            ),
        }
    }
}

#[async_trait]
impl Estimator for GeminiEstimator {
    async fn estimate(&self, image: Bytes, mime_type: &str) -> Result<EstimateResult, EstimateError> {
        let request = Self::build_request(&image, mime_type);
        let url = self.endpoint();
        debug!(model = %self.model, mime_type = %mime_type, image_bytes = image.len(), "Requesting calorie estimate");

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Gemini request failed");
                if e.is_timeout() {
                    EstimateError::timeout(self.timeout_seconds)
                } else if e.is_connect() {
                    EstimateError::network(format!("Connection failed: {}", e))
                } else {
                    EstimateError::network(format!("Request failed: {}", e))
                }
            })?;

        if resp.status() != StatusCode::OK {
            return Err(Self::error_from_response(resp).await);
        }

        let body = resp.json::<GenerateContentResponse>().await.map_err(|e| {
            EstimateError::serialization(format!("Failed to parse Gemini response: {}", e))
        })?;

        let text = Self::extract_text(body)?;
        let result = parse_model_output(&text)?;

        debug!(
            calories = result.calories,
            confidence = %result.confidence,
            items = result.items.len(),
            "Received calorie estimate"
        );
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
