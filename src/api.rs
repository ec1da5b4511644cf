//! Gemini API interaction for copy and image generation.
//!
//! # Architecture
//!
//! The module uses a trait-based design so the stages never touch HTTP
//! directly:
//! - [`TextGeneration`]: one schema-constrained JSON generation call
//! - [`ImageGeneration`]: one image attempt, classified as an [`ImageAttempt`]
//! - [`GeminiClient`]: implements both against the `generateContent` endpoint
//!
//! # Failure classification
//!
//! Image attempts never return an error value. The transport inspects the
//! HTTP status and the structured error body and reports whether the attempt
//! was rate limited (HTTP 429 or `RESOURCE_EXHAUSTED`) or failed for another
//! reason. The retry policy in [`crate::image`] only ever looks at that
//! classification.

use crate::error::{PipelineError, PipelineResult};
use crate::models::InlineImage;
use crate::utils::truncate_for_log;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Outcome of a single image generation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageAttempt {
    /// The model returned an inline image.
    Generated(InlineImage),
    /// Rate limited or out of quota; worth retrying after a pause.
    RateLimited(String),
    /// Any other failure; retrying will not help.
    Failed(String),
}

/// Schema-constrained text generation.
pub trait TextGeneration {
    /// Send `prompt` and return the JSON text the model produced under
    /// `schema`.
    ///
    /// Transport failures are [`PipelineError::CopyGenerationFailed`]; a reply
    /// without any text is [`PipelineError::GenerationSchemaError`].
    async fn generate_json(&self, prompt: &str, schema: &Value) -> PipelineResult<String>;
}

/// Image generation, one attempt per call.
pub trait ImageGeneration {
    async fn generate_image(&self, prompt: &str) -> ImageAttempt;
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .iter()
            .take(1)
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
    }

    fn text(&self) -> Option<String> {
        let text: String = self.parts().filter_map(|p| p.text.as_deref()).collect();
        (!text.trim().is_empty()).then_some(text)
    }

    fn first_image(self) -> Option<InlineImage> {
        self.candidates
            .into_iter()
            .take(1)
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.inline_data)
            .map(|d| InlineImage {
                mime_type: d.mime_type,
                data: d.data,
            })
    }
}

fn error_body(body: &str) -> ErrorBody {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error)
        .unwrap_or_default()
}

fn describe_failure(status: u16, body: &str) -> String {
    let err = error_body(body);
    match err.message {
        Some(message) => format!("HTTP {status}: {message}"),
        None => format!("HTTP {status}: {}", truncate_for_log(body, 200)),
    }
}

/// Classify a `generateContent` reply to an image request.
pub fn classify_image_response(status: u16, body: &str) -> ImageAttempt {
    if !(200..300).contains(&status) {
        let err = error_body(body);
        let message = describe_failure(status, body);
        if status == 429 || err.status.as_deref() == Some("RESOURCE_EXHAUSTED") {
            return ImageAttempt::RateLimited(message);
        }
        return ImageAttempt::Failed(message);
    }

    match serde_json::from_str::<GenerateContentResponse>(body) {
        Ok(resp) => match resp.first_image() {
            Some(image) => ImageAttempt::Generated(image),
            None => ImageAttempt::Failed("response contained no inline image".to_string()),
        },
        Err(e) => ImageAttempt::Failed(format!("unreadable image response: {e}")),
    }
}

/// `generateContent` body asking for JSON constrained by `schema`.
fn text_request(prompt: &str, schema: &Value) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": schema,
        }
    })
}

/// `generateContent` body asking for a single image.
fn image_request(prompt: &str, aspect_ratio: &str) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "responseModalities": ["IMAGE"],
            "imageConfig": { "aspectRatio": aspect_ratio },
        }
    })
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    text_model: String,
    image_model: String,
    aspect_ratio: String,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("text_model", &self.text_model)
            .field("image_model", &self.image_model)
            .field("aspect_ratio", &self.aspect_ratio)
            .finish()
    }
}

impl GeminiClient {
    pub fn new(client: Client, config: &crate::config::GeminiConfig) -> Self {
        Self {
            client,
            base_url: GEMINI_API_BASE.to_string(),
            api_key: config.api_key.clone(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
            aspect_ratio: config.aspect_ratio.clone(),
        }
    }

    /// POST a request body to `models/{model}:generateContent`.
    async fn generate_content(&self, model: &str, body: &Value) -> Result<(u16, String), reqwest::Error> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let t0 = Instant::now();
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        debug!(
            %model,
            status,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            bytes = text.len(),
            "generateContent returned"
        );
        Ok((status, text))
    }
}

impl TextGeneration for GeminiClient {
    #[instrument(level = "info", skip_all, fields(model = %self.text_model))]
    async fn generate_json(&self, prompt: &str, schema: &Value) -> PipelineResult<String> {
        let body = text_request(prompt, schema);
        let (status, text) = self
            .generate_content(&self.text_model, &body)
            .await
            .map_err(|e| PipelineError::CopyGenerationFailed(e.to_string()))?;
        if !(200..300).contains(&status) {
            let reason = describe_failure(status, &text);
            warn!(status, %reason, "Text generation rejected");
            return Err(PipelineError::CopyGenerationFailed(reason));
        }

        let resp: GenerateContentResponse = serde_json::from_str(&text).map_err(|e| {
            PipelineError::GenerationSchemaError(format!("unreadable generation envelope: {e}"))
        })?;
        let json = resp.text().ok_or_else(|| {
            PipelineError::GenerationSchemaError("response contained no text".to_string())
        })?;
        info!(bytes = json.len(), "Received structured copy");
        Ok(json)
    }
}

impl ImageGeneration for GeminiClient {
    #[instrument(level = "info", skip_all, fields(model = %self.image_model))]
    async fn generate_image(&self, prompt: &str) -> ImageAttempt {
        let body = image_request(prompt, &self.aspect_ratio);
        match self.generate_content(&self.image_model, &body).await {
            Ok((status, text)) => classify_image_response(status, &text),
            Err(e) => ImageAttempt::Failed(format!("request failed: {e}")),
        }
    }
}
