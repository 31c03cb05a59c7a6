//! services/api/src/adapters/gemini.rs
//!
//! The shared HTTP client and wire types for the Gemini `generateContent` endpoint.
//! The script and image adapters are thin layers on top of this module.

use crate::adapters::credentials::ApiKeySlot;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use storyboard_core::ports::{PortError, PortResult, ENTITY_NOT_FOUND};
use tracing::error;

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// A user turn made of a single text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub aspect_ratio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_size: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

impl GenerateContentResponse {
    /// The parts of the first candidate, or nothing when there is no candidate.
    pub fn first_candidate_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or_default()
    }

    /// All text parts of the first candidate joined together.
    pub fn text(&self) -> Option<String> {
        let text: String = self
            .first_candidate_parts()
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

//=========================================================================================
// The Shared Client
//=========================================================================================

/// Calls `generateContent` for any model, reading the API key fresh on each call.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_base: String,
    api_key: ApiKeySlot,
}

impl GeminiClient {
    /// Creates a new `GeminiClient`.
    pub fn new(http: Client, api_base: impl Into<String>, api_key: ApiKeySlot) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            api_key,
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            model.trim()
        )
    }

    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> PortResult<GenerateContentResponse> {
        let api_key = self.api_key.require()?;

        let response = self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PortError::Unexpected(format!("Reading Gemini response failed: {}", e)))?;

        if !status.is_success() {
            error!("Gemini {} call failed with {}: {}", model, status, body);
            return Err(classify_failure(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            PortError::MalformedResponse(format!("Invalid Gemini response JSON: {}", e))
        })
    }
}

//=========================================================================================
// Error Classification
//=========================================================================================

/// Maps a non-success Gemini response onto a `PortError`.
///
/// A 404 or a `NOT_FOUND` status is what the gateway sends when the selected key
/// no longer reaches a usable project, so it becomes `PortError::NotFound`.
pub fn classify_failure(status: StatusCode, body: &str) -> PortError {
    let (message, api_status) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.message, envelope.error.status),
        Err(_) => (body.trim().to_string(), None),
    };

    if status == StatusCode::NOT_FOUND || api_status.as_deref() == Some("NOT_FOUND") {
        return PortError::NotFound(message);
    }
    if status == StatusCode::UNAUTHORIZED {
        return PortError::Unauthorized;
    }
    classify_message(format!("Gemini returned {}: {}", status, message))
}

/// Classifies a failure that only surfaced as text (e.g. through a client library).
pub fn classify_message(message: String) -> PortError {
    if message.contains(ENTITY_NOT_FOUND) {
        PortError::NotFound(message)
    } else {
        PortError::Unexpected(message)
    }
}
