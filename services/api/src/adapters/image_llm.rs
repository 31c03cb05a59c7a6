//! services/api/src/adapters/image_llm.rs
//!
//! This module contains the adapter for storyboard frame generation.
//! It implements the `ImageGenerationService` port from the `core` crate.

const PANEL_STYLE_PREFIX: &str = "A cinematic storyboard panel, professional film aesthetic, hand-drawn digital art style. Scene description: ";
const PANEL_ASPECT_RATIO: &str = "16:9";

use crate::adapters::gemini::{
    Content, GeminiClient, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    ImageConfig, Part,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use storyboard_core::{
    domain::{ImagePayload, QualityTier},
    ports::{ImageGenerationService, PortError, PortResult},
};
use tracing::info;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ImageGenerationService` with Gemini image models.
///
/// The 1K tier goes to the fast model; 2K and 4K go to the high-fidelity model
/// together with the tier as an explicit `imageSize`.
#[derive(Clone)]
pub struct GeminiImageAdapter {
    client: GeminiClient,
    fast_model: String,
    hq_model: String,
}

impl GeminiImageAdapter {
    /// Creates a new `GeminiImageAdapter`.
    pub fn new(client: GeminiClient, fast_model: String, hq_model: String) -> Self {
        Self {
            client,
            fast_model,
            hq_model,
        }
    }

    fn model_for(&self, quality: QualityTier) -> &str {
        if quality.is_high_fidelity() {
            &self.hq_model
        } else {
            &self.fast_model
        }
    }

    fn build_request(prompt: &str, quality: QualityTier) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: None,
                parts: vec![Part::text(format!(
                    "{}{}",
                    PANEL_STYLE_PREFIX, prompt
                ))],
            }],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_mime_type: None,
                response_schema: None,
                image_config: Some(ImageConfig {
                    aspect_ratio: PANEL_ASPECT_RATIO.to_string(),
                    image_size: quality.resolution_hint().map(str::to_string),
                }),
            }),
        }
    }
}

/// Scans the first candidate's parts and returns the first inline image,
/// skipping any accompanying text parts.
fn first_inline_image(response: &GenerateContentResponse) -> Option<ImagePayload> {
    response
        .first_candidate_parts()
        .iter()
        .find_map(|part| part.inline_data.as_ref())
        .map(|inline| ImagePayload {
            mime_type: inline
                .mime_type
                .clone()
                .unwrap_or_else(|| "image/png".to_string()),
            data: inline.data.clone(),
        })
}

//=========================================================================================
// `ImageGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ImageGenerationService for GeminiImageAdapter {
    async fn generate_image(&self, prompt: &str, quality: QualityTier) -> PortResult<ImagePayload> {
        let model = self.model_for(quality);
        let request = Self::build_request(prompt, quality);
        let response = self.client.generate_content(model, &request).await?;

        let payload = first_inline_image(&response)
            .filter(|p| !p.data.trim().is_empty())
            .ok_or_else(|| PortError::MissingImage(model.to_string()))?;

        // The payload is handed to browsers as-is, so make sure it actually decodes.
        STANDARD.decode(payload.data.trim()).map_err(|e| {
            PortError::MalformedResponse(format!("Image payload from {} is not base64: {}", model, e))
        })?;

        info!("Generated a {} frame with {}.", quality, model);
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::credentials::ApiKeySlot;

    fn adapter() -> GeminiImageAdapter {
        let client = GeminiClient::new(
            reqwest::Client::new(),
            "http://localhost:9",
            ApiKeySlot::new(Some("test".to_string())),
        );
        GeminiImageAdapter::new(
            client,
            "gemini-2.5-flash-image".to_string(),
            "gemini-3-pro-image-preview".to_string(),
        )
    }

    #[test]
    fn four_k_carries_a_resolution_hint() {
        let json = serde_json::to_value(GeminiImageAdapter::build_request(
            "A rainy rooftop",
            QualityTier::FourK,
        ))
        .unwrap();
        let image_config = &json["generationConfig"]["imageConfig"];
        assert_eq!(image_config["aspectRatio"], "16:9");
        assert_eq!(image_config["imageSize"], "4K");
        assert_eq!(adapter().model_for(QualityTier::FourK), "gemini-3-pro-image-preview");
        assert_eq!(adapter().model_for(QualityTier::TwoK), "gemini-3-pro-image-preview");
    }

    #[test]
    fn one_k_has_no_resolution_hint() {
        let json = serde_json::to_value(GeminiImageAdapter::build_request(
            "A rainy rooftop",
            QualityTier::OneK,
        ))
        .unwrap();
        let image_config = &json["generationConfig"]["imageConfig"];
        assert_eq!(image_config["aspectRatio"], "16:9");
        assert!(image_config.get("imageSize").is_none());
        assert_eq!(adapter().model_for(QualityTier::OneK), "gemini-2.5-flash-image");
    }

    #[test]
    fn prompt_is_prefixed_with_panel_style() {
        let json = serde_json::to_value(GeminiImageAdapter::build_request(
            "John brews coffee",
            QualityTier::OneK,
        ))
        .unwrap();
        let text = json["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("A cinematic storyboard panel"));
        assert!(text.ends_with("Scene description: John brews coffee"));
    }

    #[test]
    fn scan_skips_text_parts_and_takes_first_image() {
        let raw = r#"{"candidates":[{"content":{"parts":[
            {"text":"Here is your frame."},
            {"inlineData":{"mimeType":"image/jpeg","data":"/9j/AAAA"}},
            {"inlineData":{"mimeType":"image/png","data":"iVBORw=="}}
        ]}}]}"#;
        let response: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let payload = first_inline_image(&response).unwrap();
        assert_eq!(payload.mime_type, "image/jpeg");
        assert_eq!(payload.data, "/9j/AAAA");
    }

    #[test]
    fn text_only_response_has_no_image() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"I cannot draw that."}]}}]}"#;
        let response: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert!(first_inline_image(&response).is_none());
    }
}
