//! services/api/src/adapters/script_llm.rs
//!
//! This module contains the adapter for the script breakdown model.
//! It implements the `ScriptAnalysisService` port from the `core` crate.

const ANALYSIS_PROMPT: &str = "Analyze the following screenplay/script and break it down into a series of visual storyboard scenes. For each scene, provide a scene number, a visual description (what happens in the frame), a visual prompt (optimized for high-quality image generation), and the setting. Return the data as a clean JSON array.";

use crate::adapters::gemini::{
    Content, GeminiClient, GenerateContentRequest, GenerationConfig,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use storyboard_core::{
    domain::SceneDraft,
    ports::{PortError, PortResult, ScriptAnalysisService},
};
use tracing::{error, info};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ScriptAnalysisService` using Gemini structured output.
#[derive(Clone)]
pub struct GeminiScriptAdapter {
    client: GeminiClient,
    model: String,
}

impl GeminiScriptAdapter {
    /// Creates a new `GeminiScriptAdapter`.
    pub fn new(client: GeminiClient, model: String) -> Self {
        Self { client, model }
    }

    fn build_request(script: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user_text(format!(
                "{}\n\nScript:\n{}",
                ANALYSIS_PROMPT, script
            ))],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(scene_schema()),
                image_config: None,
            }),
        }
    }
}

/// The structured-output schema the model must follow.
fn scene_schema() -> serde_json::Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "sceneNumber": { "type": "INTEGER" },
                "description": { "type": "STRING" },
                "visualPrompt": { "type": "STRING" },
                "setting": { "type": "STRING" },
                "dialogue": { "type": "STRING" }
            },
            "required": ["sceneNumber", "description", "visualPrompt", "setting"]
        }
    })
}

//=========================================================================================
// Response Parsing
//=========================================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneRecord {
    scene_number: i64,
    description: String,
    visual_prompt: String,
    setting: String,
    #[serde(default)]
    dialogue: Option<String>,
}

impl SceneRecord {
    fn to_domain(self) -> SceneDraft {
        SceneDraft {
            scene_number: self.scene_number,
            description: self.description,
            visual_prompt: self.visual_prompt,
            setting: self.setting,
            dialogue: self.dialogue,
        }
    }
}

/// Parses the model's JSON text. A missing body counts as an empty breakdown;
/// anything that is not an array of complete scene objects is malformed.
fn parse_scenes(text: Option<&str>) -> PortResult<Vec<SceneDraft>> {
    let records: Vec<SceneRecord> = serde_json::from_str(text.unwrap_or("[]")).map_err(|e| {
        error!("Failed to parse script JSON: {}", e);
        PortError::MalformedResponse(e.to_string())
    })?;
    Ok(records.into_iter().map(SceneRecord::to_domain).collect())
}

//=========================================================================================
// `ScriptAnalysisService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ScriptAnalysisService for GeminiScriptAdapter {
    async fn analyze_script(&self, script: &str) -> PortResult<Vec<SceneDraft>> {
        let request = Self::build_request(script);
        let response = self.client.generate_content(&self.model, &request).await?;
        let scenes = parse_scenes(response.text().as_deref())?;
        info!("Script analysis produced {} scenes.", scenes.len());
        Ok(scenes)
    }
}
