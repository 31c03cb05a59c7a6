//! crates/storyboard_core/src/domain.rs
//!
//! Defines the pure, core data structures for the storyboard application.
//! These structs are independent of any transport or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;

/// The title every new storyboard session starts with.
pub const DEFAULT_TITLE: &str = "Untitled Project";

//=========================================================================================
// Scene Drafts and Images (what the gateway hands back)
//=========================================================================================

/// One scene exactly as the script analysis gateway described it, before it
/// has been given an identity or a status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneDraft {
    pub scene_number: i64,
    pub description: String,
    pub visual_prompt: String,
    pub setting: String,
    pub dialogue: Option<String>,
}

/// An encoded image as returned by the image gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    /// Base64 encoded image bytes.
    pub data: String,
}

impl ImagePayload {
    /// Turns the payload into a self-contained `data:` URI.
    /// Returns `None` when the payload carries no data at all.
    pub fn to_image_ref(&self) -> Option<ImageRef> {
        if self.data.trim().is_empty() {
            return None;
        }
        let mime_type = if self.mime_type.trim().is_empty() {
            "image/png"
        } else {
            self.mime_type.trim()
        };
        Some(ImageRef(format!("data:{};base64,{}", mime_type, self.data.trim())))
    }
}

/// A directly displayable image reference. Always a non-empty `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//=========================================================================================
// Scene and its Generation State Machine
//=========================================================================================

/// Where a scene is in its image generation cycle.
///
/// `Completed` owns the image, so a completed scene without an image cannot be
/// built, and `Error` owns none, so a failed scene never shows a stale frame.
/// `Generating` names the attempt in flight; only that attempt may settle it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneStatus {
    Pending,
    Generating { attempt: u64 },
    Completed(ImageRef),
    Error(String),
}

impl SceneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneStatus::Pending => "pending",
            SceneStatus::Generating { .. } => "generating",
            SceneStatus::Completed(_) => "completed",
            SceneStatus::Error(_) => "error",
        }
    }

    /// True for the states picked up by "generate all".
    pub fn awaits_generation(&self) -> bool {
        matches!(self, SceneStatus::Pending | SceneStatus::Error(_))
    }
}

/// Raised when a generation result arrives for an attempt that is no longer
/// the one in flight.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Result of attempt {attempt} for scene {scene_id} is stale; the scene is {status}")]
pub struct TransitionError {
    pub scene_id: String,
    pub attempt: u64,
    pub status: &'static str,
}

/// One visual beat of the screenplay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    pub id: String,
    pub scene_number: i64,
    pub description: String,
    pub visual_prompt: String,
    pub setting: String,
    pub dialogue: Option<String>,
    status: SceneStatus,
    attempts: u64,
}

impl Scene {
    /// Gives a draft its identity. The id combines the draft's position in its
    /// batch with the batch timestamp, so ids never collide inside one batch.
    pub fn from_draft(draft: SceneDraft, index: usize, created_at: DateTime<Utc>) -> Self {
        Self {
            id: format!("scene-{}-{}", index, created_at.timestamp_millis()),
            scene_number: draft.scene_number,
            description: draft.description,
            visual_prompt: draft.visual_prompt,
            setting: draft.setting,
            dialogue: draft.dialogue,
            status: SceneStatus::Pending,
            attempts: 0,
        }
    }

    pub fn status(&self) -> &SceneStatus {
        &self.status
    }

    pub fn image(&self) -> Option<&ImageRef> {
        match &self.status {
            SceneStatus::Completed(image) => Some(image),
            _ => None,
        }
    }

    /// Starts a new attempt and enters `Generating`. Allowed from every state:
    /// pending and error start a cycle, completed starts a regeneration, and a
    /// request while generating supersedes the attempt already in flight.
    pub fn begin_generation(&mut self) -> u64 {
        self.attempts += 1;
        self.status = SceneStatus::Generating {
            attempt: self.attempts,
        };
        self.attempts
    }

    pub fn complete_generation(
        &mut self,
        attempt: u64,
        image: ImageRef,
    ) -> Result<(), TransitionError> {
        self.ensure_current(attempt)?;
        self.status = SceneStatus::Completed(image);
        Ok(())
    }

    pub fn fail_generation(
        &mut self,
        attempt: u64,
        reason: impl Into<String>,
    ) -> Result<(), TransitionError> {
        self.ensure_current(attempt)?;
        self.status = SceneStatus::Error(reason.into());
        Ok(())
    }

    fn ensure_current(&self, attempt: u64) -> Result<(), TransitionError> {
        match self.status {
            SceneStatus::Generating { attempt: current } if current == attempt => Ok(()),
            _ => Err(TransitionError {
                scene_id: self.id.clone(),
                attempt,
                status: self.status.as_str(),
            }),
        }
    }
}

/// Builds a fresh scene collection from one analysis result.
pub fn scenes_from_drafts(drafts: Vec<SceneDraft>, created_at: DateTime<Utc>) -> Vec<Scene> {
    drafts
        .into_iter()
        .enumerate()
        .map(|(index, draft)| Scene::from_draft(draft, index, created_at))
        .collect()
}

//=========================================================================================
// Quality Tier
//=========================================================================================

/// Image generation fidelity level selected for the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum QualityTier {
    #[default]
    OneK,
    TwoK,
    FourK,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::OneK => "1K",
            QualityTier::TwoK => "2K",
            QualityTier::FourK => "4K",
        }
    }

    /// Higher tiers are routed to the high-fidelity image backend.
    pub fn is_high_fidelity(&self) -> bool {
        !matches!(self, QualityTier::OneK)
    }

    /// The explicit resolution hint sent along with the request, if any.
    pub fn resolution_hint(&self) -> Option<&'static str> {
        self.is_high_fidelity().then(|| self.as_str())
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//=========================================================================================
// Chat
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// A single turn in the assistant conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
        }
    }
}

/// Append-only, ordered chat history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

//=========================================================================================
// Access Gate
//=========================================================================================

/// Whether a usable gateway credential is selected in the host environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccessState {
    #[default]
    Unknown,
    Granted,
    Denied,
}

impl AccessState {
    /// Only an explicit denial blocks; an unresolved check does not.
    pub fn blocks(&self) -> bool {
        matches!(self, AccessState::Denied)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessState::Unknown => "unknown",
            AccessState::Granted => "granted",
            AccessState::Denied => "denied",
        }
    }
}

//=========================================================================================
// Storyboard Session State
//=========================================================================================

/// Title, scenes, parsing flag and selected quality tier of the open storyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryboardState {
    pub title: String,
    pub scenes: Vec<Scene>,
    pub is_parsing: bool,
    pub quality: QualityTier,
}

impl Default for StoryboardState {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            scenes: Vec::new(),
            is_parsing: false,
            quality: QualityTier::default(),
        }
    }
}

impl StoryboardState {
    /// Swaps in a whole new collection; scenes are never removed one by one.
    pub fn replace_scenes(&mut self, scenes: Vec<Scene>) {
        self.scenes = scenes;
    }

    pub fn scene(&self, scene_id: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == scene_id)
    }

    pub fn scene_mut(&mut self, scene_id: &str) -> Option<&mut Scene> {
        self.scenes.iter_mut().find(|s| s.id == scene_id)
    }

    /// Ids of scenes in pending or error state, in collection order.
    pub fn ids_awaiting_generation(&self) -> Vec<String> {
        self.scenes
            .iter()
            .filter(|s| s.status().awaits_generation())
            .map(|s| s.id.clone())
            .collect()
    }
}
