//! services/api/src/web/protocol.rs
//!
//! Defines the wire shapes exchanged with the browser: the REST views of the
//! storyboard and the WebSocket message protocol.

use crate::web::state::SessionState;
use serde::{Deserialize, Serialize};
use storyboard_core::domain::{AccessState, ChatMessage, ChatRole, QualityTier, Scene, SceneStatus};
use utoipa::ToSchema;

//=========================================================================================
// Views of the Domain
//=========================================================================================

/// Image quality tier as the browser names it.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityLevel {
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl From<QualityTier> for QualityLevel {
    fn from(tier: QualityTier) -> Self {
        match tier {
            QualityTier::OneK => QualityLevel::OneK,
            QualityTier::TwoK => QualityLevel::TwoK,
            QualityTier::FourK => QualityLevel::FourK,
        }
    }
}

impl From<QualityLevel> for QualityTier {
    fn from(level: QualityLevel) -> Self {
        match level {
            QualityLevel::OneK => QualityTier::OneK,
            QualityLevel::TwoK => QualityTier::TwoK,
            QualityLevel::FourK => QualityTier::FourK,
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SceneStatusView {
    Pending,
    Generating,
    Completed,
    Error,
}

/// A scene card as rendered in the grid.
#[derive(Serialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SceneView {
    pub id: String,
    pub scene_number: i64,
    pub description: String,
    pub visual_prompt: String,
    pub setting: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialogue: Option<String>,
    /// A `data:` URI, present only when the status is `completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub status: SceneStatusView,
    /// Why the last generation failed, present only when the status is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Scene> for SceneView {
    fn from(scene: &Scene) -> Self {
        let (status, image_url, error) = match scene.status() {
            SceneStatus::Pending => (SceneStatusView::Pending, None, None),
            SceneStatus::Generating { .. } => (SceneStatusView::Generating, None, None),
            SceneStatus::Completed(image) => {
                (SceneStatusView::Completed, Some(image.to_string()), None)
            }
            SceneStatus::Error(reason) => (SceneStatusView::Error, None, Some(reason.clone())),
        };
        Self {
            id: scene.id.clone(),
            scene_number: scene.scene_number,
            description: scene.description.clone(),
            visual_prompt: scene.visual_prompt.clone(),
            setting: scene.setting.clone(),
            dialogue: scene.dialogue.clone(),
            image_url,
            status,
            error,
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRoleView {
    User,
    Assistant,
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct ChatMessageView {
    pub role: ChatRoleView,
    pub text: String,
}

impl From<&ChatMessage> for ChatMessageView {
    fn from(message: &ChatMessage) -> Self {
        let role = match message.role {
            ChatRole::User => ChatRoleView::User,
            ChatRole::Assistant => ChatRoleView::Assistant,
        };
        Self {
            role,
            text: message.text.clone(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessView {
    Unknown,
    Granted,
    Denied,
}

impl From<AccessState> for AccessView {
    fn from(access: AccessState) -> Self {
        match access {
            AccessState::Unknown => AccessView::Unknown,
            AccessState::Granted => AccessView::Granted,
            AccessState::Denied => AccessView::Denied,
        }
    }
}

/// Everything the browser needs to render the page from scratch.
#[derive(Serialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StoryboardSnapshot {
    pub title: String,
    pub script: String,
    pub scenes: Vec<SceneView>,
    pub is_parsing: bool,
    pub quality: QualityLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    pub transcript: Vec<ChatMessageView>,
    pub awaiting_reply: bool,
    pub access: AccessView,
}

impl From<&SessionState> for StoryboardSnapshot {
    fn from(session: &SessionState) -> Self {
        Self {
            title: session.storyboard.title.clone(),
            script: session.script.clone(),
            scenes: session.storyboard.scenes.iter().map(SceneView::from).collect(),
            is_parsing: session.storyboard.is_parsing,
            quality: session.storyboard.quality.into(),
            banner: session.banner.clone(),
            transcript: session
                .transcript
                .messages()
                .iter()
                .map(ChatMessageView::from)
                .collect(),
            awaiting_reply: session.awaiting_reply,
            access: session.access.into(),
        }
    }
}

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Commands a client may send over the WebSocket instead of calling REST.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Generate (or regenerate) the frame for one scene.
    GenerateScene { scene_id: String },

    /// Queue every pending or failed scene for generation.
    GenerateAll,

    /// Change the quality tier used by subsequent generations.
    SetQuality { quality: QualityLevel },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Every state change is pushed to connected clients as one of these.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full state. Sent on connect and after a client falls behind.
    Snapshot { storyboard: StoryboardSnapshot },

    /// A script analysis has started; the analyze action should be disabled.
    ParsingStarted,

    /// Analysis succeeded and the whole scene collection was replaced.
    ScenesReplaced { scenes: Vec<SceneView> },

    /// Analysis failed; `message` is the banner text.
    AnalysisFailed { message: String },

    /// One scene changed status.
    SceneUpdated { scene: SceneView },

    /// A message was appended to the chat transcript.
    ChatAppended { message: ChatMessageView },

    /// The assistant finished replying; the chat input can be re-enabled.
    ChatSettled,

    /// The access gate changed. `denied` means the gate screen must be shown.
    AccessChanged { access: AccessView },

    QualityChanged { quality: QualityLevel },

    TitleChanged { title: String },

    ScriptChanged { script: String },

    /// A command sent over the socket could not be carried out.
    Error { message: String },
}
