pub mod domain;
pub mod ports;

pub use domain::{
    scenes_from_drafts, AccessState, ChatMessage, ChatRole, ImagePayload, ImageRef, QualityTier,
    Scene, SceneDraft, SceneStatus, StoryboardState, Transcript, TransitionError, DEFAULT_TITLE,
};
pub use ports::{
    ChatService, CredentialHost, ImageGenerationService, PortError, PortResult,
    ScriptAnalysisService, ENTITY_NOT_FOUND,
};
