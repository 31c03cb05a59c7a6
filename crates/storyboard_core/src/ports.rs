//! crates/storyboard_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the storyboard's core logic.
//! These traits form the boundary of the hexagonal architecture, keeping the core
//! independent of the concrete generative-AI gateway and host environment.

use crate::domain::{ChatMessage, ImagePayload, QualityTier, SceneDraft};
use async_trait::async_trait;

/// Message fragment the gateway uses when the selected credential no longer
/// resolves to a usable project.
pub const ENTITY_NOT_FOUND: &str = "Requested entity was not found";

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., HTTP, JSON).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The gateway reported that the requested entity does not exist. Used as the
    /// signal that the selected credential is invalid.
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("The AI returned an invalid format. Please try again. ({0})")]
    MalformedResponse(String),
    #[error("No image data returned from {0}.")]
    MissingImage(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// True when this failure means the host should be asked for a new credential.
    pub fn is_credential_failure(&self) -> bool {
        match self {
            PortError::NotFound(_) => true,
            PortError::Unexpected(message) => message.contains(ENTITY_NOT_FOUND),
            _ => false,
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait ScriptAnalysisService: Send + Sync {
    /// Breaks a screenplay into structured scene drafts, in script order.
    async fn analyze_script(&self, script: &str) -> PortResult<Vec<SceneDraft>>;
}

#[async_trait]
pub trait ImageGenerationService: Send + Sync {
    /// Renders a storyboard frame for the given visual prompt.
    async fn generate_image(&self, prompt: &str, quality: QualityTier) -> PortResult<ImagePayload>;
}

#[async_trait]
pub trait ChatService: Send + Sync {
    /// Produces the assistant's reply to `message`, given everything said before it.
    /// An empty string is a valid (if unhelpful) reply.
    async fn reply(&self, history: &[ChatMessage], message: &str) -> PortResult<String>;
}

/// The host environment's credential selection capability.
///
/// Hosts without this capability are modelled by not providing an implementation
/// at all; callers then treat access as always granted.
#[async_trait]
pub trait CredentialHost: Send + Sync {
    /// Whether a usable credential is currently selected.
    async fn has_selected_key(&self) -> PortResult<bool>;

    /// Runs the host's selection flow with the credential the user picked.
    async fn select_key(&self, api_key: &str) -> PortResult<()>;
}
