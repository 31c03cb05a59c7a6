//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the in-memory storyboard session.

use crate::config::Config;
use crate::web::protocol::ServerMessage;
use crate::web::render_task::{RenderJob, RenderQueue};
use std::sync::Arc;
use storyboard_core::{
    domain::{AccessState, StoryboardState, Transcript},
    ports::{ChatService, CredentialHost, ImageGenerationService, ScriptAnalysisService},
};
use tokio::sync::{broadcast, mpsc, Mutex};

/// How many unread events a slow WebSocket client may fall behind before it
/// is sent a fresh snapshot instead.
const EVENT_BUFFER: usize = 256;

//=========================================================================================
// SessionState (the one open storyboard)
//=========================================================================================

/// Everything the browser renders from. Lives for the lifetime of the process;
/// there is no persistence.
#[derive(Debug, Default)]
pub struct SessionState {
    pub storyboard: StoryboardState,
    /// Current contents of the script editor.
    pub script: String,
    /// Last user-visible analysis failure. Cleared when a new analysis starts.
    pub banner: Option<String>,
    pub transcript: Transcript,
    pub awaiting_reply: bool,
    pub access: AccessState,
}

//=========================================================================================
// AppState (Shared Across All Handlers and Workers)
//=========================================================================================

/// The gateway-facing ports the handlers dispatch to.
#[derive(Clone)]
pub struct Gateways {
    pub script_adapter: Arc<dyn ScriptAnalysisService>,
    pub image_adapter: Arc<dyn ImageGenerationService>,
    pub chat_adapter: Arc<dyn ChatService>,
}

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub script_adapter: Arc<dyn ScriptAnalysisService>,
    pub image_adapter: Arc<dyn ImageGenerationService>,
    pub chat_adapter: Arc<dyn ChatService>,
    /// `None` when the host offers no key selection; access is then always granted.
    pub credential_host: Option<Arc<dyn CredentialHost>>,
    pub session: Mutex<SessionState>,
    pub render_queue: RenderQueue,
    events: broadcast::Sender<ServerMessage>,
}

impl AppState {
    /// Builds the state and hands back the receiving end of the render queue,
    /// which the caller passes to `render_task::render_worker`.
    pub fn new(
        config: Arc<Config>,
        gateways: Gateways,
        credential_host: Option<Arc<dyn CredentialHost>>,
    ) -> (Self, mpsc::UnboundedReceiver<RenderJob>) {
        let (render_queue, jobs) = RenderQueue::new();
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let state = Self {
            config,
            script_adapter: gateways.script_adapter,
            image_adapter: gateways.image_adapter,
            chat_adapter: gateways.chat_adapter,
            credential_host,
            session: Mutex::new(SessionState::default()),
            render_queue,
            events,
        };
        (state, jobs)
    }

    /// Pushes an event to every connected client. Having no clients is fine.
    pub fn publish(&self, message: ServerMessage) {
        let _ = self.events.send(message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.events.subscribe()
    }
}
