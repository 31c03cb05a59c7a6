//! Scripted stand-ins for the gateway ports, plus helpers for building state.
#![allow(dead_code)]

use api_lib::{
    config::Config,
    web::{
        render_task::RenderJob,
        state::{AppState, Gateways},
    },
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storyboard_core::{
    domain::{scenes_from_drafts, ChatMessage, ImagePayload, QualityTier, Scene, SceneDraft},
    ports::{
        ChatService, CredentialHost, ImageGenerationService, PortResult, ScriptAnalysisService,
    },
};
use tokio::sync::{mpsc, Semaphore};

type Responder<T> = Box<dyn Fn(&str) -> PortResult<T> + Send + Sync>;

/// Holds calls open until the test releases them. Starts closed.
#[derive(Clone)]
pub struct Latch(Arc<Semaphore>);

impl Latch {
    pub fn new() -> Self {
        Self(Arc::new(Semaphore::new(0)))
    }

    pub fn release(&self, calls: usize) {
        self.0.add_permits(calls);
    }

    async fn pass(&self) {
        if let Ok(permit) = self.0.acquire().await {
            permit.forget();
        }
    }
}

//=========================================================================================
// Script Analysis
//=========================================================================================

pub struct MockScript {
    respond: Responder<Vec<SceneDraft>>,
    latch: Option<Latch>,
    pub calls: AtomicUsize,
}

impl MockScript {
    pub fn new(respond: impl Fn(&str) -> PortResult<Vec<SceneDraft>> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            latch: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn latched(mut self, latch: Latch) -> Self {
        self.latch = Some(latch);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScriptAnalysisService for MockScript {
    async fn analyze_script(&self, script: &str) -> PortResult<Vec<SceneDraft>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latch) = &self.latch {
            latch.pass().await;
        }
        (self.respond)(script)
    }
}

//=========================================================================================
// Image Generation
//=========================================================================================

pub struct MockImage {
    respond: Responder<ImagePayload>,
    latch: Option<Latch>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub prompts: Mutex<Vec<(String, QualityTier)>>,
}

impl MockImage {
    pub fn new(respond: impl Fn(&str) -> PortResult<ImagePayload> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            latch: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answers every prompt with a tiny PNG payload.
    pub fn succeeding() -> Self {
        Self::new(|_| Ok(png()))
    }

    pub fn latched(mut self, latch: Latch) -> Self {
        self.latch = Some(latch);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .map(|(prompt, _)| prompt.clone())
            .collect()
    }
}

#[async_trait]
impl ImageGenerationService for MockImage {
    async fn generate_image(&self, prompt: &str, quality: QualityTier) -> PortResult<ImagePayload> {
        self.prompts
            .lock()
            .unwrap()
            .push((prompt.to_string(), quality));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        // Give any concurrent caller a chance to overlap.
        tokio::time::sleep(Duration::from_millis(5)).await;
        if let Some(latch) = &self.latch {
            latch.pass().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.respond)(prompt)
    }
}

pub fn png() -> ImagePayload {
    ImagePayload {
        mime_type: "image/png".to_string(),
        data: "iVBORw0KGgo=".to_string(),
    }
}

//=========================================================================================
// Chat
//=========================================================================================

pub struct MockChat {
    respond: Responder<String>,
    latch: Option<Latch>,
    pub histories: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockChat {
    pub fn new(respond: impl Fn(&str) -> PortResult<String> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            latch: None,
            histories: Mutex::new(Vec::new()),
        }
    }

    pub fn latched(mut self, latch: Latch) -> Self {
        self.latch = Some(latch);
        self
    }

    pub fn calls(&self) -> usize {
        self.histories.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatService for MockChat {
    async fn reply(&self, history: &[ChatMessage], message: &str) -> PortResult<String> {
        self.histories.lock().unwrap().push(history.to_vec());
        if let Some(latch) = &self.latch {
            latch.pass().await;
        }
        (self.respond)(message)
    }
}

//=========================================================================================
// Credential Host
//=========================================================================================

/// A host whose check always fails.
pub struct BrokenHost;

#[async_trait]
impl CredentialHost for BrokenHost {
    async fn has_selected_key(&self) -> PortResult<bool> {
        Err(storyboard_core::ports::PortError::Unexpected(
            "host bridge unavailable".to_string(),
        ))
    }

    async fn select_key(&self, _api_key: &str) -> PortResult<()> {
        Ok(())
    }
}

//=========================================================================================
// State Helpers
//=========================================================================================

pub fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        log_level: tracing::Level::INFO,
        cors_origin: "http://localhost:5173".to_string(),
        max_upload_bytes: 1024 * 1024,
        gemini_api_key: Some("test-key".to_string()),
        gemini_api_base: "http://127.0.0.1:9".to_string(),
        host_key_selection: false,
        analysis_model: "analysis".to_string(),
        chat_model: "chat".to_string(),
        image_model: "image".to_string(),
        image_model_hq: "image-hq".to_string(),
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub jobs: Option<mpsc::UnboundedReceiver<RenderJob>>,
    pub script: Arc<MockScript>,
    pub image: Arc<MockImage>,
    pub chat: Arc<MockChat>,
}

pub fn harness(
    script: MockScript,
    image: MockImage,
    chat: MockChat,
    host: Option<Arc<dyn CredentialHost>>,
) -> Harness {
    let script = Arc::new(script);
    let image = Arc::new(image);
    let chat = Arc::new(chat);
    let gateways = Gateways {
        script_adapter: script.clone(),
        image_adapter: image.clone(),
        chat_adapter: chat.clone(),
    };
    let (state, jobs) = AppState::new(Arc::new(test_config()), gateways, host);
    Harness {
        state: Arc::new(state),
        jobs: Some(jobs),
        script,
        image,
        chat,
    }
}

pub fn unused_script() -> MockScript {
    MockScript::new(|_| panic!("script analysis should not be called"))
}

pub fn unused_chat() -> MockChat {
    MockChat::new(|_| panic!("chat should not be called"))
}

pub fn draft(number: i64, prompt: &str) -> SceneDraft {
    SceneDraft {
        scene_number: number,
        description: format!("Scene {} happens.", number),
        visual_prompt: prompt.to_string(),
        setting: format!("INT. ROOM {} - DAY", number),
        dialogue: None,
    }
}

/// Replaces the scene collection directly and returns the new scenes.
pub async fn seed_scenes(state: &AppState, prompts: &[&str]) -> Vec<Scene> {
    let drafts = prompts
        .iter()
        .enumerate()
        .map(|(i, prompt)| draft(i as i64 + 1, prompt))
        .collect();
    let scenes = scenes_from_drafts(drafts, Utc::now());
    state
        .session
        .lock()
        .await
        .storyboard
        .replace_scenes(scenes.clone());
    scenes
}

/// Polls `check` against the session until it holds, failing after two seconds.
pub async fn wait_until<F>(state: &AppState, what: &str, check: F)
where
    F: Fn(&api_lib::web::state::SessionState) -> bool,
{
    for _ in 0..200 {
        if check(&*state.session.lock().await) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting until {}", what);
}
