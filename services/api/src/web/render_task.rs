//! services/api/src/web/render_task.rs
//!
//! Image generation for scenes: the two-phase single-scene flow and the
//! single-worker queue that runs "generate all" batches strictly in order.

use crate::web::{
    gate::note_gateway_failure,
    protocol::{SceneView, ServerMessage},
    state::AppState,
};
use std::sync::Arc;
use std::time::Instant;
use storyboard_core::{
    domain::{QualityTier, SceneStatus},
    ports::PortError,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

//=========================================================================================
// Single Scene Flow
//=========================================================================================

/// What the outbound request needs, captured when the scene entered `generating`.
#[derive(Debug, Clone)]
pub struct RenderTicket {
    pub scene_id: String,
    /// Only this attempt may settle the scene; a newer request supersedes it.
    pub attempt: u64,
    pub prompt: String,
    pub quality: QualityTier,
}

/// Phase one: moves the scene to `generating` and tells every client, before
/// any request is made. Returns `None` if the scene does not exist.
///
/// With `only_if_awaiting` set, scenes that are no longer pending or failed
/// are skipped; batches use this so they never redo finished work.
pub async fn start_render(
    app_state: &AppState,
    scene_id: &str,
    only_if_awaiting: bool,
) -> Option<(RenderTicket, SceneView)> {
    let mut session = app_state.session.lock().await;
    let quality = session.storyboard.quality;
    let scene = session.storyboard.scene_mut(scene_id)?;
    if only_if_awaiting && !scene.status().awaits_generation() {
        info!("Skipping scene {}, it is already {}.", scene_id, scene.status().as_str());
        return None;
    }

    let attempt = scene.begin_generation();
    let view = SceneView::from(&*scene);
    let ticket = RenderTicket {
        scene_id: scene.id.clone(),
        attempt,
        prompt: scene.visual_prompt.clone(),
        quality,
    };
    app_state.publish(ServerMessage::SceneUpdated {
        scene: view.clone(),
    });
    Some((ticket, view))
}

/// Phase two: calls the gateway and reconciles the scene with the outcome.
///
/// A result for a scene that was replaced by a re-analysis, or for an attempt
/// superseded by a newer request, is dropped.
pub async fn finish_render(app_state: &AppState, ticket: RenderTicket) -> Option<SceneStatus> {
    let start = Instant::now();
    let outcome = app_state
        .image_adapter
        .generate_image(&ticket.prompt, ticket.quality)
        .await
        .and_then(|payload| {
            payload
                .to_image_ref()
                .ok_or_else(|| PortError::MissingImage("the image gateway".to_string()))
        });
    info!(
        "Image generation for scene {} took {:?}",
        ticket.scene_id,
        start.elapsed()
    );

    let mut session = app_state.session.lock().await;
    if let Err(e) = &outcome {
        error!("Image generation for scene {} failed: {:?}", ticket.scene_id, e);
        note_gateway_failure(app_state, &mut session, e);
    }

    let Some(scene) = session.storyboard.scene_mut(&ticket.scene_id) else {
        warn!(
            "Scene {} no longer exists; dropping its generation result.",
            ticket.scene_id
        );
        return None;
    };

    let applied = match outcome {
        Ok(image) => scene.complete_generation(ticket.attempt, image),
        Err(e) => scene.fail_generation(ticket.attempt, e.to_string()),
    };
    if let Err(e) = applied {
        warn!("Dropping generation result: {}", e);
        return None;
    }

    let status = scene.status().clone();
    app_state.publish(ServerMessage::SceneUpdated {
        scene: SceneView::from(&*scene),
    });
    Some(status)
}

/// Runs both phases for one scene, awaiting the gateway.
pub async fn render_scene(
    app_state: &AppState,
    scene_id: &str,
    only_if_awaiting: bool,
) -> Option<SceneStatus> {
    let (ticket, _) = start_render(app_state, scene_id, only_if_awaiting).await?;
    finish_render(app_state, ticket).await
}

/// Starts a single-scene generation in the background and returns the scene as
/// it looks now, i.e. `generating`.
pub async fn spawn_render(app_state: &Arc<AppState>, scene_id: &str) -> Option<SceneView> {
    let (ticket, view) = start_render(app_state, scene_id, false).await?;
    let app_state = app_state.clone();
    tokio::spawn(async move {
        finish_render(&app_state, ticket).await;
    });
    Some(view)
}

//=========================================================================================
// Batch Queue (one worker)
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderJob {
    /// Scene ids in collection order.
    Batch(Vec<String>),
}

/// Sending half of the render queue. Jobs are consumed by exactly one worker.
#[derive(Clone)]
pub struct RenderQueue {
    sender: mpsc::UnboundedSender<RenderJob>,
}

impl RenderQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RenderJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Snapshots the pending and failed scenes in collection order and queues them.
    /// Returns the queued ids.
    pub async fn enqueue_awaiting(&self, app_state: &AppState) -> Vec<String> {
        let ids = app_state
            .session
            .lock()
            .await
            .storyboard
            .ids_awaiting_generation();
        if ids.is_empty() {
            return ids;
        }
        if self.sender.send(RenderJob::Batch(ids.clone())).is_err() {
            error!("Render worker is gone; batch of {} scenes was not queued.", ids.len());
            return Vec::new();
        }
        info!("Queued {} scenes for generation.", ids.len());
        ids
    }
}

/// The single render worker. Each scene of a batch is generated and settled
/// before the next one starts, and batches run one after another.
pub async fn render_worker(
    app_state: Arc<AppState>,
    mut jobs: mpsc::UnboundedReceiver<RenderJob>,
    cancellation_token: CancellationToken,
) {
    info!("Render worker started.");
    loop {
        let job = tokio::select! {
            _ = cancellation_token.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        match job {
            RenderJob::Batch(scene_ids) => {
                for scene_id in scene_ids {
                    if cancellation_token.is_cancelled() {
                        info!("Render worker cancelled mid-batch.");
                        return;
                    }
                    render_scene(&app_state, &scene_id, true).await;
                }
            }
        }
    }
    info!("Render worker stopped.");
}
