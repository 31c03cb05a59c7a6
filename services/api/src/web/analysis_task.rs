//! services/api/src/web/analysis_task.rs
//!
//! Turns the script in the editor into a fresh scene collection.

use crate::web::{
    gate::note_gateway_failure,
    protocol::{SceneView, ServerMessage},
    state::AppState,
};
use chrono::Utc;
use std::time::Instant;
use storyboard_core::{
    domain::{scenes_from_drafts, Scene},
    ports::PortError,
};
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Paste or upload a script before analyzing.")]
    BlankScript,
    #[error("A script analysis is already running.")]
    AlreadyRunning,
    #[error("{0}")]
    Gateway(#[from] PortError),
}

/// Analyzes `script` (or, when `None`, the script already in the editor) and
/// replaces the scene collection with the result.
///
/// Blank scripts never reach the gateway. On failure the previous collection is
/// left exactly as it was and the error becomes the banner.
pub async fn analyze_script(
    app_state: &AppState,
    script: Option<String>,
) -> Result<Vec<Scene>, AnalysisError> {
    let script = {
        let mut session = app_state.session.lock().await;
        let script = script.unwrap_or_else(|| session.script.clone());
        if script.trim().is_empty() {
            return Err(AnalysisError::BlankScript);
        }
        if session.storyboard.is_parsing {
            return Err(AnalysisError::AlreadyRunning);
        }
        if session.script != script {
            session.script = script.clone();
            app_state.publish(ServerMessage::ScriptChanged {
                script: script.clone(),
            });
        }
        session.storyboard.is_parsing = true;
        session.banner = None;
        app_state.publish(ServerMessage::ParsingStarted);
        script
    };

    let start = Instant::now();
    let result = app_state.script_adapter.analyze_script(&script).await;
    info!("Script analysis took {:?}", start.elapsed());

    let mut session = app_state.session.lock().await;
    session.storyboard.is_parsing = false;
    match result {
        Ok(drafts) => {
            let scenes = scenes_from_drafts(drafts, Utc::now());
            session.storyboard.replace_scenes(scenes.clone());
            app_state.publish(ServerMessage::ScenesReplaced {
                scenes: scenes.iter().map(SceneView::from).collect(),
            });
            info!("Storyboard now has {} scenes.", scenes.len());
            Ok(scenes)
        }
        Err(e) => {
            error!("Script analysis failed: {:?}", e);
            note_gateway_failure(app_state, &mut session, &e);
            let message = e.to_string();
            session.banner = Some(message.clone());
            app_state.publish(ServerMessage::AnalysisFailed { message });
            Err(AnalysisError::Gateway(e))
        }
    }
}
