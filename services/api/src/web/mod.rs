pub mod analysis_task;
pub mod chat_task;
pub mod gate;
pub mod middleware;
pub mod protocol;
pub mod render_task;
pub mod rest;
pub mod state;
pub mod ws_handler;

pub use middleware::require_access;
pub use ws_handler::ws_handler;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use rest::{
    analyze_handler, generate_all_handler, generate_scene_handler, get_access_handler,
    get_chat_handler, get_storyboard_handler, select_key_handler, send_chat_handler,
    update_quality_handler, update_script_handler, update_title_handler, upload_script_handler,
};
use state::AppState;
use std::sync::Arc;

/// Builds the API router. Gateway-backed routes sit behind the access gate;
/// everything else, including the gate's own routes, is always reachable.
pub fn router(app_state: Arc<AppState>) -> Router {
    let max_upload_bytes = app_state.config.max_upload_bytes;

    let public_routes = Router::new()
        .route("/storyboard", get(get_storyboard_handler))
        .route("/storyboard/title", put(update_title_handler))
        .route("/storyboard/quality", put(update_quality_handler))
        .route("/storyboard/script", put(update_script_handler))
        .route("/storyboard/script/upload", post(upload_script_handler))
        .route("/chat", get(get_chat_handler))
        .route("/access", get(get_access_handler))
        .route("/access/select-key", post(select_key_handler))
        .route("/ws", get(ws_handler));

    let gated_routes = Router::new()
        .route("/storyboard/analyze", post(analyze_handler))
        .route("/scenes/{scene_id}/generate", post(generate_scene_handler))
        .route("/scenes/generate-all", post(generate_all_handler))
        .route("/chat", post(send_chat_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_access,
        ));

    Router::new()
        .merge(public_routes)
        .merge(gated_routes)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(app_state)
}
