//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{
    analysis_task::{analyze_script, AnalysisError},
    chat_task::{send_message, ChatError},
    gate::{current_access, select_key, GateError},
    protocol::{
        AccessView, ChatMessageView, QualityLevel, SceneView, ServerMessage, StoryboardSnapshot,
    },
    render_task::spawn_render,
    state::AppState,
};
use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_storyboard_handler,
        update_title_handler,
        update_quality_handler,
        update_script_handler,
        upload_script_handler,
        analyze_handler,
        generate_scene_handler,
        generate_all_handler,
        get_chat_handler,
        send_chat_handler,
        get_access_handler,
        select_key_handler,
    ),
    components(
        schemas(
            StoryboardSnapshot, SceneView, ChatMessageView, QualityLevel, AccessView,
            UpdateTitleRequest, UpdateQualityRequest, UpdateScriptRequest, UploadScriptResponse,
            AnalyzeRequest, AnalyzeResponse, GenerateAllResponse, ChatRequest, ChatResponse,
            ChatTranscriptResponse, SelectKeyRequest, AccessResponse,
        )
    ),
    tags(
        (name = "StoryFlow API", description = "API endpoints for the storyboard authoring tool.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct UpdateTitleRequest {
    pub title: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateQualityRequest {
    pub quality: QualityLevel,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateScriptRequest {
    pub script: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadScriptResponse {
    file_name: String,
    script: String,
}

/// Leave `script` out to analyze what is already in the editor.
#[derive(Deserialize, ToSchema, Default)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub script: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AnalyzeResponse {
    scenes: Vec<SceneView>,
}

#[derive(Serialize, ToSchema)]
pub struct GenerateAllResponse {
    /// Scene ids in the order they will be generated.
    queued: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ChatResponse {
    reply: ChatMessageView,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatTranscriptResponse {
    messages: Vec<ChatMessageView>,
    awaiting_reply: bool,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectKeyRequest {
    pub api_key: String,
}

#[derive(Serialize, ToSchema)]
pub struct AccessResponse {
    access: AccessView,
}

//=========================================================================================
// Storyboard Handlers
//=========================================================================================

/// Return the whole storyboard session.
#[utoipa::path(
    get,
    path = "/storyboard",
    responses((status = 200, description = "Current session state", body = StoryboardSnapshot))
)]
pub async fn get_storyboard_handler(State(app_state): State<Arc<AppState>>) -> Json<StoryboardSnapshot> {
    let session = app_state.session.lock().await;
    Json(StoryboardSnapshot::from(&*session))
}

/// Rename the storyboard.
#[utoipa::path(
    put,
    path = "/storyboard/title",
    request_body = UpdateTitleRequest,
    responses(
        (status = 204, description = "Title updated"),
        (status = 400, description = "Title is blank")
    )
)]
pub async fn update_title_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<UpdateTitleRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Title must not be blank".to_string()));
    }
    let mut session = app_state.session.lock().await;
    session.storyboard.title = title.clone();
    app_state.publish(ServerMessage::TitleChanged { title });
    Ok(StatusCode::NO_CONTENT)
}

/// Select the image quality tier for subsequent generations.
#[utoipa::path(
    put,
    path = "/storyboard/quality",
    request_body = UpdateQualityRequest,
    responses((status = 204, description = "Quality tier updated"))
)]
pub async fn update_quality_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<UpdateQualityRequest>,
) -> StatusCode {
    set_quality(&app_state, req.quality).await;
    StatusCode::NO_CONTENT
}

pub(crate) async fn set_quality(app_state: &AppState, quality: QualityLevel) {
    let mut session = app_state.session.lock().await;
    session.storyboard.quality = quality.into();
    app_state.publish(ServerMessage::QualityChanged { quality });
}

/// Replace the script editor contents.
#[utoipa::path(
    put,
    path = "/storyboard/script",
    request_body = UpdateScriptRequest,
    responses((status = 204, description = "Script updated"))
)]
pub async fn update_script_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<UpdateScriptRequest>,
) -> StatusCode {
    let mut session = app_state.session.lock().await;
    session.script = req.script.clone();
    app_state.publish(ServerMessage::ScriptChanged { script: req.script });
    StatusCode::NO_CONTENT
}

/// Load a script file into the editor.
///
/// Accepts a multipart/form-data request with a single file part. The bytes are
/// read as text without any format validation.
#[utoipa::path(
    post,
    path = "/storyboard/script/upload",
    request_body(content_type = "multipart/form-data", description = "The script file to load."),
    responses(
        (status = 200, description = "Script loaded into the editor", body = UploadScriptResponse),
        (status = 400, description = "No file in the request")
    )
)]
pub async fn upload_script_handler(
    State(app_state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read multipart data: {}", e),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "Multipart form must include a file".to_string(),
            )
        })?;

    let file_name = field.file_name().unwrap_or("script.txt").to_string();
    let data = field.bytes().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read file bytes: {}", e),
        )
    })?;
    let script = String::from_utf8_lossy(&data).into_owned();
    info!("Loaded script file '{}' ({} bytes).", file_name, data.len());

    let mut session = app_state.session.lock().await;
    session.script = script.clone();
    app_state.publish(ServerMessage::ScriptChanged {
        script: script.clone(),
    });

    Ok(Json(UploadScriptResponse { file_name, script }))
}

/// Break the script into scenes, replacing the current collection.
#[utoipa::path(
    post,
    path = "/storyboard/analyze",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Scenes replaced", body = AnalyzeResponse),
        (status = 400, description = "Script is blank"),
        (status = 403, description = "No API key selected"),
        (status = 409, description = "An analysis is already running"),
        (status = 502, description = "The AI gateway failed or returned an invalid format")
    )
)]
pub async fn analyze_handler(
    State(app_state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AnalyzeResponse>, (StatusCode, String)> {
    // An empty body analyzes the editor contents.
    let req = if body.is_empty() {
        AnalyzeRequest::default()
    } else {
        serde_json::from_slice::<AnalyzeRequest>(&body)
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e)))?
    };
    match analyze_script(&app_state, req.script).await {
        Ok(scenes) => Ok(Json(AnalyzeResponse {
            scenes: scenes.iter().map(SceneView::from).collect(),
        })),
        Err(e @ AnalysisError::BlankScript) => Err((StatusCode::BAD_REQUEST, e.to_string())),
        Err(e @ AnalysisError::AlreadyRunning) => Err((StatusCode::CONFLICT, e.to_string())),
        Err(AnalysisError::Gateway(e)) => Err((StatusCode::BAD_GATEWAY, e.to_string())),
    }
}

//=========================================================================================
// Scene Generation Handlers
//=========================================================================================

/// Generate (or regenerate) the frame for one scene.
///
/// Returns as soon as the scene is `generating`; the result arrives over the
/// WebSocket and in later snapshots.
#[utoipa::path(
    post,
    path = "/scenes/{scene_id}/generate",
    params(("scene_id" = String, Path, description = "The scene to generate a frame for.")),
    responses(
        (status = 202, description = "Generation started", body = SceneView),
        (status = 403, description = "No API key selected"),
        (status = 404, description = "Unknown scene")
    )
)]
pub async fn generate_scene_handler(
    State(app_state): State<Arc<AppState>>,
    Path(scene_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match spawn_render(&app_state, &scene_id).await {
        Some(view) => Ok((StatusCode::ACCEPTED, Json(view))),
        None => Err((StatusCode::NOT_FOUND, format!("No scene with id {}", scene_id))),
    }
}

/// Queue every pending or failed scene, in order, on the single render worker.
#[utoipa::path(
    post,
    path = "/scenes/generate-all",
    responses(
        (status = 202, description = "Scenes queued", body = GenerateAllResponse),
        (status = 403, description = "No API key selected")
    )
)]
pub async fn generate_all_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let queued = app_state.render_queue.enqueue_awaiting(&app_state).await;
    (StatusCode::ACCEPTED, Json(GenerateAllResponse { queued }))
}

//=========================================================================================
// Chat Handlers
//=========================================================================================

/// Return the assistant transcript.
#[utoipa::path(
    get,
    path = "/chat",
    responses((status = 200, description = "Transcript so far", body = ChatTranscriptResponse))
)]
pub async fn get_chat_handler(State(app_state): State<Arc<AppState>>) -> Json<ChatTranscriptResponse> {
    let session = app_state.session.lock().await;
    Json(ChatTranscriptResponse {
        messages: session
            .transcript
            .messages()
            .iter()
            .map(ChatMessageView::from)
            .collect(),
        awaiting_reply: session.awaiting_reply,
    })
}

/// Ask the director's assistant.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "The assistant's reply", body = ChatResponse),
        (status = 400, description = "Message is blank"),
        (status = 403, description = "No API key selected"),
        (status = 409, description = "A reply is still pending")
    )
)]
pub async fn send_chat_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    match send_message(&app_state, req.message).await {
        Ok(reply) => Ok(Json(ChatResponse {
            reply: ChatMessageView::from(&reply),
        })),
        Err(e @ ChatError::BlankMessage) => Err((StatusCode::BAD_REQUEST, e.to_string())),
        Err(e @ ChatError::ReplyPending) => Err((StatusCode::CONFLICT, e.to_string())),
    }
}

//=========================================================================================
// Access Gate Handlers
//=========================================================================================

/// Report whether gateway-backed actions are currently allowed.
#[utoipa::path(
    get,
    path = "/access",
    responses((status = 200, description = "Current gate state", body = AccessResponse))
)]
pub async fn get_access_handler(State(app_state): State<Arc<AppState>>) -> Json<AccessResponse> {
    Json(AccessResponse {
        access: current_access(&app_state).await.into(),
    })
}

/// Select an API key through the host and open the gate.
#[utoipa::path(
    post,
    path = "/access/select-key",
    request_body = SelectKeyRequest,
    responses(
        (status = 200, description = "Key selected, gate open", body = AccessResponse),
        (status = 409, description = "The host offers no key selection"),
        (status = 502, description = "The host's selection flow failed")
    )
)]
pub async fn select_key_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<SelectKeyRequest>,
) -> Result<Json<AccessResponse>, (StatusCode, String)> {
    match select_key(&app_state, &req.api_key).await {
        Ok(access) => Ok(Json(AccessResponse {
            access: access.into(),
        })),
        Err(e @ GateError::SelectionUnavailable) => Err((StatusCode::CONFLICT, e.to_string())),
        Err(e @ GateError::Host(_)) => {
            error!("Key selection failed: {:?}", e);
            Err((StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}
