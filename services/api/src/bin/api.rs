//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        ApiKeySlot, GeminiClient, GeminiImageAdapter, GeminiScriptAdapter, OpenAiChatAdapter,
        SelectedKeyHost,
    },
    config::Config,
    error::ApiError,
    web::{
        gate::resolve_access,
        render_task::render_worker,
        rest::ApiDoc,
        router,
        state::{AppState, Gateways},
    },
};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use std::sync::Arc;
use storyboard_core::ports::CredentialHost;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize Service Adapters ---
    let key_slot = ApiKeySlot::new(config.gemini_api_key.clone());
    let http = reqwest::Client::builder().build()?;
    let gemini = GeminiClient::new(http, config.gemini_api_base.clone(), key_slot.clone());

    let gateways = Gateways {
        script_adapter: Arc::new(GeminiScriptAdapter::new(
            gemini.clone(),
            config.analysis_model.clone(),
        )),
        image_adapter: Arc::new(GeminiImageAdapter::new(
            gemini,
            config.image_model.clone(),
            config.image_model_hq.clone(),
        )),
        chat_adapter: Arc::new(OpenAiChatAdapter::new(
            format!("{}/v1beta/openai", config.gemini_api_base.trim_end_matches('/')),
            key_slot.clone(),
            config.chat_model.clone(),
        )),
    };

    let credential_host: Option<Arc<dyn CredentialHost>> = if config.host_key_selection {
        info!("Host key selection enabled; gateway actions wait for a selected key.");
        Some(Arc::new(SelectedKeyHost::new(key_slot)))
    } else {
        None
    };

    // --- 3. Build the Shared AppState & Start the Render Worker ---
    let (app_state, render_jobs) = AppState::new(config.clone(), gateways, credential_host);
    let app_state = Arc::new(app_state);

    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(render_worker(
        app_state.clone(),
        render_jobs,
        shutdown.clone(),
    ));

    resolve_access(&app_state).await;

    // --- 4. Create the Web Router ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received.");
            token.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = worker.await {
        tracing::error!("Render worker panicked: {:?}", e);
    }
    Ok(())
}
