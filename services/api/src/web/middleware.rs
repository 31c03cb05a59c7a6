//! services/api/src/web/middleware.rs
//!
//! Access gate middleware for protecting gateway-backed routes.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::web::{gate::current_access, state::AppState};

/// Middleware that refuses gateway-backed requests while the access gate is closed.
///
/// Only an explicit denial blocks. The browser is expected to show the key
/// selection screen on 403.
pub async fn require_access(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if current_access(&state).await.blocks() {
        warn!("Blocked {} {}: no API key selected.", req.method(), req.uri().path());
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(next.run(req).await)
}
