//! services/api/src/web/gate.rs
//!
//! The access gate: decides whether gateway-backed actions are allowed, based on
//! the host environment's key selection capability.

use crate::web::{
    protocol::ServerMessage,
    state::{AppState, SessionState},
};
use storyboard_core::{domain::AccessState, ports::PortError};
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("This environment does not offer API key selection.")]
    SelectionUnavailable,
    #[error("Key selection failed: {0}")]
    Host(#[from] PortError),
}

/// Runs the startup check once and records the result.
///
/// With no host capability the gate is permissive. A host that fails to answer
/// is treated as having no key selected.
pub async fn resolve_access(app_state: &AppState) -> AccessState {
    let access = match &app_state.credential_host {
        None => AccessState::Granted,
        Some(host) => match host.has_selected_key().await {
            Ok(true) => AccessState::Granted,
            Ok(false) => AccessState::Denied,
            Err(e) => {
                error!("Failed to ask the host for a selected key: {:?}", e);
                AccessState::Denied
            }
        },
    };
    set_access(app_state, access).await;
    info!("Access gate resolved to {}.", access.as_str());
    access
}

/// Invokes the host's selection flow and then opens the gate without checking again.
pub async fn select_key(app_state: &AppState, api_key: &str) -> Result<AccessState, GateError> {
    let host = app_state
        .credential_host
        .as_ref()
        .ok_or(GateError::SelectionUnavailable)?;
    host.select_key(api_key).await?;
    set_access(app_state, AccessState::Granted).await;
    Ok(AccessState::Granted)
}

pub async fn current_access(app_state: &AppState) -> AccessState {
    app_state.session.lock().await.access
}

async fn set_access(app_state: &AppState, access: AccessState) {
    let mut session = app_state.session.lock().await;
    if session.access != access {
        session.access = access;
        app_state.publish(ServerMessage::AccessChanged {
            access: access.into(),
        });
    }
}

/// Closes the gate when a gateway failure says the selected key is no longer valid.
/// Called with the session lock already held by the task that saw the failure.
pub fn note_gateway_failure(app_state: &AppState, session: &mut SessionState, err: &PortError) {
    if !err.is_credential_failure() {
        return;
    }
    warn!("Gateway rejected the selected key; re-prompting for key selection.");
    if session.access != AccessState::Denied {
        session.access = AccessState::Denied;
        app_state.publish(ServerMessage::AccessChanged {
            access: AccessState::Denied.into(),
        });
    }
}
