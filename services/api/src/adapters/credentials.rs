//! services/api/src/adapters/credentials.rs
//!
//! This module holds the process-wide API key slot shared by every gateway adapter,
//! and the adapter that implements the `CredentialHost` port on top of it.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use storyboard_core::ports::{CredentialHost, PortError, PortResult};
use tracing::info;

//=========================================================================================
// The Shared Key Slot
//=========================================================================================

/// The currently selected gateway API key.
///
/// Adapters read the slot on every call instead of caching a client, so a key
/// selected mid-session takes effect on the very next request.
#[derive(Clone, Debug, Default)]
pub struct ApiKeySlot {
    inner: Arc<RwLock<Option<String>>>,
}

impl ApiKeySlot {
    /// Creates a slot, optionally pre-filled with a key from the configuration.
    pub fn new(initial: Option<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Returns the selected key, if any.
    pub fn current(&self) -> Option<String> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns the selected key or `Unauthorized` when none is selected.
    pub fn require(&self) -> PortResult<String> {
        self.current().ok_or(PortError::Unauthorized)
    }

    pub fn set(&self, api_key: String) {
        match self.inner.write() {
            Ok(mut guard) => *guard = Some(api_key),
            Err(poisoned) => *poisoned.into_inner() = Some(api_key),
        }
    }
}

//=========================================================================================
// `CredentialHost` Trait Implementation
//=========================================================================================

/// A host whose key selection flow is driven by the browser: the user picks a
/// key on the access gate screen and it lands in the shared slot.
#[derive(Clone)]
pub struct SelectedKeyHost {
    slot: ApiKeySlot,
}

impl SelectedKeyHost {
    /// Creates a new `SelectedKeyHost` over the shared slot.
    pub fn new(slot: ApiKeySlot) -> Self {
        Self { slot }
    }
}

#[async_trait]
impl CredentialHost for SelectedKeyHost {
    async fn has_selected_key(&self) -> PortResult<bool> {
        Ok(self
            .slot
            .current()
            .is_some_and(|key| !key.trim().is_empty()))
    }

    async fn select_key(&self, api_key: &str) -> PortResult<()> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(PortError::Unexpected("An API key must not be empty.".to_string()));
        }
        self.slot.set(api_key.to_string());
        info!("A new API key was selected by the host.");
        Ok(())
    }
}
