//! Preview handles for processed images.
//!
//! A preview lets a display layer show the encoded image right away, before
//! the durable upload URL exists. Handles must be released by their owner;
//! once released the reference no longer resolves.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const PREVIEW_SCHEME: &str = "preview://";

/// Owned handle to a preview held in a [`PreviewStore`].
#[must_use = "preview handles must be released with PreviewStore::release"]
#[derive(Debug, PartialEq, Eq)]
pub struct PreviewHandle {
    id: Uuid,
    reference: String,
}

impl PreviewHandle {
    /// Reference string usable by a display layer, e.g. `preview://<uuid>`.
    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl fmt::Display for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference)
    }
}

#[derive(Clone, Default)]
pub struct PreviewStore {
    entries: Arc<Mutex<HashMap<Uuid, Arc<[u8]>>>>,
}

impl PreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<[u8]>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create(&self, data: Arc<[u8]>) -> PreviewHandle {
        let id = Uuid::new_v4();
        self.entries().insert(id, data);
        PreviewHandle {
            id,
            reference: format!("{}{}", PREVIEW_SCHEME, id),
        }
    }

    /// Looks up the bytes behind a preview reference while it is still live.
    pub fn resolve(&self, reference: &str) -> Option<Arc<[u8]>> {
        let id = reference
            .strip_prefix(PREVIEW_SCHEME)
            .and_then(|raw| Uuid::parse_str(raw).ok())?;
        self.entries().get(&id).cloned()
    }

    /// Invalidates the handle. Returns `false` if it was already gone.
    pub fn release(&self, handle: PreviewHandle) -> bool {
        self.entries().remove(&handle.id).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.entries().len()
    }
}

impl fmt::Debug for PreviewStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewStore")
            .field("live", &self.live_count())
            .finish()
    }
}
