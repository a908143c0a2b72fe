use std::sync::{Arc, RwLock};

use tracing::info;

use super::InferenceEngine;

/// Process-wide engine context passed to every request path.
///
/// Readers take a cheap [`Arc`] snapshot; a retrained engine replaces the
/// current one wholesale and in-flight calls finish on the snapshot they hold.
pub struct EngineHandle {
    current: RwLock<Arc<InferenceEngine>>,
}

impl EngineHandle {
    pub fn new(engine: InferenceEngine) -> Self {
        Self {
            current: RwLock::new(Arc::new(engine)),
        }
    }

    /// Snapshot of the active engine.
    pub fn get(&self) -> Arc<InferenceEngine> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Install `engine` and return the one it replaces.
    pub fn swap(&self, engine: InferenceEngine) -> Arc<InferenceEngine> {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = std::mem::replace(&mut *guard, Arc::new(engine));
        info!("swapped inference engine");
        previous
    }
}
