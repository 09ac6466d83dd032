// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend registry: one adapter instance per runtime row.
//!
//! Adapters are constructed lazily from the runtime's tagged options and
//! cached by runtime id. Tests install overrides to route a runtime onto a
//! fake backend.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use ta_backend::{backend_for, Backend};
use ta_core::{BackendHandle, RuntimeDef};

#[derive(Default)]
pub struct BackendRegistry {
    cache: Mutex<HashMap<String, Arc<dyn Backend>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The adapter for a runtime, constructing and caching it on first use.
    pub fn for_runtime(&self, def: &RuntimeDef) -> Arc<dyn Backend> {
        let mut cache = self.cache.lock();
        if let Some(backend) = cache.get(def.id.as_str()) {
            return Arc::clone(backend);
        }
        let backend = backend_for(&def.options);
        cache.insert(def.id.as_str().to_string(), Arc::clone(&backend));
        backend
    }

    /// The adapter that owns a checkpointed handle, for reconciliation.
    /// Falls back to matching backend kind when the runtime row is gone.
    pub fn for_handle(
        &self,
        handle: &BackendHandle,
        runtime: Option<&RuntimeDef>,
    ) -> Option<Arc<dyn Backend>> {
        if let Some(def) = runtime {
            if def.options.kind() == handle.kind() {
                return Some(self.for_runtime(def));
            }
        }
        None
    }

    /// Route a runtime id onto a specific adapter (tests use this to
    /// install fakes).
    pub fn install(&self, runtime_id: &str, backend: Arc<dyn Backend>) {
        self.cache.lock().insert(runtime_id.to_string(), backend);
    }

    pub fn evict(&self, runtime_id: &str) {
        self.cache.lock().remove(runtime_id);
    }
}
