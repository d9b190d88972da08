//! Extension Cache
//!
//! Process-wide table of every single-phase module that was ever loaded
//! successfully, keyed by `(origin_path, name)`. Multi-phase modules never
//! appear here.
//!
//! One mutex guards the table. It is held only for the table operation
//! itself, never while native code runs.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::OriginKind;
use crate::error::{ImportError, ImportResult};
use crate::ffi::RawInitFn;
use crate::object::{GilRequirement, ModuleDef, Namespace, StateSize};

type CacheKey = (String, String);

/// How a cached module is rebuilt for a new import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadStrategy {
    /// Copy the captured namespace snapshot into a fresh module
    Snapshot,
    /// Call the init function again
    Reinit,
    /// Copy the interpreter's own core namespace
    Core,
}

/// Everything needed to serve a later import of a single-phase module
pub struct CachedExtensionValue {
    def: &'static ModuleDef,
    reinit: Option<RawInitFn>,
    index: usize,
    snapshot: Option<Arc<Namespace>>,
    origin: OriginKind,
    gil: GilRequirement,
}

impl CachedExtensionValue {
    /// Cache value for a stateful module, reloaded through `reinit`
    pub fn stateful(
        def: &'static ModuleDef,
        reinit: RawInitFn,
        origin: OriginKind,
        gil: GilRequirement,
    ) -> ImportResult<Self> {
        Self::build(def, Some(reinit), None, origin, gil)
    }

    /// Cache value for a stateless module, reloaded from `snapshot`
    pub fn stateless(
        def: &'static ModuleDef,
        snapshot: Namespace,
        origin: OriginKind,
        gil: GilRequirement,
    ) -> ImportResult<Self> {
        Self::build(def, None, Some(Arc::new(snapshot)), origin, gil)
    }

    /// Cache value for a core module; its namespace lives with each
    /// interpreter instead
    pub fn core(def: &'static ModuleDef) -> ImportResult<Self> {
        Self::build(def, None, None, OriginKind::Core, GilRequirement::Used)
    }

    fn build(
        def: &'static ModuleDef,
        reinit: Option<RawInitFn>,
        snapshot: Option<Arc<Namespace>>,
        origin: OriginKind,
        gil: GilRequirement,
    ) -> ImportResult<Self> {
        let index = def
            .index()
            .ok_or(ImportError::InvalidModuleIndex { index: 0 })?;
        if def.is_multi_phase() {
            return Err(ImportError::InvalidDefinition {
                name: def.name().to_string(),
                reason: "multi-phase definitions are never cached".to_string(),
            });
        }
        let stateless = def.state_size() == StateSize::NoState;
        if reinit.is_some() && stateless {
            return Err(ImportError::InvalidDefinition {
                name: def.name().to_string(),
                reason: "stateless modules are reloaded from a snapshot".to_string(),
            });
        }
        if snapshot.is_some() && !stateless {
            return Err(ImportError::InvalidDefinition {
                name: def.name().to_string(),
                reason: "stateful modules are reloaded through their init function".to_string(),
            });
        }
        Ok(Self {
            def,
            reinit,
            index,
            snapshot,
            origin,
            gil,
        })
    }

    pub fn def(&self) -> &'static ModuleDef {
        self.def
    }

    pub fn reinit(&self) -> Option<RawInitFn> {
        self.reinit
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn snapshot(&self) -> Option<&Arc<Namespace>> {
        self.snapshot.as_ref()
    }

    pub fn origin(&self) -> OriginKind {
        self.origin
    }

    pub fn gil(&self) -> GilRequirement {
        self.gil
    }

    pub fn strategy(&self) -> ReloadStrategy {
        if self.origin == OriginKind::Core {
            ReloadStrategy::Core
        } else if self.reinit.is_some() {
            ReloadStrategy::Reinit
        } else {
            ReloadStrategy::Snapshot
        }
    }
}

impl std::fmt::Debug for CachedExtensionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedExtensionValue")
            .field("def", &self.def.name())
            .field("index", &self.index)
            .field("origin", &self.origin)
            .field("strategy", &self.strategy())
            .field("gil", &self.gil)
            .finish()
    }
}

/// The process-wide extension cache
pub struct ExtensionCache {
    entries: Mutex<HashMap<CacheKey, Arc<CachedExtensionValue>>>,
}

impl ExtensionCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, path: &str, name: &str) -> Option<Arc<CachedExtensionValue>> {
        self.entries
            .lock()
            .get(&(path.to_string(), name.to_string()))
            .cloned()
    }

    /// Insert `value` unless the key is already present.
    ///
    /// Returns whichever value the table holds afterwards. A winning insert
    /// also records the reinit function and snapshot on the definition
    /// before the table lock is released.
    pub fn insert(
        &self,
        path: &str,
        name: &str,
        value: CachedExtensionValue,
    ) -> ImportResult<Arc<CachedExtensionValue>> {
        let key = (path.to_string(), name.to_string());
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&key) {
            debug!(module = name, path, "extension already cached");
            return Ok(Arc::clone(existing));
        }

        entries.try_reserve(1).map_err(|_| ImportError::OutOfMemory {
            context: "growing the extension cache",
        })?;

        let value = Arc::new(value);
        value
            .def
            .base()
            .store(value.reinit, value.snapshot.clone());
        entries.insert(key, Arc::clone(&value));
        debug!(module = name, path, index = value.index, "cached extension");
        Ok(value)
    }

    /// Remove an entry, dropping the transient fields it wrote onto its
    /// definition
    pub fn delete(&self, path: &str, name: &str) -> Option<Arc<CachedExtensionValue>> {
        let removed = self
            .entries
            .lock()
            .remove(&(path.to_string(), name.to_string()))?;
        removed.def.base().clear_transient();
        Some(removed)
    }

    /// Remove every entry
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        for value in entries.values() {
            value.def.base().clear_transient();
        }
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Cached keys as `(path, name)`, sorted
    pub fn keys(&self) -> Vec<(String, String)> {
        let mut keys: Vec<CacheKey> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for ExtensionCache {
    fn default() -> Self {
        Self::new()
    }
}
