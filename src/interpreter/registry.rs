//! Module Registry
//!
//! Per-interpreter name -> module table: the set the rest of the import
//! system treats as "already loaded".

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::object::ModuleHandle;

/// Per-interpreter registry of loaded modules
pub struct ModuleRegistry {
    /// Loaded modules (qualified name -> module)
    modules: RwLock<HashMap<String, ModuleHandle>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, name: &str) -> Option<ModuleHandle> {
        self.modules.read().get(name).cloned()
    }

    /// Publish a module, returning the one it replaced
    pub fn insert(&self, name: impl Into<String>, module: ModuleHandle) -> Option<ModuleHandle> {
        self.modules.write().insert(name.into(), module)
    }

    /// Get the module registered under `name`, adding an empty one if
    /// there is none
    pub fn get_or_add(&self, name: &str) -> ModuleHandle {
        self.modules
            .write()
            .entry(name.to_string())
            .or_insert_with(|| ModuleHandle::new(name))
            .clone()
    }

    pub fn remove(&self, name: &str) -> Option<ModuleHandle> {
        self.modules.write().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }

    /// Remove every module, handing them back for teardown
    pub fn clear(&self) -> Vec<ModuleHandle> {
        self.modules.write().drain().map(|(_, m)| m).collect()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
