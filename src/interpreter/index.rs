//! Module Index Table
//!
//! Per-interpreter array mapping a definition's permanent module index to
//! the live module built from it in this interpreter. Index 0 is never
//! assigned. The table grows lazily; slots beyond its end read as empty.

use parking_lot::RwLock;

use crate::error::{ImportError, ImportResult};
use crate::object::ModuleHandle;

pub struct ModuleIndexTable {
    slots: RwLock<Vec<Option<ModuleHandle>>>,
}

impl ModuleIndexTable {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
        }
    }

    /// Module stored at `index`, if any
    pub fn get(&self, index: usize) -> Option<ModuleHandle> {
        if index == 0 {
            return None;
        }
        self.slots.read().get(index).cloned().flatten()
    }

    /// Store `module` at `index`, growing the table as needed.
    ///
    /// Growth is fallible: on allocation failure nothing is changed.
    pub fn set(&self, index: usize, module: ModuleHandle) -> ImportResult<()> {
        if index == 0 {
            return Err(ImportError::InvalidModuleIndex { index });
        }

        let mut slots = self.slots.write();
        if slots.len() <= index {
            let additional = index + 1 - slots.len();
            slots
                .try_reserve(additional)
                .map_err(|_| ImportError::OutOfMemory {
                    context: "growing the module index table",
                })?;
            slots.resize(index + 1, None);
        }
        slots[index] = Some(module);
        Ok(())
    }

    /// Empty the slot at `index`
    pub fn clear(&self, index: usize) -> ImportResult<()> {
        let mut slots = self.slots.write();
        if index == 0 || index >= slots.len() {
            return Err(ImportError::InvalidModuleIndex { index });
        }
        slots[index] = None;
        Ok(())
    }

    /// Whether `index` currently holds a module
    pub fn is_occupied(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Current table length (highest index + 1)
    pub fn capacity(&self) -> usize {
        self.slots.read().len()
    }

    /// Drop every stored module
    pub fn clear_all(&self) -> Vec<ModuleHandle> {
        self.slots.write().drain(..).flatten().collect()
    }
}

impl Default for ModuleIndexTable {
    fn default() -> Self {
        Self::new()
    }
}
