//! Static module definitions.
//!
//! A [`ModuleDef`] is what an extension hands the loader: its name, doc,
//! per-instance state size, exported members and (for multi-phase modules)
//! construction slots. Definitions live in `static` items and are built with
//! `const` builder methods:
//!
//! ```ignore
//! static SPAM: ModuleDef = ModuleDef::new("spam")
//!     .with_doc("The spam module")
//!     .with_state(StateSize::Bytes(8))
//!     .with_members(&SPAM_MEMBERS);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{const_mutex, Mutex};

use super::{ModuleHandle, Namespace, NativeFunction, Value};
use crate::error::RaisedError;
use crate::extensions::ModuleSpec;
use crate::ffi::RawInitFn;

/// Process-wide module index counter. Index 0 means "not assigned".
static NEXT_MODULE_INDEX: AtomicUsize = AtomicUsize::new(1);

/// Per-instance state size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSize {
    /// No per-instance state; single-phase modules of this kind are
    /// reloaded from a namespace snapshot.
    NoState,
    /// Zeroed state of this many bytes; single-phase modules of this kind
    /// are reloaded by calling their init function again.
    Bytes(usize),
}

/// Whether a module needs the global interpreter lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GilRequirement {
    #[default]
    Used,
    NotUsed,
}

/// Declared multiple-interpreter support of a multi-phase module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultiInterpSupport {
    NotSupported,
    /// Supported in interpreters that share the main interpreter's GIL
    #[default]
    Supported,
    PerInterpreterGil,
}

/// A constant exported as a module member
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'static str),
}

impl From<Constant> for Value {
    fn from(c: Constant) -> Self {
        match c {
            Constant::None => Value::None,
            Constant::Bool(b) => Value::Bool(b),
            Constant::Int(i) => Value::Int(i),
            Constant::Float(f) => Value::Float(f),
            Constant::Str(s) => Value::Str(s.to_string()),
        }
    }
}

/// An exported member
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Member {
    Constant(&'static str, Constant),
    Function(NativeFunction),
}

/// Custom module allocation step of a multi-phase module
pub type CreateFn = fn(&ModuleSpec, &'static ModuleDef) -> Result<ModuleHandle, RaisedError>;

/// Execution step of a multi-phase module
pub type ExecFn = fn(&ModuleHandle) -> Result<(), RaisedError>;

/// Multi-phase construction slot
#[derive(Clone, Copy)]
pub enum Slot {
    Create(CreateFn),
    Exec(ExecFn),
    MultipleInterpreters(MultiInterpSupport),
    Gil(GilRequirement),
}

/// Fields the loader writes back onto a definition.
pub(crate) struct DefBase {
    index: AtomicUsize,
    initialized: AtomicBool,
    reinit: Mutex<Option<RawInitFn>>,
    snapshot: Mutex<Option<Arc<Namespace>>>,
}

impl DefBase {
    const fn new() -> Self {
        Self {
            index: AtomicUsize::new(0),
            initialized: AtomicBool::new(false),
            reinit: const_mutex(None),
            snapshot: const_mutex(None),
        }
    }

    pub(crate) fn reinit(&self) -> Option<RawInitFn> {
        *self.reinit.lock()
    }

    pub(crate) fn snapshot(&self) -> Option<Arc<Namespace>> {
        self.snapshot.lock().clone()
    }

    pub(crate) fn store(&self, reinit: Option<RawInitFn>, snapshot: Option<Arc<Namespace>>) {
        *self.reinit.lock() = reinit;
        *self.snapshot.lock() = snapshot;
    }

    /// Drop the reinit function and snapshot. The index is kept.
    pub(crate) fn clear_transient(&self) {
        *self.reinit.lock() = None;
        *self.snapshot.lock() = None;
    }
}

/// A native module definition
pub struct ModuleDef {
    name: &'static str,
    doc: Option<&'static str>,
    state_size: StateSize,
    members: &'static [Member],
    slots: &'static [Slot],
    base: DefBase,
}

impl ModuleDef {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            doc: None,
            state_size: StateSize::NoState,
            members: &[],
            slots: &[],
            base: DefBase::new(),
        }
    }

    pub const fn with_doc(mut self, doc: &'static str) -> Self {
        self.doc = Some(doc);
        self
    }

    pub const fn with_state(mut self, state_size: StateSize) -> Self {
        self.state_size = state_size;
        self
    }

    pub const fn with_members(mut self, members: &'static [Member]) -> Self {
        self.members = members;
        self
    }

    pub const fn with_slots(mut self, slots: &'static [Slot]) -> Self {
        self.slots = slots;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn doc(&self) -> Option<&'static str> {
        self.doc
    }

    pub fn state_size(&self) -> StateSize {
        self.state_size
    }

    pub fn members(&self) -> &'static [Member] {
        self.members
    }

    pub fn slots(&self) -> &'static [Slot] {
        self.slots
    }

    /// Definitions with slots are built with the multi-phase protocol
    pub fn is_multi_phase(&self) -> bool {
        !self.slots.is_empty()
    }

    /// Mark the definition ready for use and assign its module index.
    ///
    /// Multi-phase init functions return `def.init()`; returning a definition
    /// that was never initialized is reported as a malformed result.
    pub fn init(&'static self) -> &'static ModuleDef {
        if self.base.index.load(Ordering::Acquire) == 0 {
            let next = NEXT_MODULE_INDEX.fetch_add(1, Ordering::Relaxed);
            // Two threads racing here keep the first index.
            let _ = self.base.index.compare_exchange(
                0,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
        self.base.initialized.store(true, Ordering::Release);
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.base.initialized.load(Ordering::Acquire)
    }

    /// The permanent module index, once assigned
    pub fn index(&self) -> Option<usize> {
        match self.base.index.load(Ordering::Acquire) {
            0 => None,
            index => Some(index),
        }
    }

    pub(crate) fn base(&self) -> &DefBase {
        &self.base
    }

    /// Whether the extension cache recorded a reinit function here
    pub fn has_reinit(&self) -> bool {
        self.base.reinit().is_some()
    }

    /// Namespace snapshot the extension cache recorded here
    pub fn cached_snapshot(&self) -> Option<Arc<Namespace>> {
        self.base.snapshot()
    }

    pub fn create_slot(&self) -> Option<CreateFn> {
        self.slots.iter().find_map(|slot| match slot {
            Slot::Create(f) => Some(*f),
            _ => None,
        })
    }

    pub fn exec_slots(&self) -> impl Iterator<Item = ExecFn> + '_ {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Exec(f) => Some(*f),
            _ => None,
        })
    }

    /// Declared GIL requirement; modules that say nothing need the GIL
    pub fn gil_slot(&self) -> GilRequirement {
        self.slots
            .iter()
            .find_map(|slot| match slot {
                Slot::Gil(gil) => Some(*gil),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn multi_interp_slot(&self) -> MultiInterpSupport {
        self.slots
            .iter()
            .find_map(|slot| match slot {
                Slot::MultipleInterpreters(support) => Some(*support),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Reject slot tables that repeat a one-shot slot
    pub fn validate_slots(&self) -> Result<(), String> {
        let mut create = 0;
        let mut multi_interp = 0;
        let mut gil = 0;
        for slot in self.slots {
            match slot {
                Slot::Create(_) => create += 1,
                Slot::MultipleInterpreters(_) => multi_interp += 1,
                Slot::Gil(_) => gil += 1,
                Slot::Exec(_) => {}
            }
        }
        if create > 1 {
            return Err("has multiple create slots".to_string());
        }
        if multi_interp > 1 {
            return Err("has more than one 'multiple interpreters' slot".to_string());
        }
        if gil > 1 {
            return Err("has more than one 'gil' slot".to_string());
        }
        Ok(())
    }
}

impl std::fmt::Debug for ModuleDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDef")
            .field("name", &self.name)
            .field("state_size", &self.state_size)
            .field("index", &self.index())
            .field("multi_phase", &self.is_multi_phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_exec(_module: &ModuleHandle) -> Result<(), RaisedError> {
        Ok(())
    }

    static PLAIN: ModuleDef = ModuleDef::new("plain").with_doc("Plain module");

    static DOUBLE_GIL_SLOTS: [Slot; 2] = [
        Slot::Gil(GilRequirement::NotUsed),
        Slot::Gil(GilRequirement::Used),
    ];
    static DOUBLE_GIL: ModuleDef = ModuleDef::new("double_gil").with_slots(&DOUBLE_GIL_SLOTS);

    static PHASED_SLOTS: [Slot; 3] = [
        Slot::Exec(noop_exec),
        Slot::Exec(noop_exec),
        Slot::MultipleInterpreters(MultiInterpSupport::PerInterpreterGil),
    ];
    static PHASED: ModuleDef = ModuleDef::new("phased").with_slots(&PHASED_SLOTS);

    #[test]
    fn test_init_assigns_index_once() {
        let index = PLAIN.init().index().unwrap();
        assert!(index > 0);
        assert_eq!(PLAIN.init().index(), Some(index));
        assert!(PLAIN.is_initialized());
    }

    #[test]
    fn test_slot_queries() {
        assert!(PHASED.is_multi_phase());
        assert!(!PLAIN.is_multi_phase());
        assert_eq!(PHASED.exec_slots().count(), 2);
        assert!(PHASED.create_slot().is_none());
        assert_eq!(PHASED.gil_slot(), GilRequirement::Used);
        assert_eq!(
            PHASED.multi_interp_slot(),
            MultiInterpSupport::PerInterpreterGil
        );
        assert!(PHASED.validate_slots().is_ok());
    }

    #[test]
    fn test_duplicate_slots_rejected() {
        assert_eq!(
            DOUBLE_GIL.validate_slots(),
            Err("has more than one 'gil' slot".to_string())
        );
    }

    #[test]
    fn test_clear_transient_keeps_index() {
        let index = PLAIN.init().index();
        PLAIN
            .base()
            .store(None, Some(Arc::new(Namespace::new())));
        assert!(PLAIN.base().snapshot().is_some());
        PLAIN.base().clear_transient();
        assert!(PLAIN.base().snapshot().is_none());
        assert_eq!(PLAIN.index(), index);
    }
}
