//! Module objects.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};

use super::{GilRequirement, Member, ModuleDef, Namespace, StateSize, Value};
use crate::error::RaisedError;

struct ModuleObject {
    name: String,
    dict: RwLock<Namespace>,
    def: OnceCell<&'static ModuleDef>,
    /// Per-instance state. `None` until allocated.
    state: Mutex<Option<Vec<u8>>>,
    gil_used: AtomicBool,
}

/// Shared handle to a module object.
///
/// Equality is identity: two handles are equal only if they point at the
/// same module object.
#[derive(Clone)]
pub struct ModuleHandle(Arc<ModuleObject>);

impl ModuleHandle {
    /// Allocate an empty module with the standard dunder bindings
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut dict = Namespace::new();
        dict.set("__name__", name.as_str());
        dict.set("__doc__", Value::None);
        dict.set("__package__", Value::None);
        dict.set("__loader__", Value::None);
        dict.set("__spec__", Value::None);

        Self(Arc::new(ModuleObject {
            name,
            dict: RwLock::new(dict),
            def: OnceCell::new(),
            state: Mutex::new(None),
            gil_used: AtomicBool::new(true),
        }))
    }

    /// Allocate a module bound to `def`
    pub fn with_def(name: impl Into<String>, def: &'static ModuleDef) -> Self {
        let module = Self::new(name);
        module.attach_def(def);
        module
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The native definition this module was built from, if any
    pub fn def(&self) -> Option<&'static ModuleDef> {
        self.0.def.get().copied()
    }

    /// Bind the module to `def`. Returns false if it was already bound.
    pub fn attach_def(&self, def: &'static ModuleDef) -> bool {
        self.0.def.set(def).is_ok()
    }

    pub fn ptr_eq(&self, other: &ModuleHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn get(&self, attr: &str) -> Option<Value> {
        self.0.dict.read().get(attr).cloned()
    }

    pub fn set(&self, attr: impl Into<String>, value: impl Into<Value>) {
        self.0.dict.write().set(attr, value);
    }

    pub fn remove(&self, attr: &str) -> Option<Value> {
        self.0.dict.write().remove(attr)
    }

    pub fn contains(&self, attr: &str) -> bool {
        self.0.dict.read().contains(attr)
    }

    /// Snapshot of the module's top-level bindings
    pub fn namespace(&self) -> Namespace {
        self.0.dict.read().clone()
    }

    /// Run `f` with read access to the namespace
    pub fn with_namespace<R>(&self, f: impl FnOnce(&Namespace) -> R) -> R {
        f(&self.0.dict.read())
    }

    /// Copy `other` into the module namespace
    pub fn update_namespace(&self, other: &Namespace) {
        self.0.dict.write().update(other);
    }

    pub fn doc(&self) -> Option<String> {
        self.get("__doc__")
            .and_then(|v| v.as_str().map(|s| s.to_string()))
    }

    /// Add the definition's members and docstring to the namespace
    pub fn add_members(&self, def: &ModuleDef) {
        let mut dict = self.0.dict.write();
        for member in def.members() {
            match member {
                Member::Constant(name, value) => {
                    dict.set(*name, Value::from(*value));
                }
                Member::Function(func) => {
                    dict.set(func.name(), Value::Function(*func));
                }
            }
        }
        if let Some(doc) = def.doc() {
            dict.set("__doc__", doc);
        }
    }

    pub fn has_state(&self) -> bool {
        self.0.state.lock().is_some()
    }

    /// Allocate zeroed per-instance state if none exists yet. A definition
    /// without state gets an empty allocation so that the module still
    /// counts as executed.
    pub fn ensure_state(&self, size: StateSize) -> bool {
        let mut state = self.0.state.lock();
        if state.is_some() {
            return false;
        }
        let len = match size {
            StateSize::NoState => 0,
            StateSize::Bytes(n) => n,
        };
        *state = Some(vec![0; len]);
        true
    }

    /// Drop the per-instance state so the module counts as unexecuted again
    pub(crate) fn release_state(&self) {
        self.0.state.lock().take();
    }

    /// Run `f` against the per-instance state, if allocated
    pub fn with_state<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Option<R> {
        let mut state = self.0.state.lock();
        state.as_mut().map(|bytes| f(bytes))
    }

    pub fn gil_requirement(&self) -> GilRequirement {
        if self.0.gil_used.load(Ordering::Acquire) {
            GilRequirement::Used
        } else {
            GilRequirement::NotUsed
        }
    }

    /// Declare whether this module needs the global interpreter lock
    pub fn set_gil_requirement(&self, gil: GilRequirement) {
        self.0
            .gil_used
            .store(gil == GilRequirement::Used, Ordering::Release);
    }

    /// Call a native function bound in the module namespace
    pub fn call(&self, func: &str, args: &[Value]) -> Result<Value, RaisedError> {
        match self.get(func) {
            Some(Value::Function(f)) => f.call(self, args),
            Some(other) => Err(RaisedError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
            None => Err(RaisedError::attribute(format!(
                "module '{}' has no attribute '{}'",
                self.name(),
                func
            ))),
        }
    }
}

impl PartialEq for ModuleHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ModuleHandle {}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<module '{}'>", self.name())
    }
}
