//! Interpreters
//!
//! An [`Interpreter`] owns the per-interpreter import state: the module
//! registry, the module index table and the import lock. Interpreters are
//! passed around explicitly as `Arc<Interpreter>`; there is no implicit
//! "current interpreter". Interpreter 0 is the main interpreter.

mod index;
mod lock;
mod registry;
mod switcher;

pub use index::ModuleIndexTable;
pub use lock::{ImportLock, ImportLockGuard};
pub use registry::ModuleRegistry;
pub use switcher::{ActiveInterpreter, InterpreterSwitcher, ThreadState};

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicI8, AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ImportError, ImportResult};
use crate::ffi::default_dlopen_flags;
use crate::object::{ModuleDef, ModuleHandle, Namespace};

/// Debug/test override of a boolean setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriState {
    ForceOff,
    #[default]
    Inherit,
    ForceOn,
}

impl TriState {
    fn to_raw(self) -> i8 {
        match self {
            TriState::ForceOff => -1,
            TriState::Inherit => 0,
            TriState::ForceOn => 1,
        }
    }

    fn from_raw(raw: i8) -> Self {
        match raw.signum() {
            -1 => TriState::ForceOff,
            1 => TriState::ForceOn,
            _ => TriState::Inherit,
        }
    }

    /// Resolve against the setting's configured value
    pub fn resolve(self, configured: bool) -> bool {
        match self {
            TriState::ForceOff => false,
            TriState::Inherit => configured,
            TriState::ForceOn => true,
        }
    }
}

impl From<i8> for TriState {
    fn from(raw: i8) -> Self {
        Self::from_raw(raw)
    }
}

/// Outcome of the legacy-extension compatibility check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The interpreter accepts legacy extensions
    Allowed,
    /// The check was switched off by override
    AllowedByOverride,
    /// The check was forced on by override
    DeniedByOverride,
    /// The interpreter's own config enforces the check
    DeniedByPolicy,
}

impl GateDecision {
    pub fn is_denied(self) -> bool {
        matches!(
            self,
            GateDecision::DeniedByOverride | GateDecision::DeniedByPolicy
        )
    }
}

/// Per-interpreter configuration, fixed at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Whether the standard and test frozen sets are enabled
    pub use_frozen_modules: bool,
    /// Refuse legacy extensions not verified safe for multiple interpreters
    pub check_multi_interp_extensions: bool,
    /// Whether the interpreter runs under its own GIL
    pub own_gil: bool,
    /// Flags passed to `dlopen`
    pub dlopen_flags: i32,
    /// Log cache reuse at info level
    pub verbose: bool,
}

impl InterpreterConfig {
    /// Configuration of the main interpreter
    pub fn main() -> Self {
        Self {
            use_frozen_modules: true,
            check_multi_interp_extensions: false,
            own_gil: false,
            dlopen_flags: default_dlopen_flags(),
            verbose: false,
        }
    }

    /// An isolated subinterpreter: own GIL, legacy extensions refused
    pub fn isolated() -> Self {
        Self {
            check_multi_interp_extensions: true,
            own_gil: true,
            ..Self::main()
        }
    }

    /// A subinterpreter sharing the main GIL that accepts legacy extensions
    pub fn legacy() -> Self {
        Self::main()
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self::main()
    }
}

/// One interpreter instance
pub struct Interpreter {
    id: u64,
    config: InterpreterConfig,
    free_threaded: bool,
    modules: ModuleRegistry,
    modules_by_index: ModuleIndexTable,
    import_lock: ImportLock,
    override_frozen_modules: AtomicI8,
    override_multi_interp_check: AtomicI8,
    dlopen_flags: AtomicI32,
    /// Private copies of core module namespaces (`sys`, `builtins`)
    core_namespaces: RwLock<HashMap<String, Namespace>>,
    thread_states: AtomicUsize,
}

impl Interpreter {
    pub(crate) fn new(id: u64, config: InterpreterConfig, free_threaded: bool) -> Self {
        let dlopen_flags = config.dlopen_flags;
        Self {
            id,
            config,
            free_threaded,
            modules: ModuleRegistry::new(),
            modules_by_index: ModuleIndexTable::new(),
            import_lock: ImportLock::new(),
            override_frozen_modules: AtomicI8::new(0),
            override_multi_interp_check: AtomicI8::new(0),
            dlopen_flags: AtomicI32::new(dlopen_flags),
            core_namespaces: RwLock::new(HashMap::new()),
            thread_states: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_main(&self) -> bool {
        self.id == 0
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn modules_by_index(&self) -> &ModuleIndexTable {
        &self.modules_by_index
    }

    pub fn import_lock(&self) -> &ImportLock {
        &self.import_lock
    }

    /// Module built from `def` in this interpreter, looked up by index.
    ///
    /// Multi-phase definitions are never tracked by index.
    pub fn find_module(&self, def: &'static ModuleDef) -> Option<ModuleHandle> {
        if def.is_multi_phase() {
            return None;
        }
        self.modules_by_index.get(def.index()?)
    }

    /// Record `module` as the module for `def` in this interpreter
    pub fn add_module(&self, module: &ModuleHandle, def: &'static ModuleDef) -> ImportResult<()> {
        if def.is_multi_phase() {
            return Err(ImportError::InvalidDefinition {
                name: def.name().to_string(),
                reason: "add_module called on module with slots".to_string(),
            });
        }
        let missing = ImportError::InvalidModuleIndex { index: 0 };
        let index = def.index().ok_or(missing)?;
        if self.modules_by_index.get(index).as_ref() == Some(module) {
            return Err(ImportError::InvalidDefinition {
                name: def.name().to_string(),
                reason: "module already added".to_string(),
            });
        }
        self.modules_by_index.set(index, module.clone())
    }

    /// Forget the module recorded for `def`
    pub fn remove_module(&self, def: &'static ModuleDef) -> ImportResult<()> {
        if def.is_multi_phase() {
            return Err(ImportError::InvalidDefinition {
                name: def.name().to_string(),
                reason: "remove_module called on module with slots".to_string(),
            });
        }
        let missing = ImportError::InvalidModuleIndex { index: 0 };
        let index = def.index().ok_or(missing)?;
        self.modules_by_index.clear(index)
    }

    /// Tear down per-interpreter import state
    pub fn finalize(&self) {
        let dropped = self.modules.clear().len() + self.modules_by_index.clear_all().len();
        self.core_namespaces.write().clear();
        debug!(interp = self.id, dropped, "finalized import state");
    }

    /// Whether the standard and test frozen sets are enabled
    pub fn use_frozen(&self) -> bool {
        TriState::from_raw(self.override_frozen_modules.load(Ordering::Acquire))
            .resolve(self.config.use_frozen_modules)
    }

    /// Override the frozen-modules setting, returning the previous override
    pub fn override_enable_standard_frozen(&self, value: TriState) -> TriState {
        TriState::from_raw(
            self.override_frozen_modules
                .swap(value.to_raw(), Ordering::AcqRel),
        )
    }

    /// Override the legacy-extension check, returning the previous override.
    ///
    /// Rejected on the main interpreter and on free-threaded runtimes.
    pub fn override_subinterpreter_check(&self, value: TriState) -> ImportResult<TriState> {
        if self.is_main() {
            return Err(ImportError::MainInterpreterOverride);
        }
        if self.free_threaded {
            return Err(ImportError::FreeThreadedOverride);
        }
        Ok(TriState::from_raw(
            self.override_multi_interp_check
                .swap(value.to_raw(), Ordering::AcqRel),
        ))
    }

    /// Whether this interpreter accepts legacy (single-phase) extensions
    pub fn subinterpreter_gate(&self) -> GateDecision {
        if self.is_main() {
            return GateDecision::Allowed;
        }
        match TriState::from_raw(self.override_multi_interp_check.load(Ordering::Acquire)) {
            TriState::ForceOff => GateDecision::AllowedByOverride,
            TriState::ForceOn => GateDecision::DeniedByOverride,
            TriState::Inherit if self.config.check_multi_interp_extensions => {
                GateDecision::DeniedByPolicy
            }
            TriState::Inherit => GateDecision::Allowed,
        }
    }

    /// Fail with `SubinterpreterIncompatible` if the gate denies `name`
    pub fn check_legacy_extension_allowed(&self, name: &str) -> ImportResult<()> {
        let decision = self.subinterpreter_gate();
        if decision.is_denied() {
            debug!(interp = self.id, module = name, ?decision, "legacy extension refused");
            return Err(ImportError::SubinterpreterIncompatible {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn get_dlopen_flags(&self) -> i32 {
        self.dlopen_flags.load(Ordering::Acquire)
    }

    pub fn set_dlopen_flags(&self, flags: i32) {
        self.dlopen_flags.store(flags, Ordering::Release);
    }

    /// This interpreter's private copy of a core module namespace
    pub fn core_namespace(&self, name: &str) -> Option<Namespace> {
        self.core_namespaces.read().get(name).cloned()
    }

    pub(crate) fn set_core_namespace(&self, name: &str, namespace: Namespace) {
        self.core_namespaces
            .write()
            .insert(name.to_string(), namespace);
    }

    pub fn is_free_threaded(&self) -> bool {
        self.free_threaded
    }

    /// Number of thread states currently bound to this interpreter by
    /// interpreter switches
    pub fn thread_state_count(&self) -> usize {
        self.thread_states.load(Ordering::Acquire)
    }

    fn attach_thread_state(&self) {
        self.thread_states.fetch_add(1, Ordering::AcqRel);
    }

    fn detach_thread_state(&self) {
        self.thread_states.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("id", &self.id)
            .field("modules", &self.modules.len())
            .finish()
    }
}
