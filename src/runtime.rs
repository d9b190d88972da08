//! Runtime
//!
//! Process-level state shared by every interpreter: the extension cache,
//! the builtin and frozen tables, the GIL controller, the library opener and
//! the code executor. Each runtime has exactly one main interpreter (id 0)
//! and any number of subinterpreters.
//!
//! ```ignore
//! let runtime = Runtime::builder()
//!     .append_builtin(InittabEntry::new("spam", ModInit_spam))
//!     .build()?;
//! let sub = runtime.new_subinterpreter()?;
//! let spam = runtime.import_builtin(&sub, "spam")?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigResult, DynImportConfig};
use crate::error::{ImportResult, RaisedError};
use crate::exec::{CodeExecutor, LiteralScriptExecutor};
use crate::extensions::{
    BuiltinStatus, ExtensionCache, ExtensionLoader, GilController, Inittab, InittabEntry,
    ModuleSpec,
};
use crate::ffi::{LibraryOpener, SystemLibraryOpener};
use crate::frozen::{FrozenInfo, FrozenModule, FrozenModuleTable};
use crate::interpreter::{Interpreter, InterpreterConfig};
use crate::object::ModuleHandle;

/// Settings a runtime is built with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeConfig {
    pub free_threaded: bool,
    pub warnings_as_errors: bool,
    /// Directories searched by [`ExtensionLoader::locate`]
    pub search_paths: Vec<PathBuf>,
    /// Configuration of the main interpreter
    pub main: InterpreterConfig,
    /// Default configuration of new subinterpreters
    pub subinterpreter: InterpreterConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            free_threaded: cfg!(feature = "free-threaded"),
            warnings_as_errors: false,
            search_paths: Vec::new(),
            main: InterpreterConfig::main(),
            subinterpreter: InterpreterConfig::isolated(),
        }
    }
}

/// A warning issued through [`Runtime::warn`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeWarning {
    pub category: String,
    pub message: String,
}

pub struct Runtime {
    config: RuntimeConfig,
    main: Arc<Interpreter>,
    interpreters: RwLock<HashMap<u64, Weak<Interpreter>>>,
    next_interp_id: AtomicU64,
    extensions: ExtensionCache,
    inittab: Inittab,
    opener: Arc<dyn LibraryOpener>,
    gil: GilController,
    frozen: FrozenModuleTable,
    executor: Arc<dyn CodeExecutor>,
    unraisable: Mutex<Vec<RaisedError>>,
    warnings: Mutex<Vec<RuntimeWarning>>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn main_interpreter(&self) -> &Arc<Interpreter> {
        &self.main
    }

    /// Loader bound to this runtime
    pub fn loader(self: &Arc<Self>) -> ExtensionLoader {
        ExtensionLoader::new(Arc::clone(self))
    }

    pub fn extensions(&self) -> &ExtensionCache {
        &self.extensions
    }

    pub fn inittab(&self) -> &Inittab {
        &self.inittab
    }

    pub fn opener(&self) -> &Arc<dyn LibraryOpener> {
        &self.opener
    }

    pub fn gil(&self) -> &GilController {
        &self.gil
    }

    pub fn frozen(&self) -> &FrozenModuleTable {
        &self.frozen
    }

    pub fn executor(&self) -> &Arc<dyn CodeExecutor> {
        &self.executor
    }

    /// Create a subinterpreter with the runtime's default subinterpreter
    /// configuration
    pub fn new_subinterpreter(self: &Arc<Self>) -> ImportResult<Arc<Interpreter>> {
        self.new_interpreter(self.config.subinterpreter.clone())
    }

    /// Create a subinterpreter and bootstrap its core modules
    pub fn new_interpreter(
        self: &Arc<Self>,
        config: InterpreterConfig,
    ) -> ImportResult<Arc<Interpreter>> {
        let id = self.next_interp_id.fetch_add(1, Ordering::Relaxed);
        let interp = Arc::new(Interpreter::new(id, config, self.gil.is_free_threaded()));
        self.loader().bootstrap_core(&interp)?;
        let weak = Arc::downgrade(&interp);
        self.interpreters.write().insert(id, weak);
        debug!(interp = id, "created subinterpreter");
        Ok(interp)
    }

    /// Live interpreter with this id
    pub fn interpreter(&self, id: u64) -> Option<Arc<Interpreter>> {
        if id == 0 {
            return Some(Arc::clone(&self.main));
        }
        self.interpreters.read().get(&id).and_then(Weak::upgrade)
    }

    /// Tear down a subinterpreter's import state. The main interpreter
    /// lives as long as the runtime.
    pub fn end_interpreter(&self, interp: &Arc<Interpreter>) {
        if interp.is_main() {
            warn!("refusing to end the main interpreter");
            return;
        }
        interp.finalize();
        self.interpreters.write().remove(&interp.id());
        debug!(interp = interp.id(), "ended subinterpreter");
    }

    /// Record an error that could not be reported to its caller
    pub fn report_unraisable(&self, err: RaisedError, context: &str) {
        error!(
            kind = err.kind(),
            message = err.message(),
            "unraisable error {}",
            context
        );
        self.unraisable.lock().push(err);
    }

    pub fn unraisable_errors(&self) -> Vec<RaisedError> {
        self.unraisable.lock().clone()
    }

    /// Issue a runtime warning. Fails when warnings are errors.
    pub fn warn(&self, category: &str, message: &str) -> Result<(), RaisedError> {
        if self.config.warnings_as_errors {
            return Err(RaisedError::new(category, message));
        }
        warn!(category, "{}", message);
        self.warnings.lock().push(RuntimeWarning {
            category: category.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    pub fn warnings(&self) -> Vec<RuntimeWarning> {
        self.warnings.lock().clone()
    }

    pub fn builtin_module_names(&self) -> Vec<String> {
        self.inittab.names()
    }

    pub fn is_builtin(&self, name: &str) -> BuiltinStatus {
        self.inittab.status(name)
    }

    /// Import a builtin or core module into `interp`
    pub fn import_builtin(
        self: &Arc<Self>,
        interp: &Arc<Interpreter>,
        name: &str,
    ) -> ImportResult<ModuleHandle> {
        let spec = match self.is_builtin(name) {
            BuiltinStatus::Core => ModuleSpec::core(name),
            _ => ModuleSpec::builtin(name),
        };
        self.loader().import_extension(interp, &spec)
    }

    /// Import the extension in the library at `path` into `interp`
    pub fn import_dynamic(
        self: &Arc<Self>,
        interp: &Arc<Interpreter>,
        name: &str,
        path: impl AsRef<Path>,
    ) -> ImportResult<ModuleHandle> {
        let spec = ModuleSpec::dynamic(name, path);
        self.loader().import_extension(interp, &spec)
    }

    pub fn list_frozen_names(&self, interp: &Interpreter) -> Vec<String> {
        self.frozen.list_frozen_names(interp.use_frozen())
    }

    pub fn is_frozen(&self, interp: &Interpreter, name: &str) -> bool {
        self.frozen.is_frozen(name, interp.use_frozen())
    }

    pub fn is_frozen_package(&self, interp: &Interpreter, name: &str) -> ImportResult<bool> {
        self.frozen.is_frozen_package(name, interp.use_frozen())
    }

    pub fn find_frozen(
        &self,
        interp: &Interpreter,
        name: &str,
    ) -> ImportResult<Option<FrozenInfo>> {
        self.frozen.find_frozen(name, interp.use_frozen())
    }

    /// Run frozen module `name` into `interp`; `Ok(None)` if it is not
    /// frozen here
    pub fn import_frozen_module(
        &self,
        interp: &Interpreter,
        name: &str,
    ) -> ImportResult<Option<ModuleHandle>> {
        self.frozen.import(interp, self.executor.as_ref(), name)
    }

    /// Drop every cached extension and finalize all interpreters.
    ///
    /// Returns the number of cache entries removed.
    pub fn shutdown(&self) -> usize {
        let live: Vec<Arc<Interpreter>> = self
            .interpreters
            .write()
            .drain()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect();
        for interp in &live {
            interp.finalize();
        }
        self.main.finalize();
        let cleared = self.extensions.clear();
        info!(cleared, subinterpreters = live.len(), "runtime shut down");
        cleared
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("free_threaded", &self.gil.is_free_threaded())
            .field("extensions", &self.extensions.len())
            .field("interpreters", &(self.interpreters.read().len() + 1))
            .finish()
    }
}

/// Builder for [`Runtime`]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    inittab: Inittab,
    frozen_overrides: &'static [FrozenModule],
    opener: Option<Arc<dyn LibraryOpener>>,
    executor: Option<Arc<dyn CodeExecutor>>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            inittab: Inittab::new(),
            frozen_overrides: &[],
            opener: None,
            executor: None,
        }
    }

    /// Start from a loaded `dynimport.toml`
    pub fn from_config(config: &DynImportConfig) -> ConfigResult<Self> {
        Ok(Self::new().config(config.runtime_config()?))
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn free_threaded(mut self, free_threaded: bool) -> Self {
        self.config.free_threaded = free_threaded;
        self
    }

    pub fn warnings_as_errors(mut self, enabled: bool) -> Self {
        self.config.warnings_as_errors = enabled;
        self
    }

    pub fn main_config(mut self, config: InterpreterConfig) -> Self {
        self.config.main = config;
        self
    }

    pub fn subinterpreter_config(mut self, config: InterpreterConfig) -> Self {
        self.config.subinterpreter = config;
        self
    }

    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.search_paths.push(path.into());
        self
    }

    pub fn append_builtin(mut self, entry: InittabEntry) -> Self {
        self.inittab.append(entry);
        self
    }

    pub fn extend_builtins(mut self, entries: impl IntoIterator<Item = InittabEntry>) -> Self {
        self.inittab.extend(entries);
        self
    }

    /// Embedder frozen modules, searched after the bootstrap set
    pub fn frozen_overrides(mut self, overrides: &'static [FrozenModule]) -> Self {
        self.frozen_overrides = overrides;
        self
    }

    pub fn opener(mut self, opener: Arc<dyn LibraryOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn CodeExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Build the runtime and bootstrap the main interpreter's core modules
    pub fn build(self) -> ImportResult<Arc<Runtime>> {
        let free_threaded = self.config.free_threaded;
        let main = Arc::new(Interpreter::new(0, self.config.main.clone(), free_threaded));
        let runtime = Arc::new(Runtime {
            main,
            interpreters: RwLock::new(HashMap::new()),
            next_interp_id: AtomicU64::new(1),
            extensions: ExtensionCache::new(),
            inittab: self.inittab,
            opener: self
                .opener
                .unwrap_or_else(|| Arc::new(SystemLibraryOpener::new())),
            gil: GilController::new(free_threaded),
            frozen: FrozenModuleTable::new().with_overrides(self.frozen_overrides),
            executor: self
                .executor
                .unwrap_or_else(|| Arc::new(LiteralScriptExecutor::new())),
            unraisable: Mutex::new(Vec::new()),
            warnings: Mutex::new(Vec::new()),
            config: self.config,
        });

        runtime.loader().bootstrap_core(&runtime.main)?;
        let builtins = runtime.inittab.len();
        debug!(free_threaded, builtins, "runtime ready");
        Ok(runtime)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
