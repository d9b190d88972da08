//! Extension Loader
//!
//! Creates, executes and clears extension modules on behalf of the import
//! system.
//!
//! # Load sequence
//!
//! ```text
//! create_extension(interp, spec)
//!   │
//!   ├─ cache hit ──► compatibility gate ──► reload in `interp`
//!   │
//!   └─ cache miss
//!        │ resolve init fn (shared library export or builtin table)
//!        ▼
//!      switch to main ──► call init ──► classify
//!        │                               ├─ single-phase: set __file__, cache
//!        │                               └─ multi-phase: keep the definition
//!        ▼
//!      switch back
//!        ├─ multi-phase  ──► build module from definition in `interp`
//!        └─ single-phase ──► gate ──► finish (not switched) or reload (switched)
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{
    core_definitions, CachedExtensionValue, Classified, LoaderResult, ModuleSpec, OriginKind,
    ReloadStrategy,
};
use crate::error::{ImportError, ImportResult, RaisedError};
use crate::ffi::{locate_extension, ExportSymbolResolver, InitContext, InitInvocation, RawInitFn};
use crate::interpreter::{ActiveInterpreter, Interpreter, InterpreterSwitcher};
use crate::object::{
    GilRequirement, ModuleDef, ModuleHandle, MultiInterpSupport, Namespace, StateSize, Value,
};
use crate::runtime::Runtime;

/// What the main-interpreter half of a first load produced
enum MainSideOutcome {
    /// The init function failed; reported in the requesting interpreter
    Failed(ImportError),
    MultiPhase(&'static ModuleDef),
    SinglePhase {
        module: ModuleHandle,
        cached: Arc<CachedExtensionValue>,
    },
}

/// Loads extension modules for one runtime
#[derive(Clone)]
pub struct ExtensionLoader {
    runtime: Arc<Runtime>,
}

impl ExtensionLoader {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }

    /// Import `spec` into `interp`: reuse the registered module, or create
    /// and execute it and register the result.
    ///
    /// Runs under the interpreter's import lock.
    pub fn import_extension(
        &self,
        interp: &Arc<Interpreter>,
        spec: &ModuleSpec,
    ) -> ImportResult<ModuleHandle> {
        let _lock = interp.import_lock().guard();
        if let Some(module) = interp.modules().get(spec.name()) {
            return Ok(module);
        }

        let module = self.create_extension(interp, spec)?;
        if let Err(err) = self.exec_extension(&module) {
            interp.modules().remove(spec.name());
            return Err(err);
        }
        interp.modules().insert(spec.name(), module.clone());
        Ok(module)
    }

    /// Create the module for `spec` without running multi-phase exec steps.
    ///
    /// Single-phase modules are published into the interpreter's registry
    /// and index table as part of creation.
    pub fn create_extension(
        &self,
        interp: &Arc<Interpreter>,
        spec: &ModuleSpec,
    ) -> ImportResult<ModuleHandle> {
        match spec.origin() {
            OriginKind::Dynamic => self.create_dynamic(interp, spec),
            OriginKind::Builtin | OriginKind::Core => self.create_builtin(interp, spec),
        }
    }

    /// Run a module's exec steps once.
    ///
    /// Modules without a definition and modules whose state already exists
    /// are left alone. A failing step releases the state again, so a retry
    /// reruns every step.
    pub fn exec_extension(&self, module: &ModuleHandle) -> ImportResult<()> {
        let Some(def) = module.def() else {
            return Ok(());
        };
        if !module.ensure_state(def.state_size()) {
            return Ok(());
        }
        for exec in def.exec_slots() {
            if let Err(err) = exec(module) {
                module.release_state();
                return Err(err.into());
            }
        }
        debug!(module = module.name(), "executed module");
        Ok(())
    }

    /// Forget a cached single-phase module. Test and debug use only.
    ///
    /// The definition's reinit function and snapshot are dropped and its
    /// slot in `interp`'s index table is emptied. The index itself stays
    /// assigned. The cache entry is deleted with the main interpreter
    /// active.
    pub fn clear_extension(
        &self,
        interp: &Arc<Interpreter>,
        path: &str,
        name: &str,
    ) -> ImportResult<()> {
        let Some(cached) = self.runtime.extensions().get(path, name) else {
            return Ok(());
        };

        cached.def().base().clear_transient();
        let index = cached.index();
        if index < interp.modules_by_index().capacity() {
            interp.modules_by_index().clear(index)?;
        }

        InterpreterSwitcher::new(&self.runtime).run_on_main(interp, |_| {
            self.runtime.extensions().delete(path, name);
            Ok(())
        })?;
        debug!(module = name, path, "cleared extension");
        Ok(())
    }

    /// Serve `spec` from the extension cache, if it is there
    pub fn find_extension(
        &self,
        interp: &Arc<Interpreter>,
        spec: &ModuleSpec,
    ) -> ImportResult<Option<ModuleHandle>> {
        let extensions = self.runtime.extensions();
        let Some(cached) = extensions.get(spec.origin_path(), spec.name()) else {
            debug!(module = spec.name(), "extension cache miss");
            return Ok(None);
        };

        // Loaded before by an interpreter that allows legacy modules; this
        // one may not.
        interp.check_legacy_extension_allowed(spec.name())?;

        let module = self.reload_singlephase(interp, &cached, spec)?;
        let (name, path) = (spec.name(), spec.origin_path());
        if interp.config().verbose {
            info!("import {} # previously loaded ({})", name, path);
        } else {
            debug!(module = name, path, "extension cache hit");
        }
        Ok(Some(module))
    }

    /// Spec for `name` found on the configured search paths
    pub fn locate(&self, name: &str) -> Option<ModuleSpec> {
        locate_extension(&self.runtime.config().search_paths, name)
            .map(|path| ModuleSpec::dynamic(name, path))
    }

    fn create_dynamic(
        &self,
        interp: &Arc<Interpreter>,
        spec: &ModuleSpec,
    ) -> ImportResult<ModuleHandle> {
        if let Some(module) = self.find_extension(interp, spec)? {
            return Ok(module);
        }

        let path = spec.filename().ok_or_else(|| ImportError::LibraryLoad {
            path: spec.origin_path().to_string(),
            reason: "spec has no library file".to_string(),
        })?;
        let library = self.runtime.opener().open(path, interp.get_dlopen_flags())?;
        let (init, _symbol) = ExportSymbolResolver::resolve(&*library, spec.name())?;

        self.runtime.gil().enable_transient();
        let result = self.run_extension(interp, spec, init);
        self.check_gil_for_module(interp, result.as_ref().ok(), spec.name());
        result
    }

    fn create_builtin(
        &self,
        interp: &Arc<Interpreter>,
        spec: &ModuleSpec,
    ) -> ImportResult<ModuleHandle> {
        if let Some(module) = self.find_extension(interp, spec)? {
            return Ok(module);
        }

        let entry = self
            .runtime
            .inittab()
            .find(spec.name())
            .ok_or_else(|| ImportError::NoBuiltinModule {
                name: spec.name().to_string(),
            })?;
        let Some(init) = entry.init() else {
            // Core modules cannot be re-initialized
            return Ok(interp.modules().get_or_add(spec.name()));
        };

        self.runtime.gil().enable_transient();
        let result = self.run_extension(interp, spec, init);
        self.check_gil_for_module(interp, result.as_ref().ok(), spec.name());
        result
    }

    /// First load of a module whose init function is known
    fn run_extension(
        &self,
        interp: &Arc<Interpreter>,
        spec: &ModuleSpec,
        init: RawInitFn,
    ) -> ImportResult<ModuleHandle> {
        let switcher = InterpreterSwitcher::new(&self.runtime);
        let outcome = switcher.run_on_main(interp, |active| self.init_on_main(active, spec, init))?;
        let switched = !interp.is_main();

        match outcome {
            MainSideOutcome::Failed(err) => Err(err),
            MainSideOutcome::MultiPhase(def) => self.module_from_def_and_spec(interp, def, spec),
            MainSideOutcome::SinglePhase { module, cached } => {
                interp.check_legacy_extension_allowed(spec.name())?;
                if switched {
                    // The module built under main stays there; the
                    // requester gets its own from the cache.
                    drop(module);
                    self.reload_singlephase(interp, &cached, spec)
                } else {
                    self.finish_singlephase(interp, module, &cached, spec.name())
                }
            }
        }
    }

    /// The part of a first load that runs with the main interpreter active
    fn init_on_main(
        &self,
        active: &ActiveInterpreter<'_>,
        spec: &ModuleSpec,
        init: RawInitFn,
    ) -> ImportResult<MainSideOutcome> {
        let result = self.invoke_init(active.interpreter(), init, spec);
        let classified = match result.into_outcome(spec.name()) {
            Ok(classified) => classified,
            Err(err) => return Ok(MainSideOutcome::Failed(err)),
        };

        match classified {
            Classified::MultiPhase(def) => Ok(MainSideOutcome::MultiPhase(def)),
            Classified::SinglePhase { module, def } => {
                set_file(&module, spec);
                let (origin, gil) = (spec.origin(), module.gil_requirement());
                let value = match def.state_size() {
                    StateSize::NoState => {
                        CachedExtensionValue::stateless(def, module.namespace(), origin, gil)?
                    }
                    StateSize::Bytes(_) => CachedExtensionValue::stateful(def, init, origin, gil)?,
                };
                let cached = self
                    .runtime
                    .extensions()
                    .insert(spec.origin_path(), spec.name(), value)?;
                Ok(MainSideOutcome::SinglePhase { module, cached })
            }
        }
    }

    /// Call an init function with `interp` active and classify the result
    fn invoke_init(
        &self,
        interp: &Arc<Interpreter>,
        init: RawInitFn,
        spec: &ModuleSpec,
    ) -> LoaderResult {
        let mut ctx = InitContext::new(
            Arc::clone(&self.runtime),
            Arc::clone(interp),
            spec.package_context(),
        );
        debug!(
            module = spec.name(),
            interp = interp.id(),
            "calling init function"
        );
        // Safety: `init` is the module's export function or a builtin table
        // entry, both of which follow the init function ABI.
        let invocation = unsafe { InitInvocation::call(init, &mut ctx) };
        LoaderResult::classify(invocation, !spec.short_name().is_ascii())
    }

    /// Publish a freshly initialized single-phase module
    fn finish_singlephase(
        &self,
        interp: &Arc<Interpreter>,
        module: ModuleHandle,
        cached: &CachedExtensionValue,
        name: &str,
    ) -> ImportResult<ModuleHandle> {
        let index = cached.index();
        interp.modules_by_index().set(index, module.clone())?;
        interp.modules().insert(name, module.clone());
        Ok(module)
    }

    /// Build `interp`'s copy of a cached single-phase module
    fn reload_singlephase(
        &self,
        interp: &Arc<Interpreter>,
        cached: &CachedExtensionValue,
        spec: &ModuleSpec,
    ) -> ImportResult<ModuleHandle> {
        let name = spec.name();
        let module = match cached.strategy() {
            ReloadStrategy::Snapshot => {
                let snapshot = cached.snapshot().ok_or_else(|| missing_namespace(name))?;
                fresh_module(interp, name, snapshot, cached.gil())
            }
            ReloadStrategy::Core => {
                let namespace = interp
                    .core_namespace(name)
                    .ok_or_else(|| missing_namespace(name))?;
                fresh_module(interp, name, &namespace, GilRequirement::Used)
            }
            ReloadStrategy::Reinit => self.reinit_singlephase(interp, cached, spec)?,
        };

        if let Err(err) = interp.modules_by_index().set(cached.index(), module.clone()) {
            interp.modules().remove(name);
            return Err(err);
        }
        Ok(module)
    }

    /// Call a stateful module's init function again, in the requester
    fn reinit_singlephase(
        &self,
        interp: &Arc<Interpreter>,
        cached: &CachedExtensionValue,
        spec: &ModuleSpec,
    ) -> ImportResult<ModuleHandle> {
        let name = spec.name();
        let init = cached.reinit().ok_or_else(|| ImportError::InvalidDefinition {
            name: name.to_string(),
            reason: "cached stateful module has no init function".to_string(),
        })?;

        match self.invoke_init(interp, init, spec).into_outcome(name)? {
            Classified::SinglePhase { module, def } => {
                if !std::ptr::eq(def, cached.def()) {
                    warn!(module = name, "reinit returned a different definition");
                }
                set_file(&module, spec);
                interp.modules().insert(name, module.clone());
                Ok(module)
            }
            Classified::MultiPhase(_) => Err(ImportError::InvalidDefinition {
                name: name.to_string(),
                reason: "re-initialization returned a multi-phase definition".to_string(),
            }),
        }
    }

    /// Build a multi-phase module in the requesting interpreter
    pub fn module_from_def_and_spec(
        &self,
        interp: &Arc<Interpreter>,
        def: &'static ModuleDef,
        spec: &ModuleSpec,
    ) -> ImportResult<ModuleHandle> {
        let name = spec.name();
        def.validate_slots()
            .map_err(|reason| ImportError::InvalidDefinition {
                name: name.to_string(),
                reason,
            })?;
        check_multi_interp_slot(interp, def, name)?;

        let module = match def.create_slot() {
            Some(create) => {
                let module = create(spec, def)?;
                module.attach_def(def);
                module
            }
            None => ModuleHandle::with_def(name, def),
        };
        module.set_gil_requirement(def.gil_slot());
        module.add_members(def);

        debug!(module = name, interp = interp.id(), "built module");
        Ok(module)
    }

    /// Register a core module the runtime built for `interp`.
    ///
    /// The first interpreter to do this caches the definition. Every
    /// interpreter keeps a private copy of the namespace, which later
    /// reloads of the module are served from.
    pub fn fixup_core_module(
        &self,
        interp: &Arc<Interpreter>,
        module: &ModuleHandle,
    ) -> ImportResult<()> {
        let name = module.name().to_string();
        let def = module
            .def()
            .ok_or_else(|| ImportError::MissingDefinition { name: name.clone() })?
            .init();
        if def.is_multi_phase() || def.state_size() != StateSize::NoState {
            return Err(ImportError::InvalidDefinition {
                name,
                reason: "core modules must be stateless single-phase modules".to_string(),
            });
        }

        let cached = self
            .runtime
            .extensions()
            .insert(&name, &name, CachedExtensionValue::core(def)?)?;
        interp.set_core_namespace(&name, module.namespace());
        self.finish_singlephase(interp, module.clone(), &cached, &name)?;
        Ok(())
    }

    /// Create and register `sys` and `builtins` for a new interpreter
    pub(crate) fn bootstrap_core(&self, interp: &Arc<Interpreter>) -> ImportResult<()> {
        for def in core_definitions() {
            let def = def.init();
            let module = ModuleHandle::with_def(def.name(), def);
            module.add_members(def);
            if def.name() == "sys" {
                module.set("interpreter_id", Value::Int(interp.id() as i64));
            }
            self.fixup_core_module(interp, &module)?;
        }
        debug!(interp = interp.id(), "bootstrapped core modules");
        Ok(())
    }

    /// Settle the GIL after creating `name`.
    ///
    /// A failed creation or a lock-free module drops the transient hold. A
    /// module that needs the GIL enables it for good; the warning about
    /// that is reported out of band if it cannot be issued.
    fn check_gil_for_module(
        &self,
        interp: &Interpreter,
        module: Option<&ModuleHandle>,
        name: &str,
    ) {
        let gil = self.runtime.gil();
        if !gil.is_free_threaded() {
            return;
        }

        match module {
            Some(module) if module.gil_requirement() == GilRequirement::Used => {
                if gil.enable_permanent() {
                    let message = format!(
                        "The global interpreter lock (GIL) has been enabled to load module '{}', \
                         which has not declared that it can run safely without the GIL.",
                        name
                    );
                    warn!(module = name, "global interpreter lock enabled permanently");
                    if let Err(err) = self.runtime.warn("RuntimeWarning", &message) {
                        self.runtime
                            .report_unraisable(err, "while warning that the GIL was enabled");
                    }
                }
                if interp.config().verbose {
                    info!("# loading module '{}', which requires the GIL", name);
                }
            }
            _ => gil.disable(),
        }
    }
}

/// Gate a multi-phase definition on its declared interpreter support
fn check_multi_interp_slot(interp: &Interpreter, def: &ModuleDef, name: &str) -> ImportResult<()> {
    if interp.is_main() {
        return Ok(());
    }
    match def.multi_interp_slot() {
        MultiInterpSupport::NotSupported => interp.check_legacy_extension_allowed(name),
        MultiInterpSupport::Supported if interp.config().own_gil => {
            interp.check_legacy_extension_allowed(name)
        }
        _ => Ok(()),
    }
}

fn set_file(module: &ModuleHandle, spec: &ModuleSpec) {
    if let Some(filename) = spec.filename() {
        module.set("__file__", filename.display().to_string());
    }
}

/// A new module in `interp`'s registry holding a copy of `namespace`.
///
/// The definition is not attached: the module is a copy, not an instance.
fn fresh_module(
    interp: &Interpreter,
    name: &str,
    namespace: &Namespace,
    gil: GilRequirement,
) -> ModuleHandle {
    let module = ModuleHandle::new(name);
    module.update_namespace(namespace);
    module.set_gil_requirement(gil);
    interp.modules().insert(name, module.clone());
    module
}

fn missing_namespace(name: &str) -> ImportError {
    ImportError::Exception(RaisedError::system(format!(
        "no cached namespace for module {}",
        name
    )))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::extensions::InittabEntry;
    use crate::ffi::InitOutput;
    use crate::interpreter::InterpreterConfig;
    use crate::object::{MultiInterpSupport, Slot};

    static LEDGER: ModuleDef = ModuleDef::new("ledger").with_doc("Append-only ledger");
    static LEDGER_INITS: AtomicUsize = AtomicUsize::new(0);

    crate::module_init! {
        fn ModInit_ledger(ctx) {
            LEDGER_INITS.fetch_add(1, Ordering::SeqCst);
            let module = ctx.create_module(&LEDGER).ok()?;
            module.set("entries", Value::Int(0));
            Some(InitOutput::Module(module))
        }
    }

    static SCRATCH: ModuleDef = ModuleDef::new("scratch");

    crate::module_init! {
        fn ModInit_scratch(ctx) {
            let module = ctx.create_module(&SCRATCH).ok()?;
            Some(InitOutput::Module(module))
        }
    }

    static GIL_HEAVY: ModuleDef = ModuleDef::new("gil_heavy");

    crate::module_init! {
        fn ModInit_gil_heavy(ctx) {
            let module = ctx.create_module(&GIL_HEAVY).ok()?;
            Some(InitOutput::Module(module))
        }
    }

    static COUNTED_EXECS: AtomicUsize = AtomicUsize::new(0);

    fn counted_exec(module: &ModuleHandle) -> Result<(), RaisedError> {
        COUNTED_EXECS.fetch_add(1, Ordering::SeqCst);
        module.set("ready", true);
        Ok(())
    }

    static COUNTED_SLOTS: [Slot; 2] = [
        Slot::Exec(counted_exec),
        Slot::MultipleInterpreters(MultiInterpSupport::PerInterpreterGil),
    ];
    static COUNTED: ModuleDef = ModuleDef::new("counted").with_slots(&COUNTED_SLOTS);

    crate::module_init! {
        fn ModInit_counted(_ctx) {
            Some(InitOutput::Definition(COUNTED.init()))
        }
    }

    static FLAKY_EXECS: AtomicUsize = AtomicUsize::new(0);

    /// Fails on its first run only
    fn flaky_exec(module: &ModuleHandle) -> Result<(), RaisedError> {
        if FLAKY_EXECS.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(RaisedError::value("not yet"));
        }
        module.set("ready", true);
        Ok(())
    }

    static FLAKY_SLOTS: [Slot; 2] = [
        Slot::Exec(flaky_exec),
        Slot::MultipleInterpreters(MultiInterpSupport::PerInterpreterGil),
    ];
    static FLAKY: ModuleDef = ModuleDef::new("flaky")
        .with_state(StateSize::Bytes(2))
        .with_slots(&FLAKY_SLOTS);

    crate::module_init! {
        fn ModInit_flaky(_ctx) {
            Some(InitOutput::Definition(FLAKY.init()))
        }
    }

    static SHARED_GIL_SLOTS: [Slot; 2] = [
        Slot::MultipleInterpreters(MultiInterpSupport::NotSupported),
        Slot::Gil(GilRequirement::Used),
    ];
    static SHARED_GIL: ModuleDef = ModuleDef::new("shared_gil").with_slots(&SHARED_GIL_SLOTS);

    crate::module_init! {
        fn ModInit_shared_gil(_ctx) {
            Some(InitOutput::Definition(SHARED_GIL.init()))
        }
    }

    fn runtime() -> Arc<Runtime> {
        Runtime::builder()
            .append_builtin(InittabEntry::new("ledger", ModInit_ledger))
            .append_builtin(InittabEntry::new("scratch", ModInit_scratch))
            .append_builtin(InittabEntry::new("counted", ModInit_counted))
            .append_builtin(InittabEntry::new("shared_gil", ModInit_shared_gil))
            .append_builtin(InittabEntry::new("flaky", ModInit_flaky))
            .build()
            .unwrap()
    }

    #[test]
    fn test_multi_phase_builtin_is_not_cached() {
        let runtime = runtime();
        let main = runtime.main_interpreter();
        let loader = runtime.loader();

        let module = loader
            .import_extension(main, &ModuleSpec::builtin("_dynimport"))
            .unwrap();
        assert!(module.contains("extension_suffixes"));
        assert!(module.contains("platform_tag"));
        let extensions = runtime.extensions();
        assert_eq!(extensions.len(), 2);
        assert!(extensions.get("_dynimport", "_dynimport").is_none());
    }

    #[test]
    fn test_exec_extension_runs_once() {
        let runtime = runtime();
        let loader = runtime.loader();
        let module = loader
            .create_extension(runtime.main_interpreter(), &ModuleSpec::builtin("counted"))
            .unwrap();
        assert!(!module.contains("ready"));

        let before = COUNTED_EXECS.load(Ordering::SeqCst);
        loader.exec_extension(&module).unwrap();
        loader.exec_extension(&module).unwrap();
        assert_eq!(COUNTED_EXECS.load(Ordering::SeqCst), before + 1);
        assert_eq!(module.get("ready"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_failed_exec_can_be_retried() {
        let runtime = runtime();
        let loader = runtime.loader();
        let module = loader
            .create_extension(runtime.main_interpreter(), &ModuleSpec::builtin("flaky"))
            .unwrap();

        match loader.exec_extension(&module) {
            Err(ImportError::Exception(raised)) => assert_eq!(raised.message(), "not yet"),
            other => panic!("expected the exec error, got {:?}", other.is_ok()),
        }
        assert!(!module.has_state());
        assert!(!module.contains("ready"));

        loader.exec_extension(&module).unwrap();
        assert_eq!(FLAKY_EXECS.load(Ordering::SeqCst), 2);
        assert_eq!(module.get("ready"), Some(Value::Bool(true)));
        assert!(module.has_state());
    }

    #[test]
    fn test_single_phase_builtin_reload() {
        let runtime = runtime();
        let main = runtime.main_interpreter();
        let loader = runtime.loader();
        let spec = ModuleSpec::builtin("ledger");

        let first = loader.create_extension(main, &spec).unwrap();
        let inits = LEDGER_INITS.load(Ordering::SeqCst);
        first.set("entries", Value::Int(7));

        let second = loader.create_extension(main, &spec).unwrap();
        assert_ne!(first, second);
        assert_eq!(second.get("entries"), Some(Value::Int(0)));
        assert_eq!(second.doc().as_deref(), Some("Append-only ledger"));
        assert!(second.def().is_none());
        assert_eq!(LEDGER_INITS.load(Ordering::SeqCst), inits);
        assert_eq!(main.find_module(&LEDGER), Some(second));
    }

    #[test]
    fn test_missing_builtin() {
        let runtime = runtime();
        let err = runtime
            .loader()
            .create_extension(runtime.main_interpreter(), &ModuleSpec::builtin("nope"))
            .unwrap_err();
        assert_eq!(err.to_string(), "no built-in module named nope");
    }

    #[test]
    fn test_core_module_reload_uses_own_namespace() {
        let runtime = runtime();
        let sub = runtime
            .new_interpreter(InterpreterConfig::legacy())
            .unwrap();
        let sys = runtime
            .loader()
            .create_extension(&sub, &ModuleSpec::core("sys"))
            .unwrap();
        assert_eq!(sys.get("interpreter_id"), Some(Value::Int(sub.id() as i64)));
        assert_eq!(sub.modules().get("sys"), Some(sys));
    }

    #[test]
    fn test_multi_interp_slot_gate() {
        let runtime = runtime();
        let spec = ModuleSpec::builtin("shared_gil");

        let isolated = runtime.new_subinterpreter().unwrap();
        let loader = runtime.loader();
        let err = loader.create_extension(&isolated, &spec).unwrap_err();
        assert!(matches!(
            err,
            ImportError::SubinterpreterIncompatible { .. }
        ));

        let legacy = runtime
            .new_interpreter(InterpreterConfig::legacy())
            .unwrap();
        assert!(loader.create_extension(&legacy, &spec).is_ok());
    }

    #[test]
    fn test_clear_extension() {
        let runtime = runtime();
        let main = runtime.main_interpreter();
        let loader = runtime.loader();
        loader
            .create_extension(main, &ModuleSpec::builtin("scratch"))
            .unwrap();
        let index = SCRATCH.index().unwrap();
        assert!(SCRATCH.cached_snapshot().is_some());
        assert!(main.modules_by_index().is_occupied(index));

        loader.clear_extension(main, "scratch", "scratch").unwrap();
        assert!(runtime.extensions().get("scratch", "scratch").is_none());
        assert!(SCRATCH.cached_snapshot().is_none());
        assert!(!main.modules_by_index().is_occupied(index));
        assert_eq!(SCRATCH.index(), Some(index));

        // Clearing again is a no-op
        loader.clear_extension(main, "scratch", "scratch").unwrap();
    }

    #[test]
    fn test_free_threaded_gil_decisions() {
        let runtime = Runtime::builder()
            .free_threaded(true)
            .append_builtin(InittabEntry::new("gil_heavy", ModInit_gil_heavy))
            .build()
            .unwrap();
        let main = runtime.main_interpreter();
        let loader = runtime.loader();

        loader
            .create_extension(main, &ModuleSpec::builtin("_dynimport"))
            .unwrap();
        assert!(!runtime.gil().is_enabled());

        loader
            .create_extension(main, &ModuleSpec::builtin("gil_heavy"))
            .unwrap();
        assert!(runtime.gil().is_permanently_enabled());
        let warnings = runtime.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("'gil_heavy'"));
    }

    #[test]
    fn test_gil_warning_failure_is_unraisable() {
        let runtime = Runtime::builder()
            .free_threaded(true)
            .warnings_as_errors(true)
            .append_builtin(InittabEntry::new("gil_heavy", ModInit_gil_heavy))
            .build()
            .unwrap();
        let spec = ModuleSpec::builtin("gil_heavy");
        let module = runtime
            .loader()
            .create_extension(runtime.main_interpreter(), &spec);
        assert!(module.is_ok());
        let unraisable = runtime.unraisable_errors();
        assert_eq!(unraisable.len(), 1);
        assert_eq!(unraisable[0].kind(), "RuntimeWarning");
    }
}
