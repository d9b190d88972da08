//! Shared fixtures for the integration tests.
//!
//! Extensions are linked into the test binary and served through a
//! `StaticLibraryRegistry`, one fake library path per module:
//!
//! | Module  | Kind                                   |
//! |---------|----------------------------------------|
//! | alpha   | single-phase, 4 bytes of state          |
//! | beta    | single-phase, stateless                 |
//! | gämma   | single-phase with a non-ASCII name      |
//! | delta   | multi-phase, 8 bytes of state           |
//! | epsilon | single-phase, stateless, slow init      |
//! | faulty  | raises                                  |
//! | silent  | returns nothing, raises nothing         |
//! | notmod  | returns a non-module                    |
//! | omega   | single-phase, imports itself in init    |

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dynimport::ffi::{InitContext, InitOutput, StaticLibrary, StaticLibraryRegistry};
use dynimport::object::{
    Constant, GilRequirement, Member, ModuleDef, ModuleHandle, MultiInterpSupport,
    NativeFunction, Slot, StateSize, Value,
};
use dynimport::{ModuleSpec, RaisedError, Runtime, RuntimeBuilder};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Init calls per (runtime, module)
static INIT_CALLS: Lazy<Mutex<HashMap<(usize, &'static str), usize>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn runtime_key(runtime: &Arc<Runtime>) -> usize {
    Arc::as_ptr(runtime) as usize
}

fn record_init(ctx: &InitContext, module: &'static str) {
    *INIT_CALLS
        .lock()
        .entry((runtime_key(ctx.runtime()), module))
        .or_insert(0) += 1;
}

/// How many times `module`'s init function ran in `runtime`
pub fn init_calls(runtime: &Arc<Runtime>, module: &'static str) -> usize {
    INIT_CALLS
        .lock()
        .get(&(runtime_key(runtime), module))
        .copied()
        .unwrap_or(0)
}

/// Increment the first state byte and return it
fn bump(module: &ModuleHandle, _args: &[Value]) -> Result<Value, RaisedError> {
    module
        .with_state(|state| {
            state[0] = state[0].wrapping_add(1);
            Value::Int(state[0] as i64)
        })
        .ok_or_else(|| RaisedError::system("module has no state"))
}

static STATEFUL_MEMBERS: [Member; 1] = [Member::Function(NativeFunction::new("bump", bump))];

pub static ALPHA: ModuleDef = ModuleDef::new("alpha")
    .with_doc("Stateful single-phase module")
    .with_state(StateSize::Bytes(4))
    .with_members(&STATEFUL_MEMBERS);

dynimport::module_init! {
    pub fn ModInit_alpha(ctx) {
        record_init(ctx, "alpha");
        let module = ctx.create_module(&ALPHA).ok()?;
        module.set("kind", "stateful");
        Some(InitOutput::Module(module))
    }
}

static BETA_MEMBERS: [Member; 1] = [Member::Constant("answer", Constant::Int(42))];

pub static BETA: ModuleDef = ModuleDef::new("beta")
    .with_doc("Stateless single-phase module")
    .with_members(&BETA_MEMBERS);

dynimport::module_init! {
    pub fn ModInit_beta(ctx) {
        record_init(ctx, "beta");
        let module = ctx.create_module(&BETA).ok()?;
        module.set("greeting", "hello");
        module.set("init_interp", ctx.interpreter().id() as i64);
        Some(InitOutput::Module(module))
    }
}

pub static GAMMA: ModuleDef = ModuleDef::new("gämma");

dynimport::module_init! {
    pub fn ModInitU_gmma_loa(ctx) {
        record_init(ctx, "gämma");
        let module = ctx.create_module(&GAMMA).ok()?;
        Some(InitOutput::Module(module))
    }
}

fn exec_delta(module: &ModuleHandle) -> Result<(), RaisedError> {
    module.set("ready", true);
    Ok(())
}

static DELTA_SLOTS: [Slot; 3] = [
    Slot::Exec(exec_delta),
    Slot::MultipleInterpreters(MultiInterpSupport::PerInterpreterGil),
    Slot::Gil(GilRequirement::NotUsed),
];

pub static DELTA: ModuleDef = ModuleDef::new("delta")
    .with_state(StateSize::Bytes(8))
    .with_members(&STATEFUL_MEMBERS)
    .with_slots(&DELTA_SLOTS);

dynimport::module_init! {
    pub fn ModInit_delta(ctx) {
        record_init(ctx, "delta");
        Some(InitOutput::Definition(DELTA.init()))
    }
}

pub static EPSILON: ModuleDef = ModuleDef::new("epsilon");

dynimport::module_init! {
    pub fn ModInit_epsilon(ctx) {
        record_init(ctx, "epsilon");
        // Widen the window for racing first loads
        std::thread::sleep(Duration::from_millis(5));
        let module = ctx.create_module(&EPSILON).ok()?;
        module.set("loaded", true);
        Some(InitOutput::Module(module))
    }
}

dynimport::module_init! {
    pub fn ModInit_faulty(ctx) {
        record_init(ctx, "faulty");
        ctx.raise(RaisedError::value("faulty init"));
        None
    }
}

dynimport::module_init! {
    pub fn ModInit_silent(ctx) {
        record_init(ctx, "silent");
        None
    }
}

dynimport::module_init! {
    pub fn ModInit_notmod(_ctx) {
        Some(InitOutput::Object(Value::Int(1)))
    }
}

pub static OMEGA: ModuleDef = ModuleDef::new("omega");

static OMEGA_IMPORTED: AtomicBool = AtomicBool::new(false);

dynimport::module_init! {
    pub fn ModInit_omega(ctx) {
        record_init(ctx, "omega");
        // Only the outermost call imports; the nested one returns plainly
        let inner = if OMEGA_IMPORTED.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(ctx.import(&spec("omega")).is_ok())
        };
        let module = ctx.create_module(&OMEGA).ok()?;
        match inner {
            Some(ok) => module.set("inner_import_ok", ok),
            None => module.set("nested", true),
        }
        Some(InitOutput::Module(module))
    }
}

/// Fake library path of a fixture module
pub fn library_path(module: &str) -> String {
    let file = match module {
        "gämma" => "gamma",
        other => other,
    };
    format!("/ext/{}.so", file)
}

pub fn spec(module: &str) -> ModuleSpec {
    ModuleSpec::dynamic(module, library_path(module))
}

pub fn libraries() -> Arc<StaticLibraryRegistry> {
    let registry = StaticLibraryRegistry::new();
    let exports: [(&str, &str, dynimport::RawInitFn); 9] = [
        ("alpha", "ModInit_alpha", ModInit_alpha),
        ("beta", "ModInit_beta", ModInit_beta),
        ("gämma", "ModInitU_gmma_loa", ModInitU_gmma_loa),
        ("delta", "ModInit_delta", ModInit_delta),
        ("epsilon", "ModInit_epsilon", ModInit_epsilon),
        ("faulty", "ModInit_faulty", ModInit_faulty),
        ("silent", "ModInit_silent", ModInit_silent),
        ("notmod", "ModInit_notmod", ModInit_notmod),
        ("omega", "ModInit_omega", ModInit_omega),
    ];
    for (module, symbol, init) in exports {
        let library = StaticLibrary::new(library_path(module));
        registry.register(library.with_export(symbol, init));
    }
    registry.register(StaticLibrary::new(library_path("empty")));
    Arc::new(registry)
}

/// A runtime whose opener serves the fixture libraries
pub fn runtime_with(builder: RuntimeBuilder) -> (Arc<Runtime>, Arc<StaticLibraryRegistry>) {
    let registry = libraries();
    let runtime = builder.opener(registry.clone()).build().unwrap();
    let key = runtime_key(&runtime);
    INIT_CALLS.lock().retain(|(rt, _), _| *rt != key);
    (runtime, registry)
}

pub fn runtime() -> (Arc<Runtime>, Arc<StaticLibraryRegistry>) {
    runtime_with(Runtime::builder().free_threaded(false))
}

/// Cached fixture modules, by name. Core modules are left out.
pub fn cached_extensions(runtime: &Runtime) -> Vec<String> {
    let mut names: Vec<String> = runtime
        .extensions()
        .keys()
        .into_iter()
        .filter(|(path, _)| path.starts_with("/ext/"))
        .map(|(_, name)| name)
        .collect();
    names.sort();
    names
}
