//! Extension Loader Integration Tests
//!
//! End-to-end loads of the fixture extensions in `common` through the
//! runtime: first loads, cache reuse across interpreters, the
//! subinterpreter gate and the malformed-result taxonomy.

mod common;

use common::{cached_extensions, init_calls, spec, ALPHA, BETA};
use dynimport::interpreter::InterpreterConfig;
use dynimport::{ImportError, TriState, Value};

// ============================================================================
// Single-phase modules
// ============================================================================

#[test]
fn test_stateful_module_reinitialized_on_reload() {
    let (runtime, _libs) = common::runtime();
    let main = runtime.main_interpreter();
    let loader = runtime.loader();

    let first = loader.create_extension(main, &spec("alpha")).unwrap();
    let second = loader.create_extension(main, &spec("alpha")).unwrap();

    assert_eq!(init_calls(&runtime, "alpha"), 2);
    assert!(!first.ptr_eq(&second));
    assert_eq!(cached_extensions(&runtime).len(), 1);

    // Each copy has its own state
    assert_eq!(first.call("bump", &[]).unwrap(), Value::Int(1));
    assert_eq!(first.call("bump", &[]).unwrap(), Value::Int(2));
    assert_eq!(second.call("bump", &[]).unwrap(), Value::Int(1));
    assert_eq!(second.get("kind"), Some(Value::from("stateful")));

    // The latest copy is the one the interpreter sees
    let index = ALPHA.index().unwrap();
    assert!(main.modules_by_index().get(index).unwrap().ptr_eq(&second));
    assert!(main.modules().get("alpha").unwrap().ptr_eq(&second));
}

#[test]
fn test_stateless_module_copied_from_snapshot() {
    let (runtime, libs) = common::runtime();
    let main = runtime.main_interpreter();

    let in_main = runtime
        .import_dynamic(main, "beta", "/ext/beta.so")
        .unwrap();
    let sub = runtime
        .new_interpreter(InterpreterConfig::legacy())
        .unwrap();
    let in_sub = runtime
        .import_dynamic(&sub, "beta", "/ext/beta.so")
        .unwrap();

    assert_eq!(init_calls(&runtime, "beta"), 1);
    assert_eq!(libs.open_count(), 1);
    assert_eq!(cached_extensions(&runtime).len(), 1);
    assert!(!in_main.ptr_eq(&in_sub));

    assert_eq!(in_sub.get("answer"), Some(Value::Int(42)));
    assert_eq!(in_sub.get("greeting"), Some(Value::from("hello")));
    assert_eq!(in_sub.get("__file__"), Some(Value::from("/ext/beta.so")));
    assert!(sub.modules_by_index().get(BETA.index().unwrap()).is_some());

    // Changes to one copy stay in that copy
    in_sub.set("greeting", "changed");
    assert_eq!(in_main.get("greeting"), Some(Value::from("hello")));

    let other = runtime
        .new_interpreter(InterpreterConfig::legacy())
        .unwrap();
    let in_other = runtime
        .import_dynamic(&other, "beta", "/ext/beta.so")
        .unwrap();
    assert_eq!(in_other.get("greeting"), Some(Value::from("hello")));
}

#[test]
fn test_stateless_reload_in_same_interpreter() {
    let (runtime, _libs) = common::runtime();
    let main = runtime.main_interpreter();
    let loader = runtime.loader();

    let first = loader.create_extension(main, &spec("beta")).unwrap();
    let second = loader.create_extension(main, &spec("beta")).unwrap();

    assert_eq!(init_calls(&runtime, "beta"), 1);
    assert!(!first.ptr_eq(&second));
    let snapshot = runtime
        .extensions()
        .get("/ext/beta.so", "beta")
        .unwrap()
        .snapshot()
        .cloned()
        .unwrap();
    assert_eq!(second.namespace(), *snapshot);
    assert_eq!(first.namespace(), second.namespace());
}

#[test]
fn test_first_load_from_subinterpreter_runs_init_on_main() {
    let (runtime, _libs) = common::runtime();
    let sub = runtime
        .new_interpreter(InterpreterConfig::legacy())
        .unwrap();

    let module = runtime
        .import_dynamic(&sub, "beta", "/ext/beta.so")
        .unwrap();

    assert_eq!(module.get("init_interp"), Some(Value::Int(0)));
    assert!(sub.modules().get("beta").unwrap().ptr_eq(&module));
    assert!(runtime.extensions().get("/ext/beta.so", "beta").is_some());

    // Main is served from the cache without running init again
    let main = runtime.main_interpreter();
    runtime
        .import_dynamic(main, "beta", "/ext/beta.so")
        .unwrap();
    assert_eq!(init_calls(&runtime, "beta"), 1);
}

#[test]
fn test_nonascii_name_requires_multi_phase() {
    let (runtime, _libs) = common::runtime();
    let main = runtime.main_interpreter();

    let err = runtime
        .import_dynamic(main, "gämma", "/ext/gamma.so")
        .unwrap_err();

    match err {
        ImportError::NonAsciiRequiresMultiPhase { ref name } => assert_eq!(name, "gämma"),
        other => panic!("expected a multi-phase requirement, got {:?}", other),
    }
    assert_eq!(init_calls(&runtime, "gämma"), 1);
    assert!(cached_extensions(&runtime).is_empty());
    assert!(!main.modules().contains("gämma"));
}

#[test]
fn test_init_importing_itself_reuses_inner_cache_entry() {
    let (runtime, _libs) = common::runtime();
    let main = runtime.main_interpreter();
    let sub = runtime
        .new_interpreter(InterpreterConfig::legacy())
        .unwrap();

    let module = runtime
        .import_dynamic(&sub, "omega", "/ext/omega.so")
        .unwrap();

    // Outer and nested init both ran; only one cache entry exists
    assert_eq!(init_calls(&runtime, "omega"), 2);
    assert_eq!(cached_extensions(&runtime), vec!["omega"]);
    assert!(sub.modules().get("omega").unwrap().ptr_eq(&module));
    assert!(main.modules().contains("omega"));

    // The nested load cached first, so its namespace is the one copied
    assert_eq!(module.get("nested"), Some(Value::Bool(true)));
    assert!(!module.contains("inner_import_ok"));
    assert_eq!(module.get("__file__"), Some(Value::from("/ext/omega.so")));
}

// ============================================================================
// Subinterpreter gate
// ============================================================================

#[test]
fn test_override_denies_cached_module() {
    let (runtime, libs) = common::runtime();
    let main = runtime.main_interpreter();
    runtime
        .import_dynamic(main, "beta", "/ext/beta.so")
        .unwrap();
    let opens = libs.open_count();

    let sub = runtime
        .new_interpreter(InterpreterConfig::legacy())
        .unwrap();
    let previous = sub
        .override_subinterpreter_check(TriState::ForceOn)
        .unwrap();
    assert_eq!(previous, TriState::Inherit);

    let err = runtime
        .import_dynamic(&sub, "beta", "/ext/beta.so")
        .unwrap_err();
    assert!(matches!(
        err,
        ImportError::SubinterpreterIncompatible { .. }
    ));
    assert_eq!(err.kind_name(), "ImportError");

    // Nothing was touched on the way out
    assert_eq!(libs.open_count(), opens);
    assert_eq!(init_calls(&runtime, "beta"), 1);
    assert!(runtime.extensions().get("/ext/beta.so", "beta").is_some());
    assert!(!sub.modules().contains("beta"));

    // Lifting the override lets the same interpreter through
    sub
        .override_subinterpreter_check(TriState::ForceOff)
        .unwrap();
    assert!(runtime.import_dynamic(&sub, "beta", "/ext/beta.so").is_ok());
}

#[test]
fn test_isolated_subinterpreter_refuses_first_load() {
    let (runtime, _libs) = common::runtime();
    let sub = runtime.new_subinterpreter().unwrap();

    let err = runtime
        .import_dynamic(&sub, "alpha", "/ext/alpha.so")
        .unwrap_err();

    match err {
        ImportError::SubinterpreterIncompatible { ref name } => assert_eq!(name, "alpha"),
        other => panic!("expected a subinterpreter refusal, got {:?}", other),
    }
    // The init function ran under main and its result stays cached
    assert_eq!(init_calls(&runtime, "alpha"), 1);
    assert!(runtime.extensions().get("/ext/alpha.so", "alpha").is_some());
    assert!(!sub.modules().contains("alpha"));
}

#[test]
fn test_override_rejected_on_main() {
    let (runtime, _libs) = common::runtime();
    let err = runtime
        .main_interpreter()
        .override_subinterpreter_check(TriState::ForceOff)
        .unwrap_err();
    assert!(matches!(err, ImportError::MainInterpreterOverride));
}

// ============================================================================
// Multi-phase modules
// ============================================================================

#[test]
fn test_multi_phase_module_built_per_interpreter() {
    let (runtime, _libs) = common::runtime();
    let main = runtime.main_interpreter();
    let sub = runtime.new_subinterpreter().unwrap();

    let in_main = runtime
        .import_dynamic(main, "delta", "/ext/delta.so")
        .unwrap();
    let in_sub = runtime
        .import_dynamic(&sub, "delta", "/ext/delta.so")
        .unwrap();

    assert_eq!(init_calls(&runtime, "delta"), 2);
    assert!(cached_extensions(&runtime).is_empty());
    assert!(!in_main.ptr_eq(&in_sub));

    assert_eq!(in_main.get("ready"), Some(Value::Bool(true)));
    assert_eq!(in_sub.get("ready"), Some(Value::Bool(true)));
    assert_eq!(in_main.call("bump", &[]).unwrap(), Value::Int(1));
    assert_eq!(in_main.call("bump", &[]).unwrap(), Value::Int(2));
    assert_eq!(in_sub.call("bump", &[]).unwrap(), Value::Int(1));

    // A second import in the same interpreter is a registry hit
    let again = runtime
        .import_dynamic(main, "delta", "/ext/delta.so")
        .unwrap();
    assert!(again.ptr_eq(&in_main));
    assert_eq!(init_calls(&runtime, "delta"), 2);
}

// ============================================================================
// Failed loads
// ============================================================================

#[test]
fn test_init_exception_propagates_verbatim() {
    let (runtime, _libs) = common::runtime();
    let main = runtime.main_interpreter();

    match runtime.import_dynamic(main, "faulty", "/ext/faulty.so") {
        Err(ImportError::Exception(raised)) => {
            assert_eq!(raised.kind(), "ValueError");
            assert_eq!(raised.message(), "faulty init");
        }
        other => panic!(
            "expected the init exception, got {:?}",
            other.map(|m| m.name().to_string())
        ),
    }
    assert!(!main.modules().contains("faulty"));
    assert!(cached_extensions(&runtime).is_empty());
}

#[test]
fn test_malformed_results() {
    let (runtime, _libs) = common::runtime();
    let main = runtime.main_interpreter();

    let err = runtime
        .import_dynamic(main, "silent", "/ext/silent.so")
        .unwrap_err();
    assert!(matches!(err, ImportError::MissingResult { .. }));
    assert_eq!(err.kind_name(), "SystemError");

    let err = runtime
        .import_dynamic(main, "notmod", "/ext/notmod.so")
        .unwrap_err();
    assert!(matches!(err, ImportError::NotAModule { .. }));

    assert!(cached_extensions(&runtime).is_empty());
}

#[test]
fn test_library_errors() {
    let (runtime, _libs) = common::runtime();
    let main = runtime.main_interpreter();

    let err = runtime
        .import_dynamic(main, "empty", "/ext/empty.so")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "dynamic module does not define module export function (ModInit_empty)"
    );

    let err = runtime
        .import_dynamic(main, "nowhere", "/ext/nowhere.so")
        .unwrap_err();
    assert!(matches!(err, ImportError::LibraryLoad { .. }));
}

// ============================================================================
// Cache maintenance
// ============================================================================

#[test]
fn test_clear_extension_forces_fresh_init() {
    let (runtime, _libs) = common::runtime();
    let main = runtime.main_interpreter();
    let loader = runtime.loader();

    loader.create_extension(main, &spec("beta")).unwrap();
    let index = BETA.index().unwrap();

    loader
        .clear_extension(main, "/ext/beta.so", "beta")
        .unwrap();
    assert!(cached_extensions(&runtime).is_empty());
    assert!(main.modules_by_index().get(index).is_none());

    loader.create_extension(main, &spec("beta")).unwrap();
    assert_eq!(init_calls(&runtime, "beta"), 2);
    assert_eq!(BETA.index(), Some(index));

    // Other modules keep their index
    loader.create_extension(main, &spec("alpha")).unwrap();
    let alpha_index = ALPHA.index().unwrap();
    loader
        .clear_extension(main, "/ext/beta.so", "beta")
        .unwrap();
    loader.create_extension(main, &spec("beta")).unwrap();
    assert_eq!(ALPHA.index(), Some(alpha_index));
    assert_ne!(alpha_index, index);

    // Clearing something that was never cached is a no-op
    loader
        .clear_extension(main, "/ext/nowhere.so", "nowhere")
        .unwrap();
}

#[test]
fn test_shutdown_drops_cache() {
    let (runtime, _libs) = common::runtime();
    let main = runtime.main_interpreter();
    runtime
        .import_dynamic(main, "alpha", "/ext/alpha.so")
        .unwrap();
    runtime
        .import_dynamic(main, "beta", "/ext/beta.so")
        .unwrap();

    assert_eq!(cached_extensions(&runtime), vec!["alpha", "beta"]);
    // Fixture modules plus sys and builtins
    assert_eq!(runtime.shutdown(), 4);
    assert!(runtime.extensions().is_empty());
}
