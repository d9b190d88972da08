//! dynimport - Extension Module Loader and Cache Engine
//!
//! The part of an embeddable scripting runtime that turns an import request
//! for a native extension into a module object. It locates the module's
//! init function (in a shared library, the builtin table or the frozen
//! table), runs it under the right interpreter, classifies what came back
//! and caches single-phase modules so later imports never run their init
//! code twice.
//!
//! # Features
//!
//! - **Single- and multi-phase modules**: legacy modules are initialized once
//!   per process and copied into later importers; multi-phase modules are
//!   built fresh in every interpreter
//! - **Multiple interpreters**: single-phase init code always runs under the
//!   main interpreter, and isolated subinterpreters refuse legacy modules
//!   before any native code runs
//! - **Process-wide extension cache** keyed by `(path, name)`
//! - **Re-entrant import lock** per interpreter
//! - **Frozen modules**: layered bootstrap/override/standard/test sets with
//!   aliases
//! - **Free-threaded mode**: legacy modules that never declared themselves
//!   lock-free enable the GIL for good
//!
//! # Example
//!
//! ```rust
//! use dynimport::runtime::Runtime;
//!
//! let runtime = Runtime::builder().build().unwrap();
//! let main = runtime.main_interpreter();
//!
//! // `_dynimport` is a multi-phase builtin module
//! let module = runtime.import_builtin(main, "_dynimport").unwrap();
//! assert!(module.contains("extension_suffixes"));
//!
//! // Frozen modules run through the runtime's code executor
//! let hello = runtime.import_frozen_module(main, "__hello__").unwrap().unwrap();
//! assert_eq!(hello.get("initialized").and_then(|v| v.as_bool()), Some(true));
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ModuleSpec    │  name + origin (dynamic path, builtin, core)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐    hit    ┌──────────────────────┐
//! │ ExtensionCache  │──────────►│ reload in requester  │
//! └────────┬────────┘           └──────────────────────┘
//!          │ miss
//!          ▼
//! ┌─────────────────┐
//! │ ExportSymbol-   │  ModInit_<name> / ModInitU_<punycode>
//! │ Resolver        │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Interpreter-    │  init runs under the main interpreter
//! │ Switcher        │
//! └────────┬────────┘
//!          │
//!     ┌────┴─────┐
//!     ▼          ▼
//! ┌────────┐ ┌──────────┐
//! │ single │ │  multi   │  cache + index table / build per import
//! └────────┘ └──────────┘
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod exec;
pub mod extensions;
pub mod ffi;
pub mod frozen;
pub mod interpreter;
pub mod object;
pub mod runtime;

// Re-export commonly used types
pub use error::{ImportError, ImportResult, RaisedError};
pub use extensions::{
    BuiltinStatus, CachedExtensionValue, ExtensionCache, ExtensionLoader, InittabEntry,
    ModuleSpec, OriginKind,
};
pub use ffi::{InitContext, InitOutput, RawInitFn};
pub use frozen::{FrozenModule, FrozenModuleTable, FrozenStatus};
pub use interpreter::{Interpreter, InterpreterConfig, TriState};
pub use object::{ModuleDef, ModuleHandle, Namespace, Value};
pub use runtime::{Runtime, RuntimeBuilder, RuntimeConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
