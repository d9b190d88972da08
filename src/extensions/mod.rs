//! Extension Modules
//!
//! Loading, caching and re-initializing native extension modules.
//!
//! # Module kinds
//!
//! - **Single-phase** modules build a finished module in their init
//!   function. They can run their init code at most once per definition
//!   for stateless modules, so the first load is cached process-wide and
//!   later imports are served from the cache.
//! - **Multi-phase** modules return a definition and are built fresh for
//!   every import, in the importing interpreter. They are never cached.
//!
//! # Origins
//!
//! ```text
//! dynamic ── shared library on disk, keyed by file path
//! builtin ── linked into the host, listed in the builtin table
//! core    ── `sys` / `builtins`, created by the runtime itself
//! ```
//!
//! # Example
//!
//! ```ignore
//! let runtime = Runtime::builder().build()?;
//! let interp = runtime.main_interpreter();
//! let spec = ModuleSpec::dynamic("spam", "/opt/ext/spam.so");
//! let module = runtime.loader().import_extension(interp, &spec)?;
//! ```

mod builtin;
mod cache;
mod classify;
mod gil;
mod loader;
mod spec;

pub use builtin::{
    core_definitions, BuiltinStatus, Inittab, InittabEntry, BUILTINS_DEF, SYS_DEF,
};
pub use cache::{CachedExtensionValue, ExtensionCache, ReloadStrategy};
pub use classify::{Classified, LoaderResult, MalformedKind, ModuleKind};
pub use gil::GilController;
pub use loader::ExtensionLoader;
pub use spec::{ModuleSpec, OriginKind};
