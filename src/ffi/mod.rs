//! FFI Module for dynimport
//!
//! The native boundary of the loader: opening shared libraries, resolving
//! module export functions and calling them.
//!
//! # Architecture
//!
//! ```text
//! ModuleSpec (name, path)
//!       │
//!       ▼
//! LibraryOpener ──► ExportLookup (libloading or static table)
//!       │
//!       ▼
//! ExportSymbolResolver (ModInit_<name> / ModInitU_<punycode>)
//!       │
//!       ▼
//! InitInvocation (unsafe extern "C" call, captures output + raised error)
//! ```
//!
//! # Example
//!
//! ```ignore
//! let opener = SystemLibraryOpener::new();
//! let library = opener.open(Path::new("/path/to/spam.so"), default_dlopen_flags())?;
//! let (init, symbol) = ExportSymbolResolver::resolve(&*library, "spam")?;
//! ```

mod loader;
mod registry;
mod suffixes;
mod symbol;
mod types;

pub use loader::{default_dlopen_flags, parse_dlopen_flag, DynamicLibrary, SystemLibraryOpener};
pub use registry::{ExportLookup, LibraryOpener, StaticLibrary, StaticLibraryRegistry};
pub use suffixes::{
    extension_suffixes, is_extension_file, locate_extension, platform_tag, ABI_VERSION,
    STABLE_ABI_TAG,
};
pub use symbol::{
    punycode_encode, ExportSymbol, ExportSymbolResolver, ASCII_EXPORT_PREFIX,
    NONASCII_EXPORT_PREFIX,
};
pub use types::{InitContext, InitInvocation, InitOutput, RawInitFn};
