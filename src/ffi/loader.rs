//! Dynamic Library Loader
//!
//! Safe wrapper around libloading for opening extension shared objects.
//! Handles are never closed: an extension may keep process-global state
//! (static definitions, registered callbacks) that must outlive every
//! interpreter.

use std::collections::HashMap;
use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{ExportLookup, LibraryOpener, RawInitFn};
use crate::error::{ImportError, ImportResult};

/// A dynamically loaded library
pub struct DynamicLibrary {
    /// Path to the library
    path: PathBuf,
    /// The loaded library handle
    library: libloading::Library,
    /// Cached export lookups
    exports: Mutex<HashMap<String, Option<RawInitFn>>>,
}

impl DynamicLibrary {
    /// Open a library with the given `dlopen` flags (ignored off unix)
    pub fn open(path: impl AsRef<Path>, flags: i32) -> ImportResult<Self> {
        let path = path.as_ref().to_path_buf();

        // Safety: opening a library runs its constructors. The caller asked
        // for this path to be imported, so it is trusted the same way an
        // import of native code is.
        let library = unsafe { open_with_flags(&path, flags) }.map_err(|e| {
            ImportError::LibraryLoad {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        debug!(path = %path.display(), flags, "opened dynamic library");
        Ok(Self {
            path,
            library,
            exports: Mutex::new(HashMap::new()),
        })
    }

    /// Get the path to this library
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lookup(&self, symbol: &str) -> Option<RawInitFn> {
        // Check cache first
        if let Some(cached) = self.exports.lock().get(symbol) {
            return *cached;
        }

        let c_name = CString::new(symbol).ok()?;

        // Safety: the symbol is only ever called through InitInvocation,
        // whose contract requires it to have the RawInitFn signature.
        let found = unsafe {
            self.library
                .get::<RawInitFn>(c_name.as_bytes_with_nul())
                .ok()
                .map(|sym| *sym)
        };

        self.exports.lock().insert(symbol.to_string(), found);
        found
    }
}

impl ExportLookup for DynamicLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn export(&self, symbol: &str) -> Option<RawInitFn> {
        self.lookup(symbol)
    }
}

#[cfg(unix)]
unsafe fn open_with_flags(
    path: &Path,
    flags: i32,
) -> Result<libloading::Library, libloading::Error> {
    let library = unsafe { libloading::os::unix::Library::open(Some(path), flags)? };
    Ok(library.into())
}

#[cfg(not(unix))]
unsafe fn open_with_flags(
    path: &Path,
    _flags: i32,
) -> Result<libloading::Library, libloading::Error> {
    unsafe { libloading::Library::new(path) }
}

/// Opens real shared objects, keeping one handle per path
pub struct SystemLibraryOpener {
    handles: Mutex<HashMap<PathBuf, Arc<DynamicLibrary>>>,
}

impl SystemLibraryOpener {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// List opened libraries
    pub fn opened_libraries(&self) -> Vec<PathBuf> {
        self.handles.lock().keys().cloned().collect()
    }
}

impl Default for SystemLibraryOpener {
    fn default() -> Self {
        Self::new()
    }
}

impl LibraryOpener for SystemLibraryOpener {
    fn open(&self, path: &Path, flags: i32) -> ImportResult<Arc<dyn ExportLookup>> {
        let mut handles = self.handles.lock();
        if let Some(library) = handles.get(path) {
            return Ok(Arc::clone(library) as Arc<dyn ExportLookup>);
        }

        let library = Arc::new(DynamicLibrary::open(path, flags)?);
        handles.insert(path.to_path_buf(), Arc::clone(&library));
        Ok(library)
    }
}

/// Default `dlopen` flags for new interpreters
pub fn default_dlopen_flags() -> i32 {
    #[cfg(unix)]
    {
        libc::RTLD_NOW
    }

    #[cfg(not(unix))]
    {
        0
    }
}

/// Parse a `dlopen` flag name (`"now"`, `"global"`, ...)
pub fn parse_dlopen_flag(name: &str) -> Option<i32> {
    #[cfg(unix)]
    {
        match name.to_ascii_lowercase().trim_start_matches("rtld_") {
            "lazy" => Some(libc::RTLD_LAZY),
            "now" => Some(libc::RTLD_NOW),
            "global" => Some(libc::RTLD_GLOBAL),
            "local" => Some(libc::RTLD_LOCAL),
            "nodelete" => Some(libc::RTLD_NODELETE),
            "noload" => Some(libc::RTLD_NOLOAD),
            _ => None,
        }
    }

    #[cfg(not(unix))]
    {
        let _ = name;
        None
    }
}
