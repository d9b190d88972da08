//! Library Openers
//!
//! The loader never calls `dlopen` directly. It goes through a
//! [`LibraryOpener`], which hands back an [`ExportLookup`] for the opened
//! library. [`SystemLibraryOpener`](super::SystemLibraryOpener) opens real
//! shared objects; [`StaticLibraryRegistry`] serves export tables that were
//! linked into the host binary, for embedders that ship their extensions
//! statically and for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::RawInitFn;
use crate::error::{ImportError, ImportResult};

/// An opened library
pub trait ExportLookup: Send + Sync {
    fn path(&self) -> &Path;

    /// Look up an exported init function by symbol name
    fn export(&self, symbol: &str) -> Option<RawInitFn>;
}

/// Opens libraries by path
pub trait LibraryOpener: Send + Sync {
    fn open(&self, path: &Path, flags: i32) -> ImportResult<Arc<dyn ExportLookup>>;
}

/// A statically linked "library": a path and its export table
pub struct StaticLibrary {
    path: PathBuf,
    exports: HashMap<String, RawInitFn>,
}

impl StaticLibrary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            exports: HashMap::new(),
        }
    }

    /// Add an export
    pub fn with_export(mut self, symbol: impl Into<String>, init: RawInitFn) -> Self {
        self.exports.insert(symbol.into(), init);
        self
    }

    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.exports.keys().map(|s| s.as_str()).collect();
        symbols.sort_unstable();
        symbols
    }
}

impl ExportLookup for StaticLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn export(&self, symbol: &str) -> Option<RawInitFn> {
        self.exports.get(symbol).copied()
    }
}

/// Registry of statically linked libraries, keyed by path
pub struct StaticLibraryRegistry {
    libraries: RwLock<HashMap<PathBuf, Arc<StaticLibrary>>>,
    opens: AtomicUsize,
}

impl StaticLibraryRegistry {
    pub fn new() -> Self {
        Self {
            libraries: RwLock::new(HashMap::new()),
            opens: AtomicUsize::new(0),
        }
    }

    /// Register a library, replacing any previous one at the same path
    pub fn register(&self, library: StaticLibrary) {
        self.libraries
            .write()
            .insert(library.path.clone(), Arc::new(library));
    }

    /// Whether a library is registered at `path`
    pub fn contains(&self, path: &Path) -> bool {
        self.libraries.read().contains_key(path)
    }

    /// Number of successful `open` calls so far
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn registered_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.libraries.read().keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl Default for StaticLibraryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LibraryOpener for StaticLibraryRegistry {
    fn open(&self, path: &Path, _flags: i32) -> ImportResult<Arc<dyn ExportLookup>> {
        let library = self
            .libraries
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| ImportError::LibraryLoad {
                path: path.display().to_string(),
                reason: "no such library registered".to_string(),
            })?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(library)
    }
}
