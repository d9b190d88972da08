//! Module specifications.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Where a module's init function comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginKind {
    /// `sys`, `builtins`: created by the runtime itself, never re-initialized
    Core,
    /// Linked into the host binary and listed in the builtin table
    Builtin,
    /// Loaded from a shared library
    Dynamic,
}

impl fmt::Display for OriginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OriginKind::Core => "core",
            OriginKind::Builtin => "builtin",
            OriginKind::Dynamic => "dynamic",
        };
        f.write_str(s)
    }
}

/// What to load: created per load attempt.
///
/// `origin_path` is the module name for core and builtin modules and the
/// library path for dynamic ones. Together with the name it keys the
/// extension cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    name: String,
    origin_path: String,
    origin: OriginKind,
    filename: Option<PathBuf>,
}

impl ModuleSpec {
    pub fn builtin(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            origin_path: name.clone(),
            name,
            origin: OriginKind::Builtin,
            filename: None,
        }
    }

    pub fn core(name: impl Into<String>) -> Self {
        Self {
            origin: OriginKind::Core,
            ..Self::builtin(name)
        }
    }

    pub fn dynamic(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            name: name.into(),
            origin_path: path.display().to_string(),
            origin: OriginKind::Dynamic,
            filename: Some(path.to_path_buf()),
        }
    }

    /// Fully qualified module name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin_path(&self) -> &str {
        &self.origin_path
    }

    pub fn origin(&self) -> OriginKind {
        self.origin
    }

    /// Library file, for dynamic modules
    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Name after the last dot
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Hint handed to init functions so nested definitions resolve to the
    /// qualified name
    pub fn package_context(&self) -> Option<String> {
        Some(self.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_paths() {
        let builtin = ModuleSpec::builtin("_dynimport");
        assert_eq!(builtin.origin_path(), "_dynimport");
        assert!(builtin.filename().is_none());

        let core = ModuleSpec::core("sys");
        assert_eq!(core.origin(), OriginKind::Core);
        assert_eq!(core.origin_path(), "sys");

        let dynamic = ModuleSpec::dynamic("pkg.spam", "/ext/spam.so");
        assert_eq!(dynamic.origin_path(), "/ext/spam.so");
        assert_eq!(dynamic.short_name(), "spam");
        assert_eq!(dynamic.filename(), Some(Path::new("/ext/spam.so")));
    }
}
