//! Frozen Modules
//!
//! Modules whose code is compiled into the host binary. The table is
//! layered:
//!
//! ```text
//! bootstrap  ── always searched
//! overrides  ── embedder-supplied, fixed when the runtime is built
//! standard   ── only when the interpreter uses frozen modules
//! test       ── only when the interpreter uses frozen modules
//! ```
//!
//! Aliases are resolved to their canonical name before the walk, so an
//! alias never holds code of its own. An entry without a payload is
//! present but excluded, which callers see as a different status from a
//! missing name.

mod data;

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::error::{ImportError, ImportResult};
use crate::exec::CodeExecutor;
use crate::interpreter::Interpreter;
use crate::object::{ModuleHandle, Value};

pub use data::{ALIASES, BOOTSTRAP_MODULES, STANDARD_MODULES, TEST_MODULES};

/// One frozen module record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrozenModule {
    name: &'static str,
    code: Option<&'static [u8]>,
    is_package: bool,
}

impl FrozenModule {
    pub const fn new(name: &'static str, code: &'static [u8]) -> Self {
        Self {
            name,
            code: Some(code),
            is_package: false,
        }
    }

    pub const fn package(name: &'static str, code: &'static [u8]) -> Self {
        Self {
            name,
            code: Some(code),
            is_package: true,
        }
    }

    /// A listed module whose code was left out of the build
    pub const fn excluded(name: &'static str) -> Self {
        Self {
            name,
            code: None,
            is_package: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn code(&self) -> Option<&'static [u8]> {
        self.code
    }

    pub fn is_package(&self) -> bool {
        self.is_package
    }

    fn status(&self) -> FrozenStatus {
        match self.code {
            None => FrozenStatus::Excluded,
            Some(code) if code.first().map_or(true, |b| *b == 0) => FrozenStatus::Invalid,
            Some(_) => FrozenStatus::Okay,
        }
    }
}

/// An alternative name for a frozen module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrozenAlias {
    alias: &'static str,
    canonical: &'static str,
}

impl FrozenAlias {
    pub const fn new(alias: &'static str, canonical: &'static str) -> Self {
        Self { alias, canonical }
    }

    pub fn alias(&self) -> &'static str {
        self.alias
    }

    pub fn canonical(&self) -> &'static str {
        self.canonical
    }
}

/// Which layer of the table an entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrozenSet {
    Bootstrap,
    Override,
    Standard,
    Test,
}

impl fmt::Display for FrozenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrozenSet::Bootstrap => "bootstrap",
            FrozenSet::Override => "override",
            FrozenSet::Standard => "standard",
            FrozenSet::Test => "test",
        };
        f.write_str(name)
    }
}

/// Outcome of a frozen lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrozenStatus {
    Okay,
    BadName,
    NotFound,
    /// Only in a gated set, and frozen modules are turned off
    Disabled,
    Excluded,
    Invalid,
}

impl FrozenStatus {
    /// The error reported for `name` with this status, if any
    pub fn into_error(self, name: &str) -> Option<ImportError> {
        let name = name.to_string();
        match self {
            FrozenStatus::Okay => None,
            FrozenStatus::BadName | FrozenStatus::NotFound => {
                Some(ImportError::FrozenNotFound { name })
            }
            FrozenStatus::Disabled => Some(ImportError::FrozenDisabled { name }),
            FrozenStatus::Excluded => Some(ImportError::FrozenExcluded { name }),
            FrozenStatus::Invalid => Some(ImportError::FrozenInvalid { name }),
        }
    }

    /// Statuses that mean "not a frozen module here" rather than an error
    fn is_absent(self) -> bool {
        matches!(
            self,
            FrozenStatus::BadName | FrozenStatus::NotFound | FrozenStatus::Disabled
        )
    }
}

impl fmt::Display for FrozenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrozenStatus::Okay => "okay",
            FrozenStatus::BadName => "bad-name",
            FrozenStatus::NotFound => "not-found",
            FrozenStatus::Disabled => "disabled",
            FrozenStatus::Excluded => "excluded",
            FrozenStatus::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// A located entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrozenLookup {
    pub module: &'static FrozenModule,
    pub set: FrozenSet,
    /// Canonical name the entry was found under
    pub origname: &'static str,
    pub status: FrozenStatus,
}

/// Payload and metadata of a usable frozen module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrozenInfo {
    pub name: String,
    #[serde(skip)]
    pub data: &'static [u8],
    pub is_package: bool,
    pub origname: String,
    pub set: FrozenSet,
}

/// The layered frozen module table
#[derive(Debug, Clone)]
pub struct FrozenModuleTable {
    bootstrap: &'static [FrozenModule],
    overrides: &'static [FrozenModule],
    standard: &'static [FrozenModule],
    test: &'static [FrozenModule],
    aliases: &'static [FrozenAlias],
}

impl FrozenModuleTable {
    /// The shipped sets, with no embedder overrides
    pub fn new() -> Self {
        Self {
            bootstrap: &BOOTSTRAP_MODULES,
            overrides: &[],
            standard: &STANDARD_MODULES,
            test: &TEST_MODULES,
            aliases: &ALIASES,
        }
    }

    pub fn with_overrides(mut self, overrides: &'static [FrozenModule]) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn overrides(&self) -> &'static [FrozenModule] {
        self.overrides
    }

    /// Canonical name for `name`, after alias substitution
    pub fn resolve_alias<'a>(&self, name: &'a str) -> &'a str {
        self.aliases
            .iter()
            .find(|a| a.alias == name)
            .map_or(name, |a| a.canonical)
    }

    /// Alias entries pointing at `canonical`
    pub fn aliases_of(&self, canonical: &str) -> Vec<&'static str> {
        self.aliases
            .iter()
            .filter(|a| a.canonical == canonical)
            .map(|a| a.alias)
            .collect()
    }

    /// Walk the table for `name`.
    ///
    /// `Err` carries the status when no entry was found at all.
    pub fn lookup(&self, name: &str, use_frozen: bool) -> Result<FrozenLookup, FrozenStatus> {
        if name.is_empty() {
            return Err(FrozenStatus::BadName);
        }
        let canonical = self.resolve_alias(name);

        let found = |set: &'static [FrozenModule], kind: FrozenSet| {
            set.iter().find(|m| m.name == canonical).map(|module| FrozenLookup {
                module,
                set: kind,
                origname: module.name,
                status: module.status(),
            })
        };

        if let Some(hit) = found(self.bootstrap, FrozenSet::Bootstrap)
            .or_else(|| found(self.overrides, FrozenSet::Override))
        {
            return Ok(hit);
        }

        let gated = found(self.standard, FrozenSet::Standard)
            .or_else(|| found(self.test, FrozenSet::Test));
        match gated {
            Some(hit) if use_frozen => Ok(hit),
            Some(_) => Err(FrozenStatus::Disabled),
            None => Err(FrozenStatus::NotFound),
        }
    }

    pub fn status(&self, name: &str, use_frozen: bool) -> FrozenStatus {
        match self.lookup(name, use_frozen) {
            Ok(hit) => hit.status,
            Err(status) => status,
        }
    }

    /// Locate a usable entry without executing it.
    ///
    /// Missing and disabled names are `Ok(None)`; excluded and invalid
    /// entries are errors.
    pub fn find_frozen(&self, name: &str, use_frozen: bool) -> ImportResult<Option<FrozenInfo>> {
        let hit = match self.lookup(name, use_frozen) {
            Ok(hit) => hit,
            Err(status) => {
                debug_assert!(status.is_absent());
                return Ok(None);
            }
        };
        if let Some(err) = hit.status.into_error(name) {
            return Err(err);
        }
        Ok(hit.module.code.map(|data| FrozenInfo {
            name: name.to_string(),
            data,
            is_package: hit.module.is_package,
            origname: hit.origname.to_string(),
            set: hit.set,
        }))
    }

    pub fn is_frozen(&self, name: &str, use_frozen: bool) -> bool {
        self.status(name, use_frozen) == FrozenStatus::Okay
    }

    /// Whether `name` is a frozen package. Excluded entries still answer.
    pub fn is_frozen_package(&self, name: &str, use_frozen: bool) -> ImportResult<bool> {
        match self.lookup(name, use_frozen) {
            Ok(hit) if matches!(hit.status, FrozenStatus::Okay | FrozenStatus::Excluded) => {
                Ok(hit.module.is_package)
            }
            Ok(hit) => Err(hit.status.into_error(name).unwrap_or(ImportError::FrozenInvalid {
                name: name.to_string(),
            })),
            Err(status) => Err(status.into_error(name).unwrap_or(ImportError::FrozenNotFound {
                name: name.to_string(),
            })),
        }
    }

    /// Names that would be found with this setting, bootstrap first.
    ///
    /// Overrides are appended unless a shipped set already lists the name.
    pub fn list_frozen_names(&self, use_frozen: bool) -> Vec<String> {
        let mut names: Vec<String> = self.bootstrap.iter().map(|m| m.name.to_string()).collect();
        if use_frozen {
            let shipped = self.standard.iter().chain(self.test);
            names.extend(shipped.map(|m| m.name.to_string()));
        }
        for module in self.overrides {
            if !names.iter().any(|n| n == module.name) {
                names.push(module.name.to_string());
            }
        }
        names
    }

    /// Import frozen module `name` into `interp`.
    ///
    /// Returns `Ok(None)` when there is no such frozen module here. The
    /// module is published before its code runs and withdrawn again if the
    /// code fails.
    pub fn import(
        &self,
        interp: &Interpreter,
        executor: &dyn CodeExecutor,
        name: &str,
    ) -> ImportResult<Option<ModuleHandle>> {
        let _lock = interp.import_lock().guard();
        let Some(info) = self.find_frozen(name, interp.use_frozen())? else {
            debug!(module = name, "no frozen module");
            return Ok(None);
        };

        let module = interp.modules().get_or_add(name);
        if info.is_package {
            module.set("__path__", Value::List(Vec::new()));
        }
        if let Err(err) = executor.exec(name, info.data, &module) {
            interp.modules().remove(name);
            return Err(err.into());
        }
        module.set("__origname__", info.origname.as_str());

        debug!(module = name, set = %info.set, "imported frozen module");
        Ok(Some(module))
    }
}

impl Default for FrozenModuleTable {
    fn default() -> Self {
        Self::new()
    }
}
