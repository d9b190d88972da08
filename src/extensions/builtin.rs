//! Builtin Module Table
//!
//! The table of modules linked into the host binary. Embedders add their
//! own entries through the runtime builder; the table is read-only once the
//! runtime exists. Entries without an init function are core modules
//! (`sys`, `builtins`), which the runtime creates itself for every
//! interpreter and which can never be re-initialized.

use std::path::Path;

use crate::error::RaisedError;
use crate::ffi::{
    extension_suffixes, is_extension_file, platform_tag, InitOutput, RawInitFn, ABI_VERSION,
};
use crate::object::{
    Constant, GilRequirement, Member, ModuleDef, ModuleHandle, MultiInterpSupport, NativeFunction,
    Slot, Value,
};

/// One builtin table entry
#[derive(Clone)]
pub struct InittabEntry {
    name: String,
    init: Option<RawInitFn>,
}

impl InittabEntry {
    pub fn new(name: impl Into<String>, init: RawInitFn) -> Self {
        Self {
            name: name.into(),
            init: Some(init),
        }
    }

    /// A core module entry
    pub fn core(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            init: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn init(&self) -> Option<RawInitFn> {
        self.init
    }

    pub fn is_core(&self) -> bool {
        self.init.is_none()
    }
}

impl std::fmt::Debug for InittabEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InittabEntry")
            .field("name", &self.name)
            .field("core", &self.is_core())
            .finish()
    }
}

/// Result of [`Inittab::status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinStatus {
    NotBuiltin,
    Builtin,
    /// Listed, but cannot be re-initialized
    Core,
}

/// The builtin module table
#[derive(Debug, Clone)]
pub struct Inittab {
    entries: Vec<InittabEntry>,
}

impl Inittab {
    /// The runtime's own entries
    pub fn new() -> Self {
        Self {
            entries: vec![
                InittabEntry::core("sys"),
                InittabEntry::core("builtins"),
                InittabEntry::new("_dynimport", ModInit__dynimport),
            ],
        }
    }

    /// A table with no entries at all
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn append(&mut self, entry: InittabEntry) {
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = InittabEntry>) {
        self.entries.extend(entries);
    }

    /// Entry for `name`. Later entries shadow earlier ones.
    pub fn find(&self, name: &str) -> Option<&InittabEntry> {
        self.entries.iter().rev().find(|entry| entry.name == name)
    }

    pub fn status(&self, name: &str) -> BuiltinStatus {
        match self.find(name) {
            None => BuiltinStatus::NotBuiltin,
            Some(entry) if entry.is_core() => BuiltinStatus::Core,
            Some(_) => BuiltinStatus::Builtin,
        }
    }

    /// Listed module names, sorted and deduplicated
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.name.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Inittab {
    fn default() -> Self {
        Self::new()
    }
}

// Core modules

static SYS_MEMBERS: [Member; 2] = [
    Member::Constant("abi_version", Constant::Str(ABI_VERSION)),
    Member::Constant("implementation", Constant::Str("dynimport")),
];

/// Definition of the `sys` core module
pub static SYS_DEF: ModuleDef = ModuleDef::new("sys")
    .with_doc("Interpreter-level state and configuration.")
    .with_members(&SYS_MEMBERS);

fn builtin_len(_module: &ModuleHandle, args: &[Value]) -> Result<Value, RaisedError> {
    let [arg] = args else {
        return Err(RaisedError::type_error(format!(
            "len() takes exactly one argument ({} given)",
            args.len()
        )));
    };
    let len = match arg {
        Value::Str(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::List(items) => items.len(),
        other => {
            return Err(RaisedError::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(len as i64))
}

fn builtin_repr(_module: &ModuleHandle, args: &[Value]) -> Result<Value, RaisedError> {
    match args {
        [arg] => Ok(Value::Str(arg.to_string())),
        _ => Err(RaisedError::type_error("repr() takes exactly one argument")),
    }
}

const LEN_DOC: &str = "Return the number of items in a container.";

static BUILTINS_MEMBERS: [Member; 4] = [
    Member::Constant("None", Constant::None),
    Member::Constant("True", Constant::Bool(true)),
    Member::Function(NativeFunction::new("len", builtin_len).with_doc(LEN_DOC)),
    Member::Function(NativeFunction::new("repr", builtin_repr)),
];

/// Definition of the `builtins` core module
pub static BUILTINS_DEF: ModuleDef = ModuleDef::new("builtins")
    .with_doc("Built-in functions and constants.")
    .with_members(&BUILTINS_MEMBERS);

/// Definitions of the core modules, in bootstrap order
pub fn core_definitions() -> [&'static ModuleDef; 2] {
    [&SYS_DEF, &BUILTINS_DEF]
}

// The `_dynimport` builtin: a multi-phase module describing the loader.

fn exec_dynimport(module: &ModuleHandle) -> Result<(), RaisedError> {
    let suffixes: Vec<Value> = extension_suffixes()
        .iter()
        .map(|s| Value::from(s.as_str()))
        .collect();
    module.set("extension_suffixes", suffixes);
    module.set("platform_tag", platform_tag());
    Ok(())
}

fn dynimport_is_extension_file(
    _module: &ModuleHandle,
    args: &[Value],
) -> Result<Value, RaisedError> {
    match args {
        [Value::Str(path)] => Ok(Value::Bool(is_extension_file(Path::new(path)))),
        _ => Err(RaisedError::type_error(
            "is_extension_file() takes exactly one str argument",
        )),
    }
}

static DYNIMPORT_MEMBERS: [Member; 2] = [
    Member::Constant("ABI_VERSION", Constant::Str(ABI_VERSION)),
    Member::Function(NativeFunction::new(
        "is_extension_file",
        dynimport_is_extension_file,
    )),
];

static DYNIMPORT_SLOTS: [Slot; 3] = [
    Slot::Exec(exec_dynimport),
    Slot::MultipleInterpreters(MultiInterpSupport::PerInterpreterGil),
    Slot::Gil(GilRequirement::NotUsed),
];

static DYNIMPORT_DEF: ModuleDef = ModuleDef::new("_dynimport")
    .with_doc("Loader introspection.")
    .with_members(&DYNIMPORT_MEMBERS)
    .with_slots(&DYNIMPORT_SLOTS);

crate::module_init! {
    fn ModInit__dynimport(_ctx) {
        Some(InitOutput::Definition(DYNIMPORT_DEF.init()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::module_init! {
        fn ModInit_override(_ctx) {
            None
        }
    }

    #[test]
    fn test_default_table() {
        let inittab = Inittab::new();
        assert_eq!(inittab.status("sys"), BuiltinStatus::Core);
        assert_eq!(inittab.status("builtins"), BuiltinStatus::Core);
        assert_eq!(inittab.status("_dynimport"), BuiltinStatus::Builtin);
        assert_eq!(inittab.status("spam"), BuiltinStatus::NotBuiltin);
    }

    #[test]
    fn test_later_entries_shadow() {
        let mut inittab = Inittab::new();
        inittab.append(InittabEntry::new("sys", ModInit_override));
        assert_eq!(inittab.status("sys"), BuiltinStatus::Builtin);
        assert_eq!(inittab.names(), vec!["_dynimport", "builtins", "sys"]);
    }

    #[test]
    fn test_builtin_len() {
        let module = ModuleHandle::new("builtins");
        module.add_members(&BUILTINS_DEF);
        assert_eq!(
            module.call("len", &[Value::from("héllo")]).unwrap(),
            Value::Int(5)
        );
        let err = module.call("len", &[Value::Int(1)]).unwrap_err();
        assert_eq!(err.message(), "object of type 'int' has no len()");
    }
}
