//! Import Errors
//!
//! Error taxonomy for the loader. Native code reports failures as
//! [`RaisedError`] values; the loader converts everything it surfaces to
//! callers into an [`ImportError`].

use thiserror::Error;

/// An error raised by native code (an init function, a create/exec slot or a
/// module function).
///
/// Carries the kind name the native code chose (`"ValueError"`,
/// `"MemoryError"`, ...) so it can be propagated without rewording.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct RaisedError {
    kind: String,
    message: String,
    #[source]
    cause: Option<Box<RaisedError>>,
}

impl RaisedError {
    /// Create an error of an arbitrary kind
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Resource exhaustion
    pub fn memory(message: impl Into<String>) -> Self {
        Self::new("MemoryError", message)
    }

    /// Internal or API misuse error
    pub fn system(message: impl Into<String>) -> Self {
        Self::new("SystemError", message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new("RuntimeError", message)
    }

    pub fn import(message: impl Into<String>) -> Self {
        Self::new("ImportError", message)
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new("ValueError", message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    pub fn attribute(message: impl Into<String>) -> Self {
        Self::new("AttributeError", message)
    }

    /// Attach the error that was being handled when this one was raised
    pub fn with_cause(mut self, cause: RaisedError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&RaisedError> {
        self.cause.as_deref()
    }

    /// Whether this belongs to the resource-exhaustion class
    pub fn is_memory_error(&self) -> bool {
        self.kind == "MemoryError"
    }
}

/// Errors surfaced by the loader, the caches and the frozen table.
#[derive(Debug, Clone, Error)]
pub enum ImportError {
    /// The shared library has no export function for the module.
    #[error("dynamic module does not define module export function ({prefix}_{short_name})")]
    SymbolNotFound {
        name: String,
        path: String,
        prefix: &'static str,
        short_name: String,
    },

    /// The init function raised; the original error is kept verbatim.
    #[error(transparent)]
    Exception(RaisedError),

    #[error("initialization of {name} failed without raising an exception")]
    MissingResult { name: String },

    #[error("initialization of {name} raised unreported exception")]
    UnreportedException {
        name: String,
        #[source]
        cause: RaisedError,
    },

    #[error("init function of {name} returned uninitialized object")]
    UninitializedDescriptor { name: String },

    #[error("initialization of {name} did not return a module definition")]
    NonAsciiRequiresMultiPhase { name: String },

    #[error("initialization of {name} did not return an extension module")]
    NotAModule { name: String },

    #[error("initialization of {name} did not return a valid extension module")]
    MissingDefinition { name: String },

    #[error("module {name} does not support loading in subinterpreters")]
    SubinterpreterIncompatible { name: String },

    #[error("out of memory while {context}")]
    OutOfMemory { context: &'static str },

    #[error("failed to load dynamic library '{path}': {reason}")]
    LibraryLoad { path: String, reason: String },

    #[error("no built-in module named {name}")]
    NoBuiltinModule { name: String },

    #[error("module {name} has an invalid definition: {reason}")]
    InvalidDefinition { name: String, reason: String },

    #[error("invalid module index {index}")]
    InvalidModuleIndex { index: usize },

    #[error("not holding the import lock")]
    LockNotHeld,

    #[error("override_subinterpreter_check() cannot be used in the main interpreter")]
    MainInterpreterOverride,

    #[error("override_subinterpreter_check() cannot be used in the free-threaded build")]
    FreeThreadedOverride,

    #[error("No such frozen object named '{name}'")]
    FrozenNotFound { name: String },

    #[error("Frozen modules are disabled and the frozen object named '{name}' is not essential")]
    FrozenDisabled { name: String },

    #[error("Excluded frozen object named '{name}'")]
    FrozenExcluded { name: String },

    #[error("Frozen object named '{name}' is invalid")]
    FrozenInvalid { name: String },
}

/// Result type for loader operations.
pub type ImportResult<T> = Result<T, ImportError>;

impl ImportError {
    /// Kind name used when this error crosses back into native code.
    pub fn kind_name(&self) -> &str {
        match self {
            ImportError::Exception(raised) => raised.kind(),
            ImportError::MissingResult { .. }
            | ImportError::UnreportedException { .. }
            | ImportError::UninitializedDescriptor { .. }
            | ImportError::NonAsciiRequiresMultiPhase { .. }
            | ImportError::NotAModule { .. }
            | ImportError::MissingDefinition { .. }
            | ImportError::InvalidDefinition { .. }
            | ImportError::InvalidModuleIndex { .. } => "SystemError",
            ImportError::OutOfMemory { .. } => "MemoryError",
            ImportError::LockNotHeld
            | ImportError::MainInterpreterOverride
            | ImportError::FreeThreadedOverride => "RuntimeError",
            ImportError::SymbolNotFound { .. }
            | ImportError::SubinterpreterIncompatible { .. }
            | ImportError::LibraryLoad { .. }
            | ImportError::NoBuiltinModule { .. }
            | ImportError::FrozenNotFound { .. }
            | ImportError::FrozenDisabled { .. }
            | ImportError::FrozenExcluded { .. }
            | ImportError::FrozenInvalid { .. } => "ImportError",
        }
    }

    pub fn is_memory_error(&self) -> bool {
        match self {
            ImportError::Exception(raised) => raised.is_memory_error(),
            ImportError::OutOfMemory { .. } => true,
            _ => false,
        }
    }
}

impl From<RaisedError> for ImportError {
    fn from(err: RaisedError) -> Self {
        ImportError::Exception(err)
    }
}

impl From<ImportError> for RaisedError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Exception(raised) => raised,
            ImportError::UnreportedException { ref cause, .. } => {
                RaisedError::system(err.to_string()).with_cause(cause.clone())
            }
            other => RaisedError::new(other.kind_name(), other.to_string()),
        }
    }
}
