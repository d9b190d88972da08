//! Init result classification.
//!
//! Every init function call ends up as exactly one [`LoaderResult`]. The
//! checks run in a fixed order:
//!
//! 1. no output: an error if one was raised, otherwise `MissingResult`
//! 2. output *and* a raised error: `UnreportedException`
//! 3. a definition: `UninitializedDescriptor` unless it went through
//!    [`ModuleDef::init`], otherwise multi-phase
//! 4. anything else for a non-ASCII name: `NonAsciiRequiresMultiPhase`
//! 5. a non-module: `NotAModule`
//! 6. a module without a definition: `MissingDefinition`
//! 7. otherwise single-phase

use crate::error::{ImportError, RaisedError};
use crate::ffi::{InitInvocation, InitOutput};
use crate::object::{ModuleDef, ModuleHandle};

/// Protocol a module was (or is being) built with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    SinglePhase,
    MultiPhase,
    Unknown,
}

/// Ways an init function result can be unusable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedKind {
    MissingResult,
    UnreportedException,
    UninitializedDescriptor,
    NonAsciiRequiresMultiPhase,
    NotAModule,
    MissingDefinition,
}

impl MalformedKind {
    /// The caller-facing error for module `name`
    pub fn into_error(self, name: &str, cause: Option<RaisedError>) -> ImportError {
        let name = name.to_string();
        match self {
            MalformedKind::MissingResult => ImportError::MissingResult { name },
            MalformedKind::UnreportedException => ImportError::UnreportedException {
                name,
                cause: cause.unwrap_or_else(|| RaisedError::system("unknown error")),
            },
            MalformedKind::UninitializedDescriptor => ImportError::UninitializedDescriptor { name },
            MalformedKind::NonAsciiRequiresMultiPhase => {
                ImportError::NonAsciiRequiresMultiPhase { name }
            }
            MalformedKind::NotAModule => ImportError::NotAModule { name },
            MalformedKind::MissingDefinition => ImportError::MissingDefinition { name },
        }
    }
}

/// Classified result of one init function call
#[derive(Debug)]
pub enum LoaderResult {
    /// The init function failed and raised
    Exception(RaisedError),
    /// A multi-phase definition, to be built per import
    MultiPhaseDescriptor(&'static ModuleDef),
    /// A finished single-phase module
    SinglePhaseModule {
        module: ModuleHandle,
        def: &'static ModuleDef,
    },
    Malformed {
        kind: MalformedKind,
        cause: Option<RaisedError>,
    },
}

impl LoaderResult {
    /// Classify a captured call. `nonascii` is whether the module name
    /// needed Punycode to form its export symbol.
    pub fn classify(invocation: InitInvocation, nonascii: bool) -> Self {
        let (output, raised) = invocation.into_parts();

        let output = match (output, raised) {
            (None, None) => return Self::malformed(MalformedKind::MissingResult),
            (None, Some(err)) => return LoaderResult::Exception(err),
            (Some(_), Some(err)) => {
                return LoaderResult::Malformed {
                    kind: MalformedKind::UnreportedException,
                    cause: Some(err),
                }
            }
            (Some(output), None) => output,
        };

        match output {
            InitOutput::Definition(def) if !def.is_initialized() => {
                Self::malformed(MalformedKind::UninitializedDescriptor)
            }
            InitOutput::Definition(def) => LoaderResult::MultiPhaseDescriptor(def),
            _ if nonascii => Self::malformed(MalformedKind::NonAsciiRequiresMultiPhase),
            InitOutput::Object(_) => Self::malformed(MalformedKind::NotAModule),
            InitOutput::Module(module) => match module.def() {
                Some(def) => LoaderResult::SinglePhaseModule { module, def },
                None => Self::malformed(MalformedKind::MissingDefinition),
            },
        }
    }

    fn malformed(kind: MalformedKind) -> Self {
        LoaderResult::Malformed { kind, cause: None }
    }

    pub fn kind(&self) -> ModuleKind {
        match self {
            LoaderResult::MultiPhaseDescriptor(_) => ModuleKind::MultiPhase,
            LoaderResult::SinglePhaseModule { .. } | LoaderResult::Exception(_) => {
                ModuleKind::SinglePhase
            }
            LoaderResult::Malformed { .. } => ModuleKind::Unknown,
        }
    }

    /// Turn failures into the caller-facing error for module `name`
    pub fn into_outcome(self, name: &str) -> Result<Classified, ImportError> {
        match self {
            LoaderResult::Exception(err) => Err(ImportError::Exception(err)),
            LoaderResult::Malformed { kind, cause } => Err(kind.into_error(name, cause)),
            LoaderResult::MultiPhaseDescriptor(def) => Ok(Classified::MultiPhase(def)),
            LoaderResult::SinglePhaseModule { module, def } => {
                Ok(Classified::SinglePhase { module, def })
            }
        }
    }
}

/// A successfully classified result
#[derive(Debug)]
pub enum Classified {
    MultiPhase(&'static ModuleDef),
    SinglePhase {
        module: ModuleHandle,
        def: &'static ModuleDef,
    },
}
