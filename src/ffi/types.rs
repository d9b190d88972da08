//! Init Function ABI
//!
//! An extension exports one init function per module:
//!
//! ```text
//! unsafe extern "C" fn ModInit_<name>(ctx: *mut InitContext) -> *mut InitOutput
//! ```
//!
//! The context and output are Rust types passed by pointer, so extensions
//! must be built with the same toolchain and the same version of this crate.
//! The [`module_init!`](crate::module_init) macro writes the function for you.
//!
//! A null return means "no result"; whether that is a failure with an error
//! or a silent failure depends on whether the function called
//! [`InitContext::raise`] first.

use std::sync::Arc;

use crate::error::RaisedError;
use crate::extensions::ModuleSpec;
use crate::interpreter::Interpreter;
use crate::object::{ModuleDef, ModuleHandle, StateSize, Value};
use crate::runtime::Runtime;

/// Raw signature of an exported init function
#[allow(improper_ctypes_definitions)]
pub type RawInitFn = unsafe extern "C" fn(*mut InitContext) -> *mut InitOutput;

/// What an init function hands back
pub enum InitOutput {
    /// A finished single-phase module
    Module(ModuleHandle),
    /// A multi-phase definition (should come from [`ModuleDef::init`])
    Definition(&'static ModuleDef),
    /// Anything else; always a malformed result
    Object(Value),
}

impl InitOutput {
    /// Leak the output into the pointer returned across the ABI
    pub fn into_raw(self) -> *mut InitOutput {
        Box::into_raw(Box::new(self))
    }
}

/// Services available to a running init function.
///
/// The interpreter here is the one that is active for the call, which is
/// the main interpreter on first loads.
pub struct InitContext {
    runtime: Arc<Runtime>,
    interp: Arc<Interpreter>,
    package_context: Option<String>,
    pending: Option<RaisedError>,
}

impl InitContext {
    pub(crate) fn new(
        runtime: Arc<Runtime>,
        interp: Arc<Interpreter>,
        package_context: Option<String>,
    ) -> Self {
        Self {
            runtime,
            interp,
            package_context,
            pending: None,
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn interpreter(&self) -> &Arc<Interpreter> {
        &self.interp
    }

    /// Fully qualified name of the module being initialized, until consumed
    pub fn package_context(&self) -> Option<&str> {
        self.package_context.as_deref()
    }

    /// Resolve a definition's short name against the package context.
    ///
    /// When the last dotted component of the context equals `name`, the
    /// qualified name is returned and the context is consumed.
    pub fn resolve_name(&mut self, name: &str) -> String {
        if let Some(context) = &self.package_context {
            if let Some((_, last)) = context.rsplit_once('.') {
                if last == name {
                    let qualified = context.clone();
                    self.package_context = None;
                    return qualified;
                }
            }
        }
        name.to_string()
    }

    /// Record an error. The loader picks it up when the init function
    /// returns.
    pub fn raise(&mut self, err: impl Into<RaisedError>) {
        self.pending = Some(err.into());
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn take_pending(&mut self) -> Option<RaisedError> {
        self.pending.take()
    }

    /// Build a single-phase module from `def`
    pub fn create_module(&mut self, def: &'static ModuleDef) -> Result<ModuleHandle, RaisedError> {
        let def = def.init();
        if def.is_multi_phase() {
            return Err(RaisedError::system(format!(
                "module {}: create_module is incompatible with slots",
                def.name()
            )));
        }
        let name = self.resolve_name(def.name());
        let module = ModuleHandle::with_def(name, def);
        if let StateSize::Bytes(size) = def.state_size() {
            if size > 0 {
                module.ensure_state(def.state_size());
            }
        }
        module.add_members(def);
        Ok(module)
    }

    /// Import another extension from inside this init function
    pub fn import(&mut self, spec: &ModuleSpec) -> Result<ModuleHandle, RaisedError> {
        self.runtime
            .loader()
            .import_extension(&self.interp, spec)
            .map_err(RaisedError::from)
    }

    /// Module registered for `def` in the active interpreter
    pub fn find_module(&self, def: &'static ModuleDef) -> Option<ModuleHandle> {
        self.interp.find_module(def)
    }
}

/// The captured result of one init function call
pub struct InitInvocation {
    output: Option<InitOutput>,
    raised: Option<RaisedError>,
}

impl InitInvocation {
    /// Call `init` and capture both its result and any raised error.
    ///
    /// # Safety
    ///
    /// `init` must be an init function following this module's ABI: built
    /// against the same crate version and returning either null or a pointer
    /// produced by [`InitOutput::into_raw`].
    pub unsafe fn call(init: RawInitFn, ctx: &mut InitContext) -> Self {
        let raw = unsafe { init(ctx as *mut InitContext) };
        let output = if raw.is_null() {
            None
        } else {
            // Safety: non-null outputs come from InitOutput::into_raw.
            Some(*unsafe { Box::from_raw(raw) })
        };
        Self {
            output,
            raised: ctx.take_pending(),
        }
    }

    pub fn from_parts(output: Option<InitOutput>, raised: Option<RaisedError>) -> Self {
        Self { output, raised }
    }

    pub fn into_parts(self) -> (Option<InitOutput>, Option<RaisedError>) {
        (self.output, self.raised)
    }
}

/// Define an extension init function.
///
/// The body gets a `&mut InitContext` under the given name and evaluates to
/// `Option<InitOutput>`; `None` becomes a null return.
///
/// ```ignore
/// static SPAM: ModuleDef = ModuleDef::new("spam");
///
/// dynimport::module_init! {
///     #[no_mangle]
///     pub fn ModInit_spam(ctx) {
///         let module = ctx.create_module(&SPAM).ok()?;
///         Some(InitOutput::Module(module))
///     }
/// }
/// ```
#[macro_export]
macro_rules! module_init {
    ($(#[$attr:meta])* $vis:vis fn $name:ident($ctx:ident) $body:block) => {
        $(#[$attr])*
        #[allow(non_snake_case, improper_ctypes_definitions)]
        $vis unsafe extern "C" fn $name(
            ctx: *mut $crate::ffi::InitContext,
        ) -> *mut $crate::ffi::InitOutput {
            fn body(
                $ctx: &mut $crate::ffi::InitContext,
            ) -> ::std::option::Option<$crate::ffi::InitOutput> $body

            // Safety: the loader passes a live, exclusive context.
            match body(unsafe { &mut *ctx }) {
                ::std::option::Option::Some(output) => output.into_raw(),
                ::std::option::Option::None => ::std::ptr::null_mut(),
            }
        }
    };
}
