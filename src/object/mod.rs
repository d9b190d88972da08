//! Object Model
//!
//! The minimal object model the loader needs: values, module namespaces,
//! module objects and the static module definitions native code exports.
//!
//! Module definitions are `'static` records owned by the extension itself.
//! The loader writes a few process-lifetime fields back onto them (the
//! module index, the reinit function, the namespace snapshot) and never
//! frees them.

mod def;
mod module;
mod namespace;
mod value;

pub use def::{
    Constant, CreateFn, ExecFn, GilRequirement, Member, ModuleDef, MultiInterpSupport, Slot,
    StateSize,
};
pub use module::ModuleHandle;
pub use namespace::Namespace;
pub use value::{NativeFn, NativeFunction, Value};
