//! Values stored in module namespaces.

use std::fmt;

use serde::ser::{Serialize, SerializeSeq, Serializer};

use super::ModuleHandle;
use crate::error::RaisedError;

/// Signature of a function exported by a native module. The module the
/// function was looked up on is passed as the first argument.
pub type NativeFn = fn(&ModuleHandle, &[Value]) -> Result<Value, RaisedError>;

/// A named native function
#[derive(Clone, Copy)]
pub struct NativeFunction {
    name: &'static str,
    doc: Option<&'static str>,
    func: NativeFn,
}

impl NativeFunction {
    pub const fn new(name: &'static str, func: NativeFn) -> Self {
        Self {
            name,
            doc: None,
            func,
        }
    }

    pub const fn with_doc(mut self, doc: &'static str) -> Self {
        self.doc = Some(doc);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn doc(&self) -> Option<&'static str> {
        self.doc
    }

    /// Call the function against `module`
    pub fn call(&self, module: &ModuleHandle, args: &[Value]) -> Result<Value, RaisedError> {
        (self.func)(module, args)
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.func as usize == other.func as usize
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<built-in function {}>", self.name)
    }
}

/// A namespace value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Function(NativeFunction),
    Module(ModuleHandle),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Function(_) => "builtin_function",
            Value::Module(_) => "module",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<ModuleHandle> for Value {
    fn from(v: ModuleHandle) -> Self {
        Value::Module(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "b\"{}\"", b.escape_ascii()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Function(func) => write!(f, "{:?}", func),
            Value::Module(module) => write!(f, "<module '{}'>", module.name()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::None => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_str(&hex::encode(b)),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Function(_) | Value::Module(_) => serializer.serialize_str(&self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(_module: &ModuleHandle, args: &[Value]) -> Result<Value, RaisedError> {
        Ok(Value::List(args.to_vec()))
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::None.to_string(), "None");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::from("hi").to_string(), "\"hi\"");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        let list = Value::List(vec![Value::Int(1), Value::from("a")]);
        assert_eq!(list.to_string(), "[1, \"a\"]");
        assert_eq!(Value::Bytes(b"a\0".to_vec()).to_string(), "b\"a\\x00\"");
    }

    #[test]
    fn test_native_function_call() {
        let func = NativeFunction::new("echo", echo).with_doc("Echo arguments");
        let module = ModuleHandle::new("m");
        let result = func.call(&module, &[Value::Int(7)]).unwrap();
        assert_eq!(result, Value::List(vec![Value::Int(7)]));
        assert_eq!(func.doc(), Some("Echo arguments"));
        assert_eq!(func, NativeFunction::new("echo", echo));
    }

    #[test]
    fn test_serialize() {
        let value = Value::List(vec![Value::None, Value::Int(3), Value::Bytes(vec![0xab])]);
        assert_eq!(serde_json::to_string(&value).unwrap(), "[null,3,\"ab\"]");
    }
}
