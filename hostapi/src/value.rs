//! The host value model.
//!
//! `HostValue` is a closed set of tagged kinds. Primitive kinds are stored
//! inline; reference kinds (arrays, objects, functions, errors) are shared
//! through `Rc`, so holding a value keeps its referent alive and cloning a
//! value clones the reference, not the referent.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::callback::CallbackRecord;
use crate::debug;

/// Signature of a function implemented natively by the host.
///
/// `Err` carries the thrown value.
pub type NativeFn = dyn Fn(&[HostValue]) -> Result<HostValue, HostValue>;

/// Tag of a [`HostValue`], resolved once when the value is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Symbol,
    Array,
    Object,
    Function,
    Error,
}

impl ValueKind {
    /// Lower-case name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Symbol => "symbol",
            Self::Array => "array",
            Self::Object => "object",
            Self::Function => "function",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A host object reference or primitive.
#[derive(Clone)]
pub enum HostValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Symbol(Rc<SymbolValue>),
    Array(Rc<RefCell<Vec<HostValue>>>),
    Object(Rc<HostObject>),
    Function(Rc<HostFunction>),
    Error(Rc<ErrorValue>),
}

impl HostValue {
    /// The kind tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Undefined => ValueKind::Undefined,
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Boolean,
            Self::Number(_) => ValueKind::Number,
            Self::String(_) => ValueKind::String,
            Self::Symbol(_) => ValueKind::Symbol,
            Self::Array(_) => ValueKind::Array,
            Self::Object(_) => ValueKind::Object,
            Self::Function(_) => ValueKind::Function,
            Self::Error(_) => ValueKind::Error,
        }
    }

    /// Build a symbol with an optional description.
    pub fn symbol(description: Option<&str>) -> Self {
        Self::Symbol(Rc::new(SymbolValue {
            description: description.map(str::to_string),
        }))
    }

    /// Build a new array holding `items`.
    pub fn array(items: Vec<HostValue>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    /// Build a plain object (class `Object`) with the given properties.
    pub fn plain_object<K, I>(props: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, HostValue)>,
    {
        let object = HostObject::new("Object");
        for (key, value) in props {
            object.set(key, value);
        }
        Self::Object(Rc::new(object))
    }

    /// Build an object of a named host class with no properties.
    pub fn instance(class: &str) -> Self {
        Self::Object(Rc::new(HostObject::new(class)))
    }

    /// Build an error value with an empty stack.
    pub fn error(name: &str, message: &str) -> Self {
        Self::Error(Rc::new(ErrorValue::new(name, message)))
    }

    /// Wrap a native host closure as a function value.
    pub fn native<F>(name: &str, f: F) -> Self
    where
        F: Fn(&[HostValue]) -> Result<HostValue, HostValue> + 'static,
    {
        Self::Function(Rc::new(HostFunction::Native {
            name: name.to_string(),
            f: Box::new(f),
        }))
    }

    /// Wrap a guest callback record as a function value.
    pub fn callback(record: CallbackRecord) -> Self {
        Self::Function(Rc::new(HostFunction::Callback(record)))
    }

    /// True for `undefined` and `null`.
    pub fn is_like_none(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Rc<HostFunction>> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Rc<HostObject>> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorValue> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Render this value for diagnostics, recursing at most `max_depth` levels.
    pub fn debug_string(&self, max_depth: usize) -> String {
        debug::debug_string(self, max_depth)
    }
}

/// Primitives compare by value, reference kinds by identity.
impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => Rc::ptr_eq(a, b),
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Error(a), Self::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&debug::debug_string(self, debug::DEFAULT_MAX_DEPTH))
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for HostValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for HostValue {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        Self::String(Rc::from(s))
    }
}

/// An instance of a host class: a class name plus ordered own properties.
pub struct HostObject {
    class: String,
    props: RefCell<Vec<(String, HostValue)>>,
}

impl HostObject {
    pub fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
            props: RefCell::new(Vec::new()),
        }
    }

    /// The host class name, e.g. `Object` or `HTMLCanvasElement`.
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn get(&self, key: &str) -> Option<HostValue> {
        self.props
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Set a property, keeping the original insertion position on overwrite.
    pub fn set(&self, key: impl Into<String>, value: HostValue) {
        let key = key.into();
        let mut props = self.props.borrow_mut();
        match props.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => props.push((key, value)),
        }
    }

    /// Snapshot of the properties in insertion order.
    pub fn entries(&self) -> Vec<(String, HostValue)> {
        self.props.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.borrow().is_empty()
    }
}

/// A callable host value.
pub enum HostFunction {
    /// A closure implemented by the host.
    Native { name: String, f: Box<NativeFn> },
    /// A guest function pair wrapped by the callback adapter.
    Callback(CallbackRecord),
}

impl HostFunction {
    /// The function's name; guest callbacks are anonymous.
    pub fn name(&self) -> &str {
        match self {
            Self::Native { name, .. } => name,
            Self::Callback(_) => "",
        }
    }
}

/// A unique symbol with an optional description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolValue {
    pub description: Option<String>,
}

/// A host exception object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorValue {
    pub name: String,
    pub message: String,
    pub stack: String,
}

impl ErrorValue {
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
            stack: String::new(),
        }
    }

    pub fn with_stack(mut self, stack: &str) -> Self {
        self.stack = stack.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(HostValue::Undefined.kind(), ValueKind::Undefined);
        assert_eq!(HostValue::from(true).kind(), ValueKind::Boolean);
        assert_eq!(HostValue::from(1.5).kind(), ValueKind::Number);
        assert_eq!(HostValue::from("x").kind(), ValueKind::String);
        assert_eq!(HostValue::array(vec![]).kind(), ValueKind::Array);
        assert_eq!(HostValue::instance("Window").kind(), ValueKind::Object);
        assert_eq!(HostValue::error("TypeError", "bad").kind(), ValueKind::Error);
        assert_eq!(
            HostValue::native("f", |_| Ok(HostValue::Undefined)).kind(),
            ValueKind::Function
        );
    }

    #[test]
    fn test_primitive_equality_by_value() {
        assert_eq!(HostValue::from(42), HostValue::Number(42.0));
        assert_eq!(HostValue::from("hi"), HostValue::from(String::from("hi")));
        assert_ne!(HostValue::Null, HostValue::Undefined);
        assert_ne!(HostValue::Number(f64::NAN), HostValue::Number(f64::NAN));

        let sym = HostValue::symbol(Some("tag"));
        assert_eq!(sym, sym.clone());
        assert_ne!(sym, HostValue::symbol(Some("tag")));
    }

    #[test]
    fn test_reference_equality_by_identity() {
        let a = HostValue::array(vec![HostValue::from(1)]);
        let b = HostValue::array(vec![HostValue::from(1)]);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_object_properties_keep_insertion_order() {
        let obj = HostObject::new("Object");
        obj.set("b", HostValue::from(1));
        obj.set("a", HostValue::from(2));
        obj.set("b", HostValue::from(3));

        let keys: Vec<String> = obj.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(obj.get("b"), Some(HostValue::from(3)));
        assert_eq!(obj.get("missing"), None);
        assert_eq!(obj.len(), 2);
    }

    #[test]
    fn test_like_none() {
        assert!(HostValue::Undefined.is_like_none());
        assert!(HostValue::Null.is_like_none());
        assert!(!HostValue::from(false).is_like_none());
    }

    #[test]
    fn test_native_function_name() {
        let f = HostValue::native("now", |_| Ok(HostValue::from(0.0)));
        assert_eq!(f.as_function().map(|f| f.name()), Some("now"));
    }
}
