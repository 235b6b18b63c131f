//! Depth-limited diagnostic rendering of host values.
//!
//! Arrays recurse up to a depth bound and render a back-reference to an
//! enclosing array as `[Circular]`. Plain objects render as
//! `Object(<json>)`; the JSON pass carries its own cycle and depth guard and
//! falls back to the bare tag `Object` when either trips. Numbers inside the
//! JSON use the same text as [`format_number`].

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::value::{HostFunction, HostValue};

/// Recursion bound used when no explicit depth is configured.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Render `value` for diagnostics.
pub fn debug_string(value: &HostValue, max_depth: usize) -> String {
    let mut out = String::new();
    let mut visiting = Vec::new();
    render(value, 0, max_depth, &mut visiting, &mut out);
    out
}

/// Render a number the way the host's number-to-text conversion does.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if (1e-6..1e21).contains(&abs) {
        return format!("{}", n);
    }
    let exp = format!("{:e}", n);
    match exp.split_once('e') {
        Some((mantissa, e)) if !e.starts_with('-') => format!("{}e+{}", mantissa, e),
        _ => exp,
    }
}

fn render(
    value: &HostValue,
    depth: usize,
    max_depth: usize,
    visiting: &mut Vec<*const ()>,
    out: &mut String,
) {
    match value {
        HostValue::Undefined => out.push_str("undefined"),
        HostValue::Null => out.push_str("null"),
        HostValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        HostValue::Number(n) => out.push_str(&format_number(*n)),
        HostValue::String(s) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
        HostValue::Symbol(sym) => match &sym.description {
            Some(desc) => {
                out.push_str("Symbol(");
                out.push_str(desc);
                out.push(')');
            }
            None => out.push_str("Symbol"),
        },
        HostValue::Function(f) => match f.as_ref() {
            HostFunction::Native { name, .. } if !name.is_empty() => {
                out.push_str("Function(");
                out.push_str(name);
                out.push(')');
            }
            _ => out.push_str("Function"),
        },
        HostValue::Array(items) => {
            let ptr = Rc::as_ptr(items) as *const ();
            if visiting.contains(&ptr) {
                out.push_str("[Circular]");
                return;
            }
            if depth >= max_depth {
                out.push_str("[...]");
                return;
            }
            visiting.push(ptr);
            out.push('[');
            for (i, item) in items.borrow().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render(item, depth + 1, max_depth, visiting, out);
            }
            out.push(']');
            visiting.pop();
        }
        HostValue::Object(obj) if obj.class() == "Object" => {
            let guard = Guard {
                max_depth,
                stack: RefCell::new(Vec::new()),
            };
            let mut json = Vec::new();
            let mut serializer = serde_json::Serializer::with_formatter(&mut json, HostNumbers);
            match Structural::new(value, &guard).serialize(&mut serializer) {
                Ok(()) => {
                    out.push_str("Object(");
                    out.push_str(&String::from_utf8_lossy(&json));
                    out.push(')');
                }
                Err(_) => out.push_str("Object"),
            }
        }
        HostValue::Object(obj) => out.push_str(obj.class()),
        HostValue::Error(err) => {
            out.push_str(&err.name);
            out.push_str(": ");
            out.push_str(&err.message);
            out.push('\n');
            out.push_str(&err.stack);
        }
    }
}

/// Compact JSON whose numbers print like [`format_number`].
struct HostNumbers;

impl serde_json::ser::Formatter for HostNumbers {
    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(format_number(value).as_bytes())
    }
}

struct Guard {
    max_depth: usize,
    stack: RefCell<Vec<*const ()>>,
}

impl Guard {
    fn enter<E: serde::ser::Error>(&self, ptr: *const (), depth: usize) -> Result<(), E> {
        let mut stack = self.stack.borrow_mut();
        if stack.contains(&ptr) {
            return Err(E::custom("converting circular structure"));
        }
        if depth >= self.max_depth {
            return Err(E::custom("maximum depth exceeded"));
        }
        stack.push(ptr);
        Ok(())
    }

    fn leave(&self) {
        self.stack.borrow_mut().pop();
    }
}

/// JSON view of a value: undefined, functions and symbols are omitted from
/// objects and become `null` inside arrays.
struct Structural<'a> {
    value: &'a HostValue,
    depth: usize,
    guard: &'a Guard,
}

impl<'a> Structural<'a> {
    fn new(value: &'a HostValue, guard: &'a Guard) -> Self {
        Self {
            value,
            depth: 0,
            guard,
        }
    }

    fn child<'b>(&'b self, value: &'b HostValue) -> Structural<'b> {
        Structural {
            value,
            depth: self.depth + 1,
            guard: self.guard,
        }
    }
}

fn omitted_from_objects(value: &HostValue) -> bool {
    matches!(
        value,
        HostValue::Undefined | HostValue::Function(_) | HostValue::Symbol(_)
    )
}

impl Serialize for Structural<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            HostValue::Undefined
            | HostValue::Null
            | HostValue::Symbol(_)
            | HostValue::Function(_) => serializer.serialize_unit(),
            HostValue::Bool(b) => serializer.serialize_bool(*b),
            HostValue::Number(n) if !n.is_finite() => serializer.serialize_unit(),
            HostValue::Number(n) => serializer.serialize_f64(*n),
            HostValue::String(s) => serializer.serialize_str(s),
            HostValue::Array(items) => {
                self.guard
                    .enter::<S::Error>(Rc::as_ptr(items) as *const (), self.depth)?;
                let items = items.borrow();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(&self.child(item))?;
                }
                self.guard.leave();
                seq.end()
            }
            HostValue::Object(obj) => {
                self.guard
                    .enter::<S::Error>(Rc::as_ptr(obj) as *const (), self.depth)?;
                let entries = obj.entries();
                let mut map = serializer.serialize_map(None)?;
                for (key, value) in entries.iter().filter(|(_, v)| !omitted_from_objects(v)) {
                    map.serialize_entry(key, &self.child(value))?;
                }
                self.guard.leave();
                map.end()
            }
            HostValue::Error(_) => serializer.serialize_map(Some(0))?.end(),
        }
    }
}
