//! User host operations and the generic shim that calls them.
//!
//! A host operation is a closure over host values. Its [`Signature`] fixes
//! the wasm-level shape the guest imports: handles and numbers are single
//! words, text is a `(ptr, len)` pair, a text result is written through a
//! leading return pointer, and a fallible operation takes a trailing
//! exception slot pointer.

use std::sync::Arc;

use heapbridge_hostapi::{Handle, HostValue};
use wasmtime::{Engine, FuncType, Val, ValType};

use crate::error::BridgeError;
use crate::exception::{self, ExceptionSlot, HostException, HostResult};
use crate::guest::Guest;
use crate::strings;

/// Kind of one host-level parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// A borrowed handle.
    Handle,
    /// UTF-8 text as `(ptr, len)`.
    Str,
    /// UTF-8 text as `(ptr, len)` handed over to the host, which frees the
    /// guest allocation once decoded.
    OwnedStr,
    I32,
    F64,
}

/// Kind of the host-level return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ret {
    Void,
    /// A new handle owned by the guest; constants map to reserved handles.
    Handle,
    I32,
    F64,
    /// Text written as two words `(ptr, len)` at a leading return pointer.
    Str,
}

/// Shape of a host operation at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    params: Vec<Param>,
    ret: Ret,
    fallible: bool,
}

impl Signature {
    pub fn new(params: &[Param], ret: Ret) -> Self {
        Self {
            params: params.to_vec(),
            ret,
            fallible: false,
        }
    }

    /// Append an exception slot pointer; throws are captured instead of
    /// trapping.
    pub fn fallible(mut self) -> Self {
        self.fallible = true;
        self
    }

    pub fn is_fallible(&self) -> bool {
        self.fallible
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn ret(&self) -> Ret {
        self.ret
    }

    /// Flattened wasm parameter types.
    pub fn wasm_params(&self) -> Vec<ValType> {
        let mut out = Vec::new();
        if self.ret == Ret::Str {
            out.push(ValType::I32);
        }
        for param in &self.params {
            match param {
                Param::Handle | Param::I32 => out.push(ValType::I32),
                Param::Str | Param::OwnedStr => out.extend([ValType::I32, ValType::I32]),
                Param::F64 => out.push(ValType::F64),
            }
        }
        if self.fallible {
            out.push(ValType::I32);
        }
        out
    }

    pub fn wasm_results(&self) -> Vec<ValType> {
        match self.ret {
            Ret::Void | Ret::Str => Vec::new(),
            Ret::Handle | Ret::I32 => vec![ValType::I32],
            Ret::F64 => vec![ValType::F64],
        }
    }

    pub fn func_type(&self, engine: &Engine) -> FuncType {
        FuncType::new(engine, self.wasm_params(), self.wasm_results())
    }
}

/// Host closure behind an import.
pub type HostFn = Arc<dyn Fn(&mut dyn Guest, &[HostValue]) -> HostResult + Send + Sync>;

/// One named host operation.
#[derive(Clone)]
pub struct HostImport {
    name: String,
    signature: Signature,
    f: HostFn,
}

impl HostImport {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

/// The set of host operations offered to a guest.
#[derive(Clone, Default)]
pub struct HostImports {
    imports: Vec<HostImport>,
}

impl HostImports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `name`, replacing any earlier definition.
    pub fn define<F>(&mut self, name: &str, signature: Signature, f: F) -> &mut Self
    where
        F: Fn(&mut dyn Guest, &[HostValue]) -> HostResult + Send + Sync + 'static,
    {
        self.imports.retain(|i| i.name != name);
        self.imports.push(HostImport {
            name: name.to_string(),
            signature,
            f: Arc::new(f),
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&HostImport> {
        self.imports.iter().find(|i| i.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostImport> {
        self.imports.iter()
    }

    pub fn len(&self) -> usize {
        self.imports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
    }
}

/// Reads flattened wasm arguments in order.
struct Args<'a> {
    vals: std::slice::Iter<'a, Val>,
    import: &'a str,
}

impl Args<'_> {
    fn mismatch(&self) -> BridgeError {
        BridgeError::ValidationError(format!(
            "import '{}' called with a mismatched signature",
            self.import
        ))
    }

    fn i32(&mut self) -> Result<i32, BridgeError> {
        match self.vals.next().and_then(Val::i32) {
            Some(v) => Ok(v),
            None => Err(self.mismatch()),
        }
    }

    fn f64(&mut self) -> Result<f64, BridgeError> {
        match self.vals.next().and_then(Val::f64) {
            Some(v) => Ok(v),
            None => Err(self.mismatch()),
        }
    }
}

/// Lift `params`, run the import, lower the result into `results`.
pub fn call_import(
    guest: &mut dyn Guest,
    import: &HostImport,
    params: &[Val],
    results: &mut [Val],
) -> Result<(), BridgeError> {
    let sig = &import.signature;
    let mut words = Args {
        vals: params.iter(),
        import: &import.name,
    };

    let ret_ptr = match sig.ret {
        Ret::Str => Some(words.i32()? as u32),
        _ => None,
    };
    let mut args = Vec::with_capacity(sig.params.len());
    for param in &sig.params {
        let value = match param {
            Param::Handle => guest.state().heap.get(Handle::from_abi(words.i32()?))?,
            Param::Str => {
                let ptr = words.i32()? as u32;
                let len = words.i32()? as u32;
                HostValue::from(strings::decode(guest, ptr, len)?)
            }
            Param::OwnedStr => {
                let ptr = words.i32()? as u32;
                let len = words.i32()? as u32;
                let text = strings::decode(guest, ptr, len)?;
                guest.free(ptr, len)?;
                HostValue::from(text)
            }
            Param::I32 => HostValue::from(words.i32()?),
            Param::F64 => HostValue::from(words.f64()?),
        };
        args.push(value);
    }
    let slot = if sig.fallible {
        Some(ExceptionSlot::new(words.i32()? as u32))
    } else {
        None
    };

    for (result, ty) in results.iter_mut().zip(sig.wasm_results()) {
        *result = match ty {
            ValType::F64 => Val::F64(0f64.to_bits()),
            _ => Val::I32(0),
        };
    }

    let mut run = |g: &mut dyn Guest| -> HostResult<()> {
        let value = (import.f)(g, &args)?;
        lower(g, sig.ret, value, ret_ptr, results)?;
        Ok(())
    };
    match slot {
        Some(slot) => exception::catch(guest, slot, (), run),
        None => match run(guest) {
            Ok(()) => Ok(()),
            Err(HostException::Thrown(value)) => Err(exception::uncaught(guest, value)),
            Err(HostException::Fatal(err)) => Err(err),
        },
    }
}

fn lower(
    guest: &mut dyn Guest,
    ret: Ret,
    value: HostValue,
    ret_ptr: Option<u32>,
    results: &mut [Val],
) -> Result<(), BridgeError> {
    match ret {
        Ret::Void => {}
        Ret::Handle => {
            results[0] = Val::I32(guest.state_mut().heap.intern(value).to_abi());
        }
        Ret::I32 => {
            let n = match value {
                HostValue::Number(n) => n as i32,
                HostValue::Bool(b) => b as i32,
                _ => 0,
            };
            results[0] = Val::I32(n);
        }
        Ret::F64 => {
            let n = value.as_number().unwrap_or(f64::NAN);
            results[0] = Val::F64(n.to_bits());
        }
        Ret::Str => {
            let (ptr, len) = match value.as_str() {
                Some(text) => strings::encode_with_len(guest, text)?,
                None => (0, 0),
            };
            let out = ret_ptr.unwrap_or_default();
            let words = guest.word_view();
            words.set(guest, out, ptr)?;
            words.set(guest, out + 4, len)?;
        }
    }
    Ok(())
}
