//! WASM module validation: checks a compiled module against the bridge ABI
//! before it is accepted.
//!
//! 1. Memory, malloc and realloc exports present with the right signatures
//! 2. Optional free, start and function table exports well-typed if present
//! 3. Imports only from `"bridge"` (known intrinsics) or the host module
//! 4. No WASI imports, and only function imports

use wasmtime::{ExternType, FuncType, Module, ValType};

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::intrinsics::INTRINSIC_NAMES;
use crate::linker::INTRINSICS_MODULE;

/// Check if a ValType is i32.
fn is_i32(vt: &ValType) -> bool {
    matches!(vt, ValType::I32)
}

/// Validate that a WASM module meets the bridge ABI requirements.
pub fn validate_module(module: &Module, config: &BridgeConfig) -> Result<(), BridgeError> {
    validate_exports(module, config)?;
    validate_imports(module, config)?;
    Ok(())
}

fn func_export(module: &Module, name: &str) -> Result<Option<FuncType>, BridgeError> {
    match module.get_export(name) {
        None => Ok(None),
        Some(ExternType::Func(ft)) => Ok(Some(ft)),
        Some(_) => Err(BridgeError::ValidationError(format!(
            "export '{}' must be a function",
            name
        ))),
    }
}

/// Check an i32-only signature with the given arity.
fn check_signature(
    name: &str,
    ty: &FuncType,
    param_count: usize,
    result_count: usize,
) -> Result<(), BridgeError> {
    let params: Vec<ValType> = ty.params().collect();
    let results: Vec<ValType> = ty.results().collect();

    if params.len() != param_count || !params.iter().all(is_i32) {
        return Err(BridgeError::ValidationError(format!(
            "export '{}' has wrong param signature: expected {} i32 params, got {} params",
            name,
            param_count,
            params.len()
        )));
    }
    if results.len() != result_count || !results.iter().all(is_i32) {
        return Err(BridgeError::ValidationError(format!(
            "export '{}' has wrong result signature: expected {} i32 results, got {} results",
            name,
            result_count,
            results.len()
        )));
    }
    Ok(())
}

fn validate_exports(module: &Module, config: &BridgeConfig) -> Result<(), BridgeError> {
    let names = &config.exports;

    if !matches!(module.get_export(&names.memory), Some(ExternType::Memory(_))) {
        return Err(BridgeError::ValidationError(format!(
            "module must export memory '{}'",
            names.memory
        )));
    }

    // (name, params, results, required)
    let funcs = [
        (&names.malloc, 1, 1, true),
        (&names.realloc, 3, 1, true),
        (&names.free, 2, 0, false),
        (&names.start, 0, 0, false),
    ];
    for (name, params, results, required) in funcs {
        match func_export(module, name)? {
            Some(ty) => check_signature(name, &ty, params, results)?,
            None if required => {
                return Err(BridgeError::ValidationError(format!(
                    "missing required export: {}",
                    name
                )));
            }
            None => {}
        }
    }

    match module.get_export(&names.table) {
        None | Some(ExternType::Table(_)) => Ok(()),
        Some(_) => Err(BridgeError::ValidationError(format!(
            "export '{}' must be a table",
            names.table
        ))),
    }
}

/// Check that all imports are bridge intrinsics or host operations.
fn validate_imports(module: &Module, config: &BridgeConfig) -> Result<(), BridgeError> {
    for import in module.imports() {
        let module_name = import.module();

        if module_name.starts_with("wasi") {
            return Err(BridgeError::ValidationError(format!(
                "WASI import not allowed: {}::{}",
                module_name,
                import.name()
            )));
        }

        if module_name != INTRINSICS_MODULE && module_name != config.host_module {
            return Err(BridgeError::ValidationError(format!(
                "import from unknown module '{}' (only '{}' and '{}' allowed): {}",
                module_name,
                INTRINSICS_MODULE,
                config.host_module,
                import.name()
            )));
        }

        if !matches!(import.ty(), ExternType::Func(_)) {
            return Err(BridgeError::ValidationError(format!(
                "non-function import not allowed: {}::{}",
                module_name,
                import.name()
            )));
        }

        if module_name == INTRINSICS_MODULE && !INTRINSIC_NAMES.contains(&import.name()) {
            return Err(BridgeError::ValidationError(format!(
                "unknown intrinsic: {}::{}",
                module_name,
                import.name()
            )));
        }
    }

    Ok(())
}
