//! Exception tests: the exception slot convention for fallible imports,
//! uncaught host exceptions, and the throw/rethrow intrinsics.

mod common;

use heapbridge_hostapi::{Handle, HostValue};
use heapbridge_sandbox::{BridgeError, HostException, HostImports, Param, Ret, Signature};

use common::*;

fn parse_imports() -> HostImports {
    let mut imports = HostImports::new();
    imports.define(
        "parse",
        Signature::new(&[Param::Str], Ret::F64).fallible(),
        |_, args| {
            let text = args[0].as_str().unwrap_or_default();
            text.trim()
                .parse::<f64>()
                .map(HostValue::from)
                .map_err(|e| HostException::Thrown(HostValue::error("SyntaxError", &e.to_string())))
        },
    );
    imports.define(
        "fail",
        Signature::new(&[], Ret::Void),
        |_, _| Err(HostException::Thrown(HostValue::error("RangeError", "boom"))),
    );
    imports
}

const PARSE_IMPORTS: &str = r#"
    (import "host" "parse" (func $parse (param i32 i32 i32) (result f64)))
    (import "host" "fail" (func $fail))
    (import "bridge" "throw" (func $throw (param i32 i32)))
    (import "bridge" "rethrow" (func $rethrow (param i32)))
"#;

const PARSE_BODY: &str = r#"
    (func (export "try_parse") (param $ptr i32) (param $len i32) (param $slot i32) (result f64)
        local.get $ptr
        local.get $len
        local.get $slot
        call $parse)
    (func (export "fail")
        call $fail)
    (func (export "throw_message") (param $ptr i32) (param $len i32)
        local.get $ptr
        local.get $len
        call $throw)
    (func (export "rethrow") (param $h i32)
        local.get $h
        call $rethrow)
"#;

fn parse_guest() -> heapbridge_sandbox::BridgeInstance {
    instantiate(&guest_wat(PARSE_IMPORTS, PARSE_BODY), &parse_imports())
}

#[test]
fn test_success_leaves_slot_untouched() {
    let mut instance = parse_guest();
    let slot = exception_slot(&mut instance);
    let (ptr, len) = instance.pass_string(" 12.5 ").unwrap();

    let n = instance
        .call::<(i32, i32, i32), f64>("try_parse", (ptr as i32, len as i32, slot as i32))
        .unwrap();
    assert_eq!(n, 12.5);
    assert_eq!(read_word(&mut instance, slot), 0);
    assert_eq!(read_word(&mut instance, slot + 4), 0xdead);
}

#[test]
fn test_throw_lands_in_slot() {
    let mut instance = parse_guest();
    let slot = exception_slot(&mut instance);
    let (ptr, len) = instance.pass_string("twelve").unwrap();
    let live_before = instance.state().heap.live_count();

    let n = instance
        .call::<(i32, i32, i32), f64>("try_parse", (ptr as i32, len as i32, slot as i32))
        .unwrap();
    assert_eq!(n, 0.0, "default result when the import throws");
    assert_eq!(read_word(&mut instance, slot), 1);

    let handle = read_word(&mut instance, slot + 4);
    let err = instance.state().heap.get(Handle::from_raw(handle)).unwrap();
    assert_eq!(err.as_error().map(|e| e.name.as_str()), Some("SyntaxError"));
    assert_eq!(instance.state().heap.live_count(), live_before + 1);
}

#[test]
fn test_uncaught_host_exception_traps() {
    let mut instance = parse_guest();
    let err = instance.call::<(), ()>("fail", ()).unwrap_err();
    match err {
        BridgeError::Thrown { handle, message } => {
            assert!(message.contains("RangeError: boom"), "message: {}", message);
            let value = instance.state().heap.get(Handle::from_raw(handle)).unwrap();
            assert_eq!(value.as_error().map(|e| e.message.as_str()), Some("boom"));
        }
        other => panic!("expected Thrown, got: {:?}", other),
    }
}

#[test]
fn test_throw_intrinsic() {
    let mut instance = parse_guest();
    let (ptr, len) = instance.pass_string("bad input").unwrap();
    let err = instance
        .call::<(i32, i32), ()>("throw_message", (ptr as i32, len as i32))
        .unwrap_err();
    match err {
        BridgeError::Thrown { message, .. } => assert!(message.contains("Error: bad input")),
        other => panic!("expected Thrown, got: {:?}", other),
    }
}

#[test]
fn test_rethrow_consumes_handle() {
    let mut instance = parse_guest();
    let value = HostValue::error("TypeError", "again");
    let h = instance.state_mut().heap.allocate(value);
    let live = instance.state().heap.live_count();

    let err = instance.call::<i32, ()>("rethrow", h.to_abi()).unwrap_err();
    match err {
        BridgeError::Thrown { handle, message } => {
            assert!(message.contains("TypeError: again"));
            // The old handle was released and its slot reused for the trap.
            assert_eq!(handle, h.as_raw());
        }
        other => panic!("expected Thrown, got: {:?}", other),
    }
    assert_eq!(instance.state().heap.live_count(), live);
}

#[test]
fn test_fatal_errors_are_not_captured() {
    let mut instance = parse_guest();
    let err = instance.call::<i32, ()>("rethrow", 77).unwrap_err();
    assert!(matches!(err, BridgeError::Host(_)), "got: {:?}", err);
}
