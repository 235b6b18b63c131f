//! Callback tests: guest closures invoked by the host, reentrant
//! invocation, deferred finalization, host functions called from the guest,
//! and the one-shot task queue.

mod common;

use heapbridge_hostapi::{CallbackRecord, HostError, HostValue};
use heapbridge_sandbox::{
    call_function, BridgeError, BridgeInstance, HostException, HostImports, Param, Ret, Signature,
};

use common::*;

// Log tags written by the guest.
const ENTER: i32 = 1;
const EXIT: i32 = 2;
const DROPPED: i32 = 3;
const TICK: i32 = 4;
const FINALIZE: i32 = 9;

const CALLBACK_IMPORTS: &str = r#"
    (import "bridge" "closure_new" (func $closure_new (param i32 i32 i32 i32) (result i32)))
    (import "bridge" "cb_drop" (func $cb_drop (param i32) (result i32)))
    (import "host" "log" (func $log (param i32 i32)))
    (import "host" "reenter" (func $reenter (param i32)))
    (import "host" "defer" (func $defer (param i32)))
"#;

// Slot 0 invokes with one argument and echoes it back. A nonzero env makes
// the outer invocation re-enter itself through the host once; the inner
// invocation drops the guest's reference. A nested invocation sees payload
// 0 while the outer one holds it. Slot 2 is a zero-argument tick.
const CALLBACK_BODY: &str = r#"
    (global $cb (mut i32) (i32.const 0))
    (global $depth (mut i32) (i32.const 0))
    (table (export "bridge_table") 3 funcref)
    (elem (i32.const 0) $invoke $finalize $tick)

    (func $invoke (param $payload i32) (param $env i32) (param $arg i32) (result i32)
        i32.const 1
        local.get $payload
        call $log
        global.get $depth
        if
            i32.const 3
            global.get $cb
            call $cb_drop
            call $log
        else
            local.get $env
            if
                i32.const 1
                global.set $depth
                global.get $cb
                call $reenter
                i32.const 0
                global.set $depth
            end
        end
        i32.const 2
        local.get $payload
        call $log
        local.get $arg)

    (func $finalize (param $payload i32) (param $env i32)
        i32.const 9
        local.get $payload
        call $log)

    (func $tick (param $payload i32) (param $env i32)
        i32.const 4
        local.get $payload
        call $log)

    (func (export "make") (param $payload i32) (param $env i32) (result i32)
        local.get $payload
        local.get $env
        i32.const 0
        i32.const 1
        call $closure_new
        global.set $cb
        global.get $cb)

    (func (export "make_task") (param $payload i32)
        local.get $payload
        i32.const 0
        i32.const 2
        i32.const 1
        call $closure_new
        global.set $cb
        global.get $cb
        call $defer)

    (func (export "drop") (result i32)
        global.get $cb
        call $cb_drop)
"#;

fn callback_guest() -> (BridgeInstance, EventLog) {
    let mut imports = HostImports::new();
    let log = define_log(&mut imports);
    imports.define(
        "reenter",
        Signature::new(&[Param::Handle], Ret::Void),
        |guest, args| {
            call_function(guest, &args[0], &[HostValue::from(0)])?;
            Ok(HostValue::Undefined)
        },
    );
    imports.define(
        "defer",
        Signature::new(&[Param::Handle], Ret::Void),
        |guest, args| {
            guest.state_mut().schedule(args[0].clone());
            Ok(HostValue::Undefined)
        },
    );
    let wat = guest_wat(CALLBACK_IMPORTS, CALLBACK_BODY);
    (instantiate(&wat, &imports), log)
}

#[test]
fn test_invoke_echoes_argument() {
    let (mut instance, log) = callback_guest();
    let h = instance.call::<(i32, i32), i32>("make", (7, 0)).unwrap();
    let cb = deref(&instance, h);

    let out = instance.invoke(&cb, &[HostValue::from(5)]).unwrap();
    assert_eq!(out.as_number(), Some(5.0));
    assert_eq!(events(&log), vec![(ENTER, 7), (EXIT, 7)]);

    // Argument and result handles do not leak; only the callback is live.
    assert_eq!(instance.state().heap.live_count(), 1);
}

#[test]
fn test_drop_outside_invocation_returns_to_guest() {
    let (mut instance, log) = callback_guest();
    let h = instance.call::<(i32, i32), i32>("make", (7, 0)).unwrap();
    let cb = deref(&instance, h);

    // No invocation is running, so the guest frees its own state.
    assert_eq!(instance.call::<(), i32>("drop", ()).unwrap(), 1);
    assert!(events(&log).is_empty());
    assert_eq!(instance.state().heap.live_count(), 0);

    let err = instance.invoke(&cb, &[HostValue::from(1)]).unwrap_err();
    assert!(matches!(
        err,
        HostException::Fatal(BridgeError::Host(HostError::CallbackReleased))
    ));
}

#[test]
fn test_reentrant_drop_defers_finalize_to_outermost() {
    let (mut instance, log) = callback_guest();
    let h = instance.call::<(i32, i32), i32>("make", (42, 1)).unwrap();
    let cb = deref(&instance, h);

    let out = instance.invoke(&cb, &[HostValue::from(5)]).unwrap();
    assert_eq!(out.as_number(), Some(5.0));
    assert_eq!(
        events(&log),
        vec![
            (ENTER, 42),
            (ENTER, 0),
            (DROPPED, 0),
            (EXIT, 0),
            (EXIT, 42),
            (FINALIZE, 42),
        ]
    );
    assert_eq!(instance.state().heap.live_count(), 0);
}

#[test]
fn test_scheduled_callback_runs_once() {
    let (mut instance, log) = callback_guest();
    instance.call::<i32, ()>("make_task", 3).unwrap();
    assert_eq!(instance.state().pending_tasks(), 1);

    assert_eq!(instance.run_tasks().unwrap(), 1);
    assert_eq!(instance.run_tasks().unwrap(), 0);
    assert_eq!(events(&log), vec![(TICK, 3)]);

    assert_eq!(instance.call::<(), i32>("drop", ()).unwrap(), 1);
}

#[test]
fn test_host_wrapped_callback() {
    let (mut instance, log) = callback_guest();
    let cb = HostValue::callback(CallbackRecord::new(2, 1, 11, 0));

    let out = instance.invoke(&cb, &[]).unwrap();
    assert!(matches!(out, HostValue::Undefined));
    assert_eq!(events(&log), vec![(TICK, 11)]);
}

const CALL_IMPORTS: &str = r#"
    (import "bridge" "global_get" (func $global_get (param i32 i32) (result i32)))
    (import "bridge" "call0" (func $call0 (param i32 i32) (result i32)))
    (import "bridge" "call1" (func $call1 (param i32 i32 i32) (result i32)))
    (import "bridge" "number_get" (func $number_get (param i32 i32) (result f64)))
"#;

const CALL_BODY: &str = r#"
    (func (export "apply") (param $name i32) (param $len i32) (param $arg i32) (param $slot i32) (result i32)
        local.get $name
        local.get $len
        call $global_get
        local.get $arg
        local.get $slot
        call $call1)
    (func (export "apply0") (param $name i32) (param $len i32) (param $slot i32) (result i32)
        local.get $name
        local.get $len
        call $global_get
        local.get $slot
        call $call0)
    (func (export "number") (param $h i32) (result f64)
        local.get $h
        i32.const 16
        call $number_get)
"#;

fn call_guest() -> BridgeInstance {
    let mut instance = instantiate(&guest_wat(CALL_IMPORTS, CALL_BODY), &HostImports::new());
    instance.state_mut().set_global(
        "double",
        HostValue::native("double", |args| match args.first().and_then(HostValue::as_number) {
            Some(n) => Ok(HostValue::from(n * 2.0)),
            None => Err(HostValue::error("TypeError", "expected a number")),
        }),
    );
    instance
        .state_mut()
        .set_global("answer", HostValue::native("answer", |_| Ok(HostValue::from(42))));
    instance
}

#[test]
fn test_guest_calls_host_function() {
    let mut instance = call_guest();
    let (name, len) = instance.pass_string("double").unwrap();
    let slot = exception_slot(&mut instance);
    let arg = instance.state_mut().heap.allocate(HostValue::from(21));

    let out = instance
        .call::<(i32, i32, i32, i32), i32>("apply", (name as i32, len as i32, arg.to_abi(), slot as i32))
        .unwrap();
    assert_eq!(instance.call::<i32, f64>("number", out).unwrap(), 42.0);
    assert_eq!(read_word(&mut instance, 16), 0);
    assert_eq!(read_word(&mut instance, slot), 0);

    let (name, len) = instance.pass_string("answer").unwrap();
    let out = instance
        .call::<(i32, i32, i32), i32>("apply0", (name as i32, len as i32, slot as i32))
        .unwrap();
    assert_eq!(deref(&instance, out).as_number(), Some(42.0));
}

#[test]
fn test_host_function_throw_lands_in_slot() {
    let mut instance = call_guest();
    let (name, len) = instance.pass_string("double").unwrap();
    let slot = exception_slot(&mut instance);
    let arg = instance.state_mut().heap.allocate(HostValue::from("text"));

    let out = instance
        .call::<(i32, i32, i32, i32), i32>("apply", (name as i32, len as i32, arg.to_abi(), slot as i32))
        .unwrap();
    assert_eq!(out, 0);
    assert_eq!(read_word(&mut instance, slot), 1);
    let raw = read_word(&mut instance, slot + 4) as i32;
    let thrown = deref(&instance, raw);
    assert_eq!(thrown.as_error().map(|e| e.message.as_str()), Some("expected a number"));
}

#[test]
fn test_calling_a_missing_global_is_a_type_error() {
    let mut instance = call_guest();
    let (name, len) = instance.pass_string("nothing").unwrap();
    let slot = exception_slot(&mut instance);

    instance
        .call::<(i32, i32, i32), i32>("apply0", (name as i32, len as i32, slot as i32))
        .unwrap();
    assert_eq!(read_word(&mut instance, slot), 1);
    let raw = read_word(&mut instance, slot + 4) as i32;
    let thrown = deref(&instance, raw);
    let err = thrown.as_error().unwrap();
    assert_eq!(err.name, "TypeError");
    assert_eq!(err.message, "undefined is not a function");
}
