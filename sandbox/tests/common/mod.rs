//! Shared test helpers for integration tests.
//!
//! Provides a WAT allocator prelude, guest module assembly, bridge factory
//! functions and a host-side event log used across all integration test
//! files.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use heapbridge_hostapi::{Handle, HostValue};
use heapbridge_sandbox::{
    Bridge, BridgeConfig, BridgeInstance, Guest, HostImports, Param, Ret, Signature,
};

/// Bump allocator, memory and free export every test guest carries.
///
/// Allocations start at 1024 and are 8-byte aligned. `bridge_malloc` grows
/// memory a page at a time and traps when growth is refused. `bridge_free`
/// only records its last arguments, readable through `last_free` and
/// `last_free_size`. Addresses below 1024 are scratch space for the guest
/// bodies.
pub const ALLOCATOR: &str = r#"
    (memory (export "memory") 1)
    (global $bump (mut i32) (i32.const 1024))
    (func $malloc (export "bridge_malloc") (param $n i32) (result i32)
        (local $p i32) (local $end i32)
        global.get $bump
        local.set $p
        local.get $p
        local.get $n
        i32.const 7
        i32.add
        i32.const -8
        i32.and
        i32.add
        local.set $end
        block $ok
            loop $grow
                local.get $end
                memory.size
                i32.const 16
                i32.shl
                i32.le_u
                br_if $ok
                i32.const 1
                memory.grow
                i32.const -1
                i32.eq
                if
                    unreachable
                end
                br $grow
            end
        end
        local.get $end
        global.set $bump
        local.get $p)
    (func (export "bridge_realloc") (param $p i32) (param $old i32) (param $new i32) (result i32)
        (local $q i32)
        local.get $new
        call $malloc
        local.set $q
        local.get $q
        local.get $p
        local.get $old
        local.get $new
        local.get $old
        local.get $new
        i32.lt_u
        select
        memory.copy
        local.get $q)
    (global $last_free (mut i32) (i32.const 0))
    (global $last_free_size (mut i32) (i32.const 0))
    (func (export "bridge_free") (param $p i32) (param $n i32)
        local.get $p
        global.set $last_free
        local.get $n
        global.set $last_free_size)
    (func (export "last_free") (result i32)
        global.get $last_free)
    (func (export "last_free_size") (result i32)
        global.get $last_free_size)
    (func (export "pages") (result i32)
        memory.size)
"#;

/// Assemble a guest: `imports` first, then the allocator, then `body`.
pub fn guest_wat(imports: &str, body: &str) -> String {
    format!("(module {} {} {})", imports, ALLOCATOR, body)
}

pub fn load_bridge(wat: &str) -> Bridge {
    load_bridge_with_config(wat, BridgeConfig::default())
}

pub fn load_bridge_with_config(wat: &str, config: BridgeConfig) -> Bridge {
    Bridge::new(wat.as_bytes(), config).expect("guest should validate")
}

/// Compile, instantiate and start a guest.
pub fn instantiate(wat: &str, imports: &HostImports) -> BridgeInstance {
    let mut instance = load_bridge(wat)
        .instantiate(imports)
        .expect("guest should instantiate");
    instance.start().expect("start should succeed");
    instance
}

/// Allocate `size` bytes through the guest allocator.
pub fn guest_alloc(instance: &mut BridgeInstance, size: u32) -> u32 {
    instance.guest().unwrap().malloc(size).unwrap()
}

pub fn read_word(instance: &mut BridgeInstance, ptr: u32) -> u32 {
    let guest = instance.guest().unwrap();
    let at = ptr as usize;
    let bytes: [u8; 4] = guest.memory()[at..at + 4].try_into().unwrap();
    u32::from_le_bytes(bytes)
}

pub fn write_word(instance: &mut BridgeInstance, ptr: u32, value: u32) {
    let mut guest = instance.guest().unwrap();
    let at = ptr as usize;
    guest.memory_mut()[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// An 8-byte exception slot pre-filled with a sentinel flag of 0.
pub fn exception_slot(instance: &mut BridgeInstance) -> u32 {
    let ptr = guest_alloc(instance, 8);
    write_word(instance, ptr, 0);
    write_word(instance, ptr + 4, 0xdead);
    ptr
}

/// Dereference a raw guest handle.
pub fn deref(instance: &BridgeInstance, raw: i32) -> HostValue {
    instance.state().heap.get(Handle::from_abi(raw)).unwrap()
}

/// `(tag, value)` pairs recorded by the guest through `host.log`.
pub type EventLog = Arc<Mutex<Vec<(i32, i32)>>>;

/// Define `host.log(tag: i32, value: i32)` recording into a fresh log.
pub fn define_log(imports: &mut HostImports) -> EventLog {
    let log: EventLog = Arc::default();
    let sink = log.clone();
    imports.define(
        "log",
        Signature::new(&[Param::I32, Param::I32], Ret::Void),
        move |_, args| {
            let tag = args[0].as_number().unwrap_or_default() as i32;
            let value = args[1].as_number().unwrap_or_default() as i32;
            sink.lock().unwrap().push((tag, value));
            Ok(HostValue::Undefined)
        },
    );
    log
}

pub fn events(log: &EventLog) -> Vec<(i32, i32)> {
    log.lock().unwrap().clone()
}
