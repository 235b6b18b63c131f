//! Per-instance bridge state held in the Wasmtime Store.
//!
//! `BridgeState` owns the handle table, the memory view cache, the string
//! marshaller's length side channel, named host globals and the one-shot
//! task queue. It is created when an instance is built and dropped with it,
//! which releases every host value the guest still held.

use std::collections::{BTreeMap, VecDeque};

use heapbridge_hostapi::{HandleTable, HostValue};
use wasmtime::{StoreLimits, StoreLimitsBuilder};

use crate::config::BridgeConfig;
use crate::guest::GuestExports;
use crate::memory::{ViewCache, WASM_PAGE_SIZE};

/// Per-instance mutable state held in the Wasmtime `Store`.
pub struct BridgeState {
    /// Host values addressed by guest handles.
    pub heap: HandleTable,
    /// Cached memory views.
    pub views: ViewCache,
    /// Byte length written by the most recent string encode.
    pub last_encode_len: u32,
    globals: BTreeMap<String, HostValue>,
    tasks: VecDeque<HostValue>,
    debug_max_depth: usize,
    pub(crate) limits: StoreLimits,
    pub(crate) exports: Option<GuestExports>,
}

impl BridgeState {
    pub fn new(config: &BridgeConfig) -> Self {
        let limits = StoreLimitsBuilder::new()
            .memory_size(config.max_memory_pages as usize * WASM_PAGE_SIZE)
            .build();
        Self {
            heap: HandleTable::new(),
            views: ViewCache::new(),
            last_encode_len: 0,
            globals: BTreeMap::new(),
            tasks: VecDeque::new(),
            debug_max_depth: config.debug_max_depth,
            limits,
            exports: None,
        }
    }

    pub fn debug_max_depth(&self) -> usize {
        self.debug_max_depth
    }

    /// Publish a host value under `name` for `global_get`.
    pub fn set_global(&mut self, name: &str, value: HostValue) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn global(&self, name: &str) -> Option<HostValue> {
        self.globals.get(name).cloned()
    }

    pub fn remove_global(&mut self, name: &str) -> Option<HostValue> {
        self.globals.remove(name)
    }

    /// Queue a function to be called once by the next task drain.
    pub fn schedule(&mut self, f: HostValue) {
        tracing::trace!(target: "heapbridge::runtime", pending = self.tasks.len() + 1, "scheduled task");
        self.tasks.push_back(f);
    }

    pub(crate) fn next_task(&mut self) -> Option<HostValue> {
        self.tasks.pop_front()
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_empty() {
        let state = BridgeState::new(&BridgeConfig::default());
        assert_eq!(state.heap.live_count(), 0);
        assert_eq!(state.last_encode_len, 0);
        assert_eq!(state.pending_tasks(), 0);
        assert_eq!(state.debug_max_depth(), 16);
        assert!(state.exports.is_none());
    }

    #[test]
    fn test_globals() {
        let mut state = BridgeState::new(&BridgeConfig::default());
        state.set_global("answer", HostValue::from(42));
        assert_eq!(state.global("answer"), Some(HostValue::from(42)));
        assert_eq!(state.remove_global("answer"), Some(HostValue::from(42)));
        assert_eq!(state.global("answer"), None);
    }

    #[test]
    fn test_tasks_are_fifo() {
        let mut state = BridgeState::new(&BridgeConfig::default());
        let a = HostValue::native("a", |_| Ok(HostValue::Undefined));
        let b = HostValue::native("b", |_| Ok(HostValue::Undefined));
        state.schedule(a.clone());
        state.schedule(b.clone());
        assert_eq!(state.next_task(), Some(a));
        assert_eq!(state.next_task(), Some(b));
        assert_eq!(state.next_task(), None);
    }
}
