//! Opaque integer handles naming host values across the guest boundary.

use std::fmt;

use crate::value::HostValue;

/// A small unsigned integer identifying a host value.
///
/// Values below [`Handle::RESERVED`] name fixed constants and are never
/// allocated, released, or reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    pub const UNDEFINED: Handle = Handle(0);
    pub const NULL: Handle = Handle(1);
    pub const TRUE: Handle = Handle(2);
    pub const FALSE: Handle = Handle(3);

    /// Number of reserved constant handles.
    pub const RESERVED: u32 = 4;

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Reinterpret an `i32` received from the guest.
    pub const fn from_abi(raw: i32) -> Self {
        Self(raw as u32)
    }

    /// The `i32` passed to the guest.
    pub const fn to_abi(self) -> i32 {
        self.0 as i32
    }

    pub const fn is_reserved(self) -> bool {
        self.0 < Self::RESERVED
    }

    /// The constant a reserved handle stands for.
    pub fn constant(self) -> Option<HostValue> {
        match self {
            Self::UNDEFINED => Some(HostValue::Undefined),
            Self::NULL => Some(HostValue::Null),
            Self::TRUE => Some(HostValue::Bool(true)),
            Self::FALSE => Some(HostValue::Bool(false)),
            _ => None,
        }
    }

    /// The reserved handle for a constant value, if it is one.
    pub fn for_constant(value: &HostValue) -> Option<Self> {
        match value {
            HostValue::Undefined => Some(Self::UNDEFINED),
            HostValue::Null => Some(Self::NULL),
            HostValue::Bool(true) => Some(Self::TRUE),
            HostValue::Bool(false) => Some(Self::FALSE),
            _ => None,
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
