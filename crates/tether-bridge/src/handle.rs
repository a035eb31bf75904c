//! Opaque native identifiers.
//!
//! All of these are raw addresses (or ids) owned by the native runtime. They
//! are never dereferenced on the managed side.

use std::fmt;
use std::num::NonZeroUsize;

macro_rules! native_address {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroUsize);

        impl $name {
            /// Wrap a raw address. Null yields `None`.
            pub fn from_raw(addr: usize) -> Option<Self> {
                NonZeroUsize::new(addr).map(Self)
            }

            pub fn addr(self) -> usize {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{:x}", self.0)
            }
        }
    };
}

native_address! {
    /// A native object reference.
    Handle
}

native_address! {
    /// A native class (or protocol) object.
    ClassHandle
}

native_address! {
    /// A resolved native entry point: a method implementation or an exported function.
    EntryPoint
}

/// Identifies a managed closure the native runtime may call back into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrampolineId(pub u64);

impl fmt::Display for TrampolineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_none() {
        assert!(Handle::from_raw(0).is_none());
        assert!(ClassHandle::from_raw(0).is_none());
        let h = Handle::from_raw(0x1000).unwrap();
        assert_eq!(h.addr(), 0x1000);
        assert_eq!(h.to_string(), "0x1000");
    }
}
