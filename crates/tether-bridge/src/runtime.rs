//! The seam between the bridge and the native object runtime.
//!
//! Everything the bridge needs from the native side goes through
//! [`NativeRuntime`]: class lookup, dynamic method resolution, calls, and
//! reference counting. A platform provides one implementation; tests provide
//! an in-process fake.

use crate::error::Result;
use crate::handle::{ClassHandle, EntryPoint, Handle, TrampolineId};
use crate::trampoline::Trampolines;

/// A value as it crosses the native calling convention.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Void,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    /// An object reference; `None` is the null handle.
    Object(Option<Handle>),
    /// A by-value structure, laid out for the active architecture.
    Struct(Vec<u8>),
    /// A managed closure, callable through the trampoline table.
    Closure(TrampolineId),
}

impl NativeValue {
    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool(_) => "bool",
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Object(_) => "object",
            Self::Struct(_) => "struct",
            Self::Closure(_) => "closure",
        }
    }
}

/// Operations the native object runtime provides.
///
/// Implementations must be callable from any thread. The bridge never holds
/// one of its own locks across [`NativeRuntime::call`], so a call may re-enter
/// managed code through `trampolines` and dispatch further native calls.
pub trait NativeRuntime: Send + Sync {
    /// Look a class up by native name.
    fn lookup_class(&self, name: &str) -> Option<ClassHandle>;

    /// The actual class of a live object, or `None` if the object is gone.
    fn class_of(&self, object: Handle) -> Option<ClassHandle>;

    /// Human-readable class name for diagnostics.
    fn class_name(&self, class: ClassHandle) -> String {
        class.to_string()
    }

    /// Resolve the implementation a class (or its ancestors) provides for a
    /// selector.
    fn resolve_method(&self, class: ClassHandle, selector: &str) -> Option<EntryPoint>;

    /// Resolve an exported function. `None` for `library` means the process
    /// image.
    fn resolve_symbol(&self, library: Option<&str>, symbol: &str) -> Option<EntryPoint>;

    /// Call a resolved entry point.
    fn call(
        &self,
        entry: EntryPoint,
        receiver: Option<Handle>,
        args: &[NativeValue],
        trampolines: &Trampolines,
    ) -> Result<NativeValue>;

    /// Install a trampoline as the implementation of `selector` on `class`.
    /// The runtime keeps `trampolines` to call it later.
    fn register_callback(
        &self,
        class: ClassHandle,
        selector: &str,
        trampoline: TrampolineId,
        trampolines: Trampolines,
    ) -> Result<()>;

    fn retain(&self, object: Handle);

    fn release(&self, object: Handle);
}
