//! Marshaling between managed values and native values.
//!
//! Declared type names are parsed into [`TypeRef`]s, resolved against the
//! active architecture into [`Marshal`] strategies once per binding, and then
//! applied on every call:
//!
//! - primitives pass by value, range-checked on the way out
//! - by-value structures are copied as bytes laid out with C rules
//! - object handles are wrapped into proxies as soon as they come back
//! - closures become trampolines the native side can call synchronously

use std::fmt;
use std::sync::Arc;

use tether_targets::{Arch, Endianness};

use crate::declaration::Ownership;
use crate::error::{BridgeError, Result};
use crate::lifecycle::{LifecycleManager, NativeObject};
use crate::runtime::NativeValue;
use crate::trampoline::CallScope;

/// A fixed-width scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl Primitive {
    pub fn size(self) -> usize {
        match self {
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// Alignment inside a structure on `arch`.
    pub fn align(self, arch: Arch) -> usize {
        // i386 System V aligns 8-byte scalars to 4 within aggregates.
        if arch == Arch::X86 {
            self.size().min(4)
        } else {
            self.size()
        }
    }

    /// The pointer-sized integer for `arch`.
    pub fn word(signed: bool, arch: Arch) -> Self {
        match (signed, arch.is_64_bit()) {
            (true, true) => Self::I64,
            (true, false) => Self::I32,
            (false, true) => Self::U64,
            (false, false) => Self::U32,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        let p = match name {
            "bool" => Self::Bool,
            "i8" => Self::I8,
            "i16" => Self::I16,
            "i32" => Self::I32,
            "i64" => Self::I64,
            "u8" => Self::U8,
            "u16" => Self::U16,
            "u32" => Self::U32,
            "u64" => Self::U64,
            "f32" => Self::F32,
            "f64" => Self::F64,
            _ => return None,
        };
        Some(p)
    }
}

/// A declared type name, before it is resolved for an architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Void,
    Primitive(Primitive),
    /// `isize` / `usize`: pointer-sized integers.
    Word { signed: bool },
    Object,
    Struct(String),
    Closure(String),
}

impl TypeRef {
    /// Parse a declared type: a primitive name, `void`, `object`, `isize`,
    /// `usize`, `struct:<Name>` or `closure:<Name>`.
    pub fn parse(input: &str) -> Result<Self> {
        let s = input.trim();
        if let Some(name) = s.strip_prefix("struct:") {
            return named(name, input).map(Self::Struct);
        }
        if let Some(name) = s.strip_prefix("closure:") {
            return named(name, input).map(Self::Closure);
        }
        match s {
            "void" => Ok(Self::Void),
            "object" => Ok(Self::Object),
            "isize" => Ok(Self::Word { signed: true }),
            "usize" => Ok(Self::Word { signed: false }),
            other => Primitive::from_name(other).map(Self::Primitive).ok_or_else(|| {
                BridgeError::InvalidDeclaration {
                    detail: format!("unknown type '{input}'"),
                }
            }),
        }
    }

    /// Resolve to a scalar on `arch`, if this names one.
    pub fn scalar(&self, arch: Arch) -> Option<Primitive> {
        match self {
            Self::Primitive(p) => Some(*p),
            Self::Word { signed } => Some(Primitive::word(*signed, arch)),
            _ => None,
        }
    }
}

fn named(name: &str, input: &str) -> Result<String> {
    if name.is_empty() {
        return Err(BridgeError::InvalidDeclaration {
            detail: format!("type '{input}' is missing a name"),
        });
    }
    Ok(name.to_string())
}

/// Placement of one field within a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub ty: Primitive,
    pub offset: usize,
}

/// C layout of a by-value structure on one architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub name: String,
    pub fields: Vec<FieldLayout>,
    pub size: usize,
    pub align: usize,
    pub endianness: Endianness,
}

impl StructLayout {
    /// Lay fields out in order, padding each to its alignment and the total
    /// to the largest alignment.
    pub fn compute(name: &str, fields: &[Primitive], arch: Arch) -> Self {
        let mut offset = 0;
        let mut align = 1;
        let mut placed = Vec::with_capacity(fields.len());
        for &ty in fields {
            let a = ty.align(arch);
            offset = round_up(offset, a);
            placed.push(FieldLayout { ty, offset });
            offset += ty.size();
            align = align.max(a);
        }
        Self {
            name: name.to_string(),
            fields: placed,
            size: round_up(offset, align),
            align,
            endianness: arch.descriptor().endianness,
        }
    }
}

fn round_up(n: usize, align: usize) -> usize {
    n.div_ceil(align) * align
}

/// A structure value: its layout and raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    layout: Arc<StructLayout>,
    bytes: Vec<u8>,
}

impl StructValue {
    pub fn zeroed(layout: Arc<StructLayout>) -> Self {
        let bytes = vec![0; layout.size];
        Self { layout, bytes }
    }

    pub fn from_bytes(layout: Arc<StructLayout>, bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != layout.size {
            return Err(marshal_error(format!(
                "struct {} is {} bytes, got {}",
                layout.name,
                layout.size,
                bytes.len()
            )));
        }
        Ok(Self { layout, bytes })
    }

    pub fn layout(&self) -> &StructLayout {
        &self.layout
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Read field `index`.
    pub fn get(&self, index: usize) -> Result<Value> {
        let field = self.field(index)?;
        let raw = &self.bytes[field.offset..field.offset + field.ty.size()];
        let native = decode_scalar(field.ty, raw, self.layout.endianness);
        scalar_from_native(field.ty, native)
    }

    /// Write field `index`, range-checking the value.
    pub fn set(&mut self, index: usize, value: &Value) -> Result<()> {
        let field = self.field(index)?;
        let native = scalar_to_native(field.ty, value)?;
        let encoded = encode_scalar(&native, self.layout.endianness);
        self.bytes[field.offset..field.offset + encoded.len()].copy_from_slice(&encoded);
        Ok(())
    }

    fn field(&self, index: usize) -> Result<FieldLayout> {
        self.layout.fields.get(index).copied().ok_or_else(|| {
            marshal_error(format!(
                "struct {} has no field {index}",
                self.layout.name
            ))
        })
    }
}

/// Signature of a closure passed to native code.
#[derive(Debug, PartialEq)]
pub struct ClosureSignature {
    pub name: String,
    pub args: Vec<Marshal>,
    pub ret: Marshal,
    /// Whether the trampoline outlives the call it was passed to.
    pub escaping: bool,
}

/// How one argument or return value crosses the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Marshal {
    Void,
    Primitive(Primitive),
    Object(Ownership),
    Struct(Arc<StructLayout>),
    Closure(Arc<ClosureSignature>),
}

impl fmt::Display for Marshal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Primitive(p) => f.write_str(p.name()),
            Self::Object(Ownership::Borrowed) => f.write_str("object"),
            Self::Object(Ownership::Transferred) => f.write_str("object (transferred)"),
            Self::Struct(layout) => write!(
                f,
                "struct {} ({} bytes, align {})",
                layout.name, layout.size, layout.align
            ),
            Self::Closure(sig) => {
                let kind = if sig.escaping { "escaping" } else { "scoped" };
                write!(f, "closure {} ({kind})", sig.name)
            }
        }
    }
}

/// Cached marshaling strategy for a bound operation.
#[derive(Debug, Clone, PartialEq)]
pub struct MarshalPlan {
    pub args: Vec<Marshal>,
    pub ret: Marshal,
}

impl fmt::Display for MarshalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

type ClosureFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// A managed function the native side may call back into.
#[derive(Clone)]
pub struct ManagedClosure(Arc<ClosureFn>);

impl ManagedClosure {
    pub fn new(f: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.0)(args)
    }
}

impl fmt::Debug for ManagedClosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ManagedClosure(..)")
    }
}

/// A managed-side value.
#[derive(Debug, Clone)]
pub enum Value {
    Void,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Object(Option<NativeObject>),
    Struct(StructValue),
    Closure(ManagedClosure),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&NativeObject> {
        match self {
            Self::Object(Some(obj)) => Some(obj),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<NativeObject> {
        match self {
            Self::Object(obj) => obj,
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::Object(_) => "object",
            Self::Struct(_) => "struct",
            Self::Closure(_) => "closure",
        }
    }
}

/// Convert a managed value for an outbound call. Closures are registered in
/// `scope`.
pub fn to_native(value: &Value, marshal: &Marshal, scope: &mut CallScope<'_>) -> Result<NativeValue> {
    match (marshal, value) {
        (Marshal::Void, _) => Ok(NativeValue::Void),
        (Marshal::Primitive(p), v) => scalar_to_native(*p, v),
        (Marshal::Object(_), Value::Object(None)) => Ok(NativeValue::Object(None)),
        (Marshal::Object(_), Value::Object(Some(obj))) => Ok(NativeValue::Object(Some(obj.handle()?))),
        (Marshal::Struct(layout), Value::Struct(sv)) => {
            if sv.layout.name != layout.name || sv.bytes.len() != layout.size {
                return Err(marshal_error(format!(
                    "expected struct {}, got struct {}",
                    layout.name, sv.layout.name
                )));
            }
            Ok(NativeValue::Struct(sv.bytes.clone()))
        }
        (Marshal::Closure(sig), Value::Closure(closure)) => {
            Ok(NativeValue::Closure(scope.register(sig.clone(), closure.clone())))
        }
        (m, v) => Err(marshal_error(format!("cannot pass {} as {m}", v.kind()))),
    }
}

/// Convert a native value coming back into managed code. Object handles are
/// wrapped into proxies immediately.
pub fn from_native(native: NativeValue, marshal: &Marshal, lifecycle: &LifecycleManager) -> Result<Value> {
    match (marshal, native) {
        (Marshal::Void, _) => Ok(Value::Void),
        (Marshal::Primitive(p), n) => scalar_from_native(*p, n),
        (Marshal::Object(_), NativeValue::Object(None)) => Ok(Value::Object(None)),
        (Marshal::Object(Ownership::Borrowed), NativeValue::Object(Some(h))) => {
            Ok(Value::Object(lifecycle.wrap(h, true)))
        }
        (Marshal::Object(Ownership::Transferred), NativeValue::Object(Some(h))) => {
            Ok(Value::Object(Some(lifecycle.adopt(h))))
        }
        (Marshal::Struct(layout), NativeValue::Struct(bytes)) => {
            StructValue::from_bytes(layout.clone(), bytes).map(Value::Struct)
        }
        (m, n) => Err(marshal_error(format!(
            "native side produced {} where {m} was expected",
            n.kind()
        ))),
    }
}

fn scalar_to_native(p: Primitive, value: &Value) -> Result<NativeValue> {
    match (p, value) {
        (Primitive::Bool, Value::Bool(b)) => return Ok(NativeValue::Bool(*b)),
        (Primitive::F32, Value::Float(f)) => {
            if f.is_finite() && f.abs() > f64::from(f32::MAX) {
                return Err(marshal_error(format!("{f} does not fit in f32")));
            }
            return Ok(NativeValue::F32(*f as f32));
        }
        (Primitive::F64, Value::Float(f)) => return Ok(NativeValue::F64(*f)),
        _ => {}
    }

    let wide = match value {
        Value::Int(i) => i128::from(*i),
        Value::UInt(u) => i128::from(*u),
        other => {
            return Err(marshal_error(format!(
                "cannot pass {} as {}",
                other.kind(),
                p.name()
            )))
        }
    };
    let out_of_range = || marshal_error(format!("{wide} does not fit in {}", p.name()));
    let native = match p {
        Primitive::I8 => NativeValue::I8(i8::try_from(wide).map_err(|_| out_of_range())?),
        Primitive::I16 => NativeValue::I16(i16::try_from(wide).map_err(|_| out_of_range())?),
        Primitive::I32 => NativeValue::I32(i32::try_from(wide).map_err(|_| out_of_range())?),
        Primitive::I64 => NativeValue::I64(i64::try_from(wide).map_err(|_| out_of_range())?),
        Primitive::U8 => NativeValue::U8(u8::try_from(wide).map_err(|_| out_of_range())?),
        Primitive::U16 => NativeValue::U16(u16::try_from(wide).map_err(|_| out_of_range())?),
        Primitive::U32 => NativeValue::U32(u32::try_from(wide).map_err(|_| out_of_range())?),
        Primitive::U64 => NativeValue::U64(u64::try_from(wide).map_err(|_| out_of_range())?),
        Primitive::Bool | Primitive::F32 | Primitive::F64 => {
            return Err(marshal_error(format!(
                "cannot pass {} as {}",
                value.kind(),
                p.name()
            )))
        }
    };
    Ok(native)
}

fn scalar_from_native(p: Primitive, native: NativeValue) -> Result<Value> {
    let value = match (p, native) {
        (Primitive::Bool, NativeValue::Bool(b)) => Value::Bool(b),
        (Primitive::I8, NativeValue::I8(v)) => Value::Int(v.into()),
        (Primitive::I16, NativeValue::I16(v)) => Value::Int(v.into()),
        (Primitive::I32, NativeValue::I32(v)) => Value::Int(v.into()),
        (Primitive::I64, NativeValue::I64(v)) => Value::Int(v),
        (Primitive::U8, NativeValue::U8(v)) => Value::UInt(v.into()),
        (Primitive::U16, NativeValue::U16(v)) => Value::UInt(v.into()),
        (Primitive::U32, NativeValue::U32(v)) => Value::UInt(v.into()),
        (Primitive::U64, NativeValue::U64(v)) => Value::UInt(v),
        (Primitive::F32, NativeValue::F32(v)) => Value::Float(v.into()),
        (Primitive::F64, NativeValue::F64(v)) => Value::Float(v),
        (p, other) => {
            return Err(marshal_error(format!(
                "native side produced {} where {} was expected",
                other.kind(),
                p.name()
            )))
        }
    };
    Ok(value)
}

fn encode_scalar(value: &NativeValue, endianness: Endianness) -> Vec<u8> {
    macro_rules! bytes {
        ($v:expr) => {
            match endianness {
                Endianness::Little => $v.to_le_bytes().to_vec(),
                Endianness::Big => $v.to_be_bytes().to_vec(),
            }
        };
    }
    match value {
        NativeValue::Bool(b) => vec![u8::from(*b)],
        NativeValue::I8(v) => bytes!(v),
        NativeValue::I16(v) => bytes!(v),
        NativeValue::I32(v) => bytes!(v),
        NativeValue::I64(v) => bytes!(v),
        NativeValue::U8(v) => bytes!(v),
        NativeValue::U16(v) => bytes!(v),
        NativeValue::U32(v) => bytes!(v),
        NativeValue::U64(v) => bytes!(v),
        NativeValue::F32(v) => bytes!(v),
        NativeValue::F64(v) => bytes!(v),
        _ => Vec::new(),
    }
}

fn decode_scalar(p: Primitive, raw: &[u8], endianness: Endianness) -> NativeValue {
    macro_rules! read {
        ($t:ty) => {{
            let mut buf = [0u8; std::mem::size_of::<$t>()];
            buf.copy_from_slice(raw);
            match endianness {
                Endianness::Little => <$t>::from_le_bytes(buf),
                Endianness::Big => <$t>::from_be_bytes(buf),
            }
        }};
    }
    match p {
        Primitive::Bool => NativeValue::Bool(raw[0] != 0),
        Primitive::I8 => NativeValue::I8(read!(i8)),
        Primitive::I16 => NativeValue::I16(read!(i16)),
        Primitive::I32 => NativeValue::I32(read!(i32)),
        Primitive::I64 => NativeValue::I64(read!(i64)),
        Primitive::U8 => NativeValue::U8(read!(u8)),
        Primitive::U16 => NativeValue::U16(read!(u16)),
        Primitive::U32 => NativeValue::U32(read!(u32)),
        Primitive::U64 => NativeValue::U64(read!(u64)),
        Primitive::F32 => NativeValue::F32(read!(f32)),
        Primitive::F64 => NativeValue::F64(read!(f64)),
    }
}

fn marshal_error(detail: String) -> BridgeError {
    BridgeError::Marshal { detail }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_type_names() {
        assert_eq!(TypeRef::parse("void").unwrap(), TypeRef::Void);
        assert_eq!(TypeRef::parse(" u16 ").unwrap(), TypeRef::Primitive(Primitive::U16));
        assert_eq!(TypeRef::parse("object").unwrap(), TypeRef::Object);
        assert_eq!(
            TypeRef::parse("struct:CGPoint").unwrap(),
            TypeRef::Struct("CGPoint".into())
        );
        assert_eq!(
            TypeRef::parse("closure:Completion").unwrap(),
            TypeRef::Closure("Completion".into())
        );
        assert!(TypeRef::parse("struct:").is_err());
        assert!(TypeRef::parse("long double").is_err());
    }

    #[test]
    fn word_follows_arch() {
        let usize_ref = TypeRef::parse("usize").unwrap();
        assert_eq!(usize_ref.scalar(Arch::Arm64), Some(Primitive::U64));
        assert_eq!(usize_ref.scalar(Arch::Thumbv7), Some(Primitive::U32));
        assert_eq!(TypeRef::Object.scalar(Arch::Arm64), None);
    }

    #[test]
    fn layout_pads_fields() {
        // struct { u8; i32; u16 } -> offsets 0, 4, 8; size 12
        let layout = StructLayout::compute(
            "Mixed",
            &[Primitive::U8, Primitive::I32, Primitive::U16],
            Arch::Arm64,
        );
        let offsets: Vec<usize> = layout.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert_eq!(layout.size, 12);
        assert_eq!(layout.align, 4);
    }

    #[test]
    fn i386_aligns_doubles_to_four() {
        let fields = [Primitive::I32, Primitive::F64];
        let x86 = StructLayout::compute("S", &fields, Arch::X86);
        assert_eq!(x86.fields[1].offset, 4);
        assert_eq!(x86.size, 12);

        let arm = StructLayout::compute("S", &fields, Arch::Thumbv7);
        assert_eq!(arm.fields[1].offset, 8);
        assert_eq!(arm.size, 16);
    }

    #[test]
    fn empty_struct_has_zero_size() {
        let layout = StructLayout::compute("Empty", &[], Arch::X86_64);
        assert_eq!(layout.size, 0);
        assert_eq!(layout.align, 1);
    }

    #[test]
    fn struct_fields_read_back() {
        let layout = Arc::new(StructLayout::compute(
            "CGPoint",
            &[Primitive::F64, Primitive::F64],
            Arch::X86_64,
        ));
        let mut point = StructValue::zeroed(layout);
        point.set(0, &Value::Float(1.5)).unwrap();
        point.set(1, &Value::Float(-2.0)).unwrap();
        assert_eq!(point.bytes()[..8], 1.5f64.to_le_bytes());
        assert_eq!(point.get(1).unwrap().as_f64(), Some(-2.0));
        assert!(point.get(2).is_err());
    }

    #[test]
    fn integer_range_is_checked() {
        assert_eq!(
            scalar_to_native(Primitive::U8, &Value::Int(255)).unwrap(),
            NativeValue::U8(255)
        );
        assert!(scalar_to_native(Primitive::U8, &Value::Int(256)).is_err());
        assert!(scalar_to_native(Primitive::U32, &Value::Int(-1)).is_err());
        assert_eq!(
            scalar_to_native(Primitive::I64, &Value::UInt(7)).unwrap(),
            NativeValue::I64(7)
        );
        assert!(scalar_to_native(Primitive::I64, &Value::UInt(u64::MAX)).is_err());
        assert!(scalar_to_native(Primitive::I32, &Value::Bool(true)).is_err());
        assert!(scalar_to_native(Primitive::F32, &Value::Float(1e300)).is_err());
    }

    #[test]
    fn native_kind_mismatch_is_an_error() {
        let err = scalar_from_native(Primitive::Bool, NativeValue::I32(1)).unwrap_err();
        assert!(err.to_string().contains("i32"));
        assert_eq!(
            scalar_from_native(Primitive::U16, NativeValue::U16(9))
                .unwrap()
                .as_i64(),
            Some(9)
        );
    }

    #[test]
    fn plan_display() {
        let plan = MarshalPlan {
            args: vec![Marshal::Primitive(Primitive::I32), Marshal::Object(Ownership::Borrowed)],
            ret: Marshal::Object(Ownership::Transferred),
        };
        assert_eq!(plan.to_string(), "(i32, object) -> object (transferred)");
    }
}
