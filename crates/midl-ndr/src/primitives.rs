//! NDR primitive type implementations
//!
//! NDR primitive types and their encodings:
//!
//! | MIDL Type      | Rust Type     | Size | Alignment |
//! |----------------|---------------|------|-----------|
//! | boolean        | bool          | 1    | 1         |
//! | byte/char      | u8            | 1    | 1         |
//! | small          | i8            | 1    | 1         |
//! | short          | i16           | 2    | 2         |
//! | unsigned short | u16           | 2    | 2         |
//! | VARIANT_BOOL   | VariantBool   | 2    | 2         |
//! | enum           | `ndr_enum!`   | 2    | 2         |
//! | v1_enum        | `ndr_enum!`   | 4    | 4         |
//! | long/int       | i32           | 4    | 4         |
//! | unsigned long  | u32           | 4    | 4         |
//! | float          | f32           | 4    | 4         |
//! | hyper          | i64           | 8    | 8         |
//! | unsigned hyper | u64           | 8    | 8         |
//! | double         | f64           | 8    | 8         |
//! | GUID           | NdrUuid       | 16   | 4         |

use bytes::Bytes;

use crate::{NdrContext, NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, Result};

// Every primitive is carried on the wire through its unsigned bit pattern.
macro_rules! impl_ndr_primitive {
    ($ty:ty, $align:expr, $put:ident, $get:ident, $raw:ty) => {
        impl NdrEncode for $ty {
            fn ndr_align() -> usize {
                $align
            }

            fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
                w.$put(*self as $raw);
                Ok(())
            }
        }

        impl NdrDecode for $ty {
            fn ndr_align() -> usize {
                $align
            }

            fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
                Ok(r.$get()? as $ty)
            }
        }
    };
}

impl_ndr_primitive!(u8, 1, write_u8, read_u8, u8);
impl_ndr_primitive!(i8, 1, write_u8, read_u8, u8);
impl_ndr_primitive!(u16, 2, write_u16, read_u16, u16);
impl_ndr_primitive!(i16, 2, write_u16, read_u16, u16);
impl_ndr_primitive!(u32, 4, write_u32, read_u32, u32);
impl_ndr_primitive!(i32, 4, write_u32, read_u32, u32);
impl_ndr_primitive!(u64, 8, write_u64, read_u64, u64);
impl_ndr_primitive!(i64, 8, write_u64, read_u64, u64);

impl NdrEncode for f32 {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        w.write_u32(self.to_bits());
        Ok(())
    }
}

impl NdrDecode for f32 {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        Ok(f32::from_bits(r.read_u32()?))
    }
}

impl NdrEncode for f64 {
    fn ndr_align() -> usize {
        8
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        w.write_u64(self.to_bits());
        Ok(())
    }
}

impl NdrDecode for f64 {
    fn ndr_align() -> usize {
        8
    }

    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        Ok(f64::from_bits(r.read_u64()?))
    }
}

impl NdrEncode for bool {
    fn ndr_align() -> usize {
        1
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        w.write_u8(u8::from(*self));
        Ok(())
    }
}

impl NdrDecode for bool {
    fn ndr_align() -> usize {
        1
    }

    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        Ok(r.read_u8()? != 0)
    }
}

/// OLE Automation boolean: 16 bits, `-1` true, `0` false.
///
/// Any other value received from a peer is kept verbatim so it re-encodes
/// to the same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VariantBool(pub i16);

impl VariantBool {
    pub const TRUE: Self = Self(-1);
    pub const FALSE: Self = Self(0);

    /// `None` for values other than the two canonical ones
    pub fn as_bool(self) -> Option<bool> {
        match self.0 {
            -1 => Some(true),
            0 => Some(false),
            _ => None,
        }
    }

    /// Truthiness as COM callers test it: anything nonzero
    pub fn is_true(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for VariantBool {
    fn from(value: bool) -> Self {
        if value {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }
}

impl NdrEncode for VariantBool {
    fn ndr_align() -> usize {
        2
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        self.0.ndr_encode(w)
    }
}

impl NdrDecode for VariantBool {
    fn ndr_align() -> usize {
        2
    }

    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        i16::ndr_decode(r).map(Self)
    }
}

/// Declares a C-like enumeration with an explicit NDR backing width.
///
/// `u16` gives the default MIDL `enum` encoding, `u32` gives `v1_enum`.
/// Decoding an undeclared discriminant fails with
/// [`NdrError::InvalidEnumValue`].
///
/// ```
/// midl_ndr::ndr_enum! {
///     pub enum QueueAccess: u16 {
///         Receive = 1,
///         Send = 2,
///         Peek = 32,
///     }
/// }
/// ```
#[macro_export]
macro_rules! ndr_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $repr:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr($repr)]
        $vis enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            /// Map a wire discriminant to a declared variant
            pub fn from_repr(raw: $repr) -> ::core::option::Option<Self> {
                $(if raw == $value { return ::core::option::Option::Some(Self::$variant); })+
                ::core::option::Option::None
            }
        }

        impl $crate::NdrEncode for $name {
            fn ndr_align() -> usize {
                <$repr as $crate::NdrEncode>::ndr_align()
            }

            fn ndr_encode(&self, w: &mut $crate::NdrWriter) -> $crate::Result<()> {
                $crate::NdrEncode::ndr_encode(&(*self as $repr), w)
            }
        }

        impl $crate::NdrDecode for $name {
            fn ndr_align() -> usize {
                <$repr as $crate::NdrDecode>::ndr_align()
            }

            fn ndr_decode(r: &mut $crate::NdrReader) -> $crate::Result<Self> {
                let raw = <$repr as $crate::NdrDecode>::ndr_decode(r)?;
                Self::from_repr(raw).ok_or($crate::NdrError::InvalidEnumValue {
                    type_name: stringify!($name),
                    value: raw as u32,
                })
            }
        }
    };
}

/// UUID/GUID in its NDR struct layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct NdrUuid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl NdrUuid {
    /// Nil UUID
    pub const NIL: Self = Self {
        data1: 0,
        data2: 0,
        data3: 0,
        data4: [0; 8],
    };

    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }

    /// Parse from string "xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx"
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() != 36 {
            return None;
        }
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 5 || parts[4].len() != 12 {
            return None;
        }

        let data1 = u32::from_str_radix(parts[0], 16).ok()?;
        let data2 = u16::from_str_radix(parts[1], 16).ok()?;
        let data3 = u16::from_str_radix(parts[2], 16).ok()?;
        let clock = u16::from_str_radix(parts[3], 16).ok()?;

        let mut data4 = [0u8; 8];
        data4[..2].copy_from_slice(&clock.to_be_bytes());
        for (i, byte) in data4[2..].iter_mut().enumerate() {
            *byte = u8::from_str_radix(parts[4].get(i * 2..i * 2 + 2)?, 16).ok()?;
        }

        Some(Self::new(data1, data2, data3, data4))
    }

    /// Little-endian (Microsoft) byte layout, as RFC 4122 libraries expose it
    /// under `to_bytes_le`.
    pub fn from_bytes_le(b: [u8; 16]) -> Self {
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(&b[8..]);
        Self::new(
            u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            u16::from_le_bytes([b[4], b[5]]),
            u16::from_le_bytes([b[6], b[7]]),
            data4,
        )
    }

    pub fn to_bytes_le(&self) -> [u8; 16] {
        let mut b = [0u8; 16];
        b[..4].copy_from_slice(&self.data1.to_le_bytes());
        b[4..6].copy_from_slice(&self.data2.to_le_bytes());
        b[6..8].copy_from_slice(&self.data3.to_le_bytes());
        b[8..].copy_from_slice(&self.data4);
        b
    }
}

impl std::fmt::Display for NdrUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-",
            self.data1, self.data2, self.data3, self.data4[0], self.data4[1],
        )?;
        for byte in &self.data4[2..] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl NdrEncode for NdrUuid {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        w.write_u32(self.data1);
        w.write_u16(self.data2);
        w.write_u16(self.data3);
        w.write_bytes(&self.data4);
        Ok(())
    }
}

impl NdrDecode for NdrUuid {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        let data1 = r.read_u32()?;
        let data2 = r.read_u16()?;
        let data3 = r.read_u16()?;
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(&r.read_bytes(8)?);
        Ok(Self::new(data1, data2, data3, data4))
    }
}

/// Wire kind of a scalar value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// MIDL `enum`, 16-bit backing
    Enum16,
    /// MIDL `v1_enum`, 32-bit backing
    Enum32,
    VariantBool,
}

impl ScalarKind {
    /// Encoded size in bytes, which is also the natural alignment
    pub fn size(self) -> usize {
        match self {
            ScalarKind::U8 | ScalarKind::I8 => 1,
            ScalarKind::U16 | ScalarKind::I16 | ScalarKind::Enum16 | ScalarKind::VariantBool => 2,
            ScalarKind::U32 | ScalarKind::I32 | ScalarKind::F32 | ScalarKind::Enum32 => 4,
            ScalarKind::U64 | ScalarKind::I64 | ScalarKind::F64 => 8,
        }
    }
}

/// A scalar value tagged with its wire kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Enum16(u16),
    Enum32(u32),
    VariantBool(VariantBool),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::U8(_) => ScalarKind::U8,
            Scalar::I8(_) => ScalarKind::I8,
            Scalar::U16(_) => ScalarKind::U16,
            Scalar::I16(_) => ScalarKind::I16,
            Scalar::U32(_) => ScalarKind::U32,
            Scalar::I32(_) => ScalarKind::I32,
            Scalar::U64(_) => ScalarKind::U64,
            Scalar::I64(_) => ScalarKind::I64,
            Scalar::F32(_) => ScalarKind::F32,
            Scalar::F64(_) => ScalarKind::F64,
            Scalar::Enum16(_) => ScalarKind::Enum16,
            Scalar::Enum32(_) => ScalarKind::Enum32,
            Scalar::VariantBool(_) => ScalarKind::VariantBool,
        }
    }
}

impl NdrWriter {
    /// Pad to the scalar's natural alignment, then write it
    pub fn write_scalar(&mut self, value: Scalar) {
        match value {
            Scalar::U8(v) => self.write_u8(v),
            Scalar::I8(v) => self.write_u8(v as u8),
            Scalar::U16(v) | Scalar::Enum16(v) => self.write_u16(v),
            Scalar::I16(v) | Scalar::VariantBool(VariantBool(v)) => self.write_u16(v as u16),
            Scalar::U32(v) | Scalar::Enum32(v) => self.write_u32(v),
            Scalar::I32(v) => self.write_u32(v as u32),
            Scalar::U64(v) => self.write_u64(v),
            Scalar::I64(v) => self.write_u64(v as u64),
            Scalar::F32(v) => self.write_u32(v.to_bits()),
            Scalar::F64(v) => self.write_u64(v.to_bits()),
        }
    }
}

impl NdrReader {
    /// Consume padding to the kind's natural alignment, then read it
    pub fn read_scalar(&mut self, kind: ScalarKind) -> Result<Scalar> {
        Ok(match kind {
            ScalarKind::U8 => Scalar::U8(self.read_u8()?),
            ScalarKind::I8 => Scalar::I8(self.read_u8()? as i8),
            ScalarKind::U16 => Scalar::U16(self.read_u16()?),
            ScalarKind::I16 => Scalar::I16(self.read_u16()? as i16),
            ScalarKind::U32 => Scalar::U32(self.read_u32()?),
            ScalarKind::I32 => Scalar::I32(self.read_u32()? as i32),
            ScalarKind::U64 => Scalar::U64(self.read_u64()?),
            ScalarKind::I64 => Scalar::I64(self.read_u64()? as i64),
            ScalarKind::F32 => Scalar::F32(f32::from_bits(self.read_u32()?)),
            ScalarKind::F64 => Scalar::F64(f64::from_bits(self.read_u64()?)),
            ScalarKind::Enum16 => Scalar::Enum16(self.read_u16()?),
            ScalarKind::Enum32 => Scalar::Enum32(self.read_u32()?),
            ScalarKind::VariantBool => Scalar::VariantBool(VariantBool(self.read_u16()? as i16)),
        })
    }
}

/// Encode a lone scalar as a payload starting at offset zero
pub fn encode_scalar(value: Scalar, ctx: NdrContext) -> Result<Bytes> {
    let mut w = NdrWriter::new(ctx);
    w.write_scalar(value);
    w.into_bytes()
}

/// Decode a lone scalar from the start of `buf`
pub fn decode_scalar(buf: impl Into<Bytes>, kind: ScalarKind, ctx: NdrContext) -> Result<Scalar> {
    let mut r = NdrReader::new(buf, ctx);
    r.read_scalar(kind)
}
