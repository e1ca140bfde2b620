//! DCOM identifier types (MS-DCOM 2.2.18)
//!
//! - OXID: Object Exporter Identifier
//! - OID: Object Identifier
//! - IPID: Interface Pointer Identifier

use std::fmt;

use midl_ndr::{NdrDecode, NdrEncode, NdrReader, NdrUuid, NdrWriter};

/// Generate a new random v4 UUID in NDR layout
pub fn generate_uuid() -> NdrUuid {
    NdrUuid::from_bytes_le(uuid::Uuid::new_v4().to_bytes_le())
}

/// Object Exporter Identifier (8 bytes)
///
/// Names the server that hosts a set of objects. Carried in every STDOBJREF
/// the server hands out.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Oxid(pub u64);

impl Oxid {
    /// Generate a random OXID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().as_u64_pair().0)
    }
}

impl fmt::Debug for Oxid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OXID({:016x})", self.0)
    }
}

impl fmt::Display for Oxid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Object Identifier (8 bytes)
///
/// Identifies one object inside this server; every IPID registered for the
/// same object carries the same OID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Oid(pub u64);

impl Oid {
    /// Generate a random OID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().as_u64_pair().0)
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OID({:016x})", self.0)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

macro_rules! impl_ndr_u64_id {
    ($($ty:ident),*) => {
        $(
            impl NdrEncode for $ty {
                fn ndr_align() -> usize {
                    8
                }

                fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
                    w.write_u64(self.0);
                    Ok(())
                }
            }

            impl NdrDecode for $ty {
                fn ndr_align() -> usize {
                    8
                }

                fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
                    r.read_u64().map(Self)
                }
            }
        )*
    };
}

impl_ndr_u64_id!(Oxid, Oid);

/// Interface Pointer Identifier (16 bytes)
///
/// Names one (object, interface) pair. Calls are addressed by IPID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Ipid(pub NdrUuid);

impl Ipid {
    pub fn new(uuid: NdrUuid) -> Self {
        Self(uuid)
    }

    /// Generate a random IPID
    pub fn generate() -> Self {
        Self(generate_uuid())
    }

    pub fn nil() -> Self {
        Self(NdrUuid::NIL)
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Debug for Ipid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IPID({})", self.0)
    }
}

impl fmt::Display for Ipid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl NdrEncode for Ipid {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        self.0.ndr_encode(w)
    }
}

impl NdrDecode for Ipid {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        NdrUuid::ndr_decode(r).map(Self)
    }
}
