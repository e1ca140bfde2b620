//! ORPC (Object RPC) header types (MS-DCOM 2.2.13, 2.2.14)
//!
//! Every ORPC request starts with an ORPCTHIS and every response with an
//! ORPCTHAT. Both carry an optional `[unique]` pointer to an extension array.
//!
//! ```text
//! ORPCTHIS                         ORPCTHAT
//!   version   COMVERSION             flags       u32
//!   flags     u32                    extensions  ORPC_EXTENT_ARRAY*
//!   reserved1 u32
//!   cid       GUID
//!   extensions ORPC_EXTENT_ARRAY*
//! ```

use midl_ndr::{
    wire_count, ConformantArray, NdrDecode, NdrEncode, NdrError, NdrPtr, NdrReader, NdrUuid,
    NdrWriter, UniquePtr,
};

use super::identifiers::generate_uuid;

type NdrResult<T> = midl_ndr::Result<T>;

/// COM version structure (MS-DCOM 2.2.11)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ComVersion {
    /// Major version number
    pub major: u16,
    /// Minor version number
    pub minor: u16,
}

impl ComVersion {
    /// DCOM version 5.1 (Windows 2000)
    pub const DCOM_5_1: Self = Self { major: 5, minor: 1 };
    /// DCOM version 5.7 (Windows 7)
    pub const DCOM_5_7: Self = Self { major: 5, minor: 7 };

    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl NdrEncode for ComVersion {
    fn ndr_align() -> usize {
        2
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> NdrResult<()> {
        w.write_u16(self.major);
        w.write_u16(self.minor);
        Ok(())
    }
}

impl NdrDecode for ComVersion {
    fn ndr_align() -> usize {
        2
    }

    fn ndr_decode(r: &mut NdrReader) -> NdrResult<Self> {
        Ok(Self {
            major: r.read_u16()?,
            minor: r.read_u16()?,
        })
    }
}

/// One ORPC extension (MS-DCOM 2.2.21.3)
///
/// `data` is padded with zeros to a multiple of 8 on the wire; the declared
/// size is `data.len()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrpcExtent {
    /// Extension identifier
    pub id: NdrUuid,
    pub data: Vec<u8>,
}

pub(super) fn padded_extent_len(size: usize) -> NdrResult<usize> {
    size.checked_add(7)
        .map(|n| n & !7)
        .ok_or(NdrError::IntegerOverflow)
}

impl NdrEncode for OrpcExtent {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> NdrResult<()> {
        // Conformant struct: the array's max_count leads the struct.
        let padded = padded_extent_len(self.data.len())?;
        w.write_count(padded)?;
        self.id.ndr_encode(w)?;
        w.write_count(self.data.len())?;
        w.write_bytes(&self.data);
        w.write_bytes(&vec![0u8; padded - self.data.len()]);
        Ok(())
    }
}

impl NdrDecode for OrpcExtent {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_decode(r: &mut NdrReader) -> NdrResult<Self> {
        let max_count = r.read_count()?;
        let id = NdrUuid::ndr_decode(r)?;
        let size = r.read_u32()? as usize;
        if padded_extent_len(size)? != max_count {
            return Err(NdrError::MalformedLength("extent size disagrees with conformance"));
        }
        let mut data = r.read_bytes(max_count)?.to_vec();
        data.truncate(size);
        Ok(Self { id, data })
    }
}

type ExtentSlots = UniquePtr<ConformantArray<UniquePtr<OrpcExtent>>>;

/// ORPC_EXTENT_ARRAY (MS-DCOM 2.2.21.2)
///
/// The slot array always has an even length; trailing slots are null.
#[derive(Clone, Debug, PartialEq)]
pub struct OrpcExtentArray {
    size: u32,
    slots: ExtentSlots,
}

impl OrpcExtentArray {
    pub fn new(extents: Vec<OrpcExtent>) -> NdrResult<Self> {
        let size = wire_count(extents.len())?;
        let mut slots: Vec<UniquePtr<OrpcExtent>> = extents.into_iter().map(UniquePtr::new).collect();
        if slots.len() % 2 == 1 {
            slots.push(UniquePtr::null());
        }
        Ok(Self {
            size,
            slots: UniquePtr::new(ConformantArray::new(slots)),
        })
    }

    /// Declared number of extents
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Non-null extents, in wire order
    pub fn extents(&self) -> impl Iterator<Item = &OrpcExtent> {
        self.slots
            .get()
            .into_iter()
            .flat_map(|slots| slots.0.iter())
            .filter_map(|slot| slot.get())
    }

    pub fn find(&self, id: &NdrUuid) -> Option<&OrpcExtent> {
        self.extents().find(|extent| extent.id == *id)
    }
}

impl Default for OrpcExtentArray {
    fn default() -> Self {
        Self {
            size: 0,
            slots: UniquePtr::new(ConformantArray::default()),
        }
    }
}

impl NdrEncode for OrpcExtentArray {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> NdrResult<()> {
        w.write_u32(self.size);
        w.write_u32(0);
        self.slots.ndr_encode(w)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> NdrResult<()> {
        self.slots.ndr_encode_deferred(w)
    }
}

impl NdrDecode for OrpcExtentArray {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_decode(r: &mut NdrReader) -> NdrResult<Self> {
        let size = r.read_u32()?;
        let _reserved = r.read_u32()?;
        Ok(Self {
            size,
            slots: ExtentSlots::ndr_decode(r)?,
        })
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader) -> NdrResult<()> {
        self.slots.ndr_decode_deferred(r)?;
        let expected = (self.size as usize + 1) & !1;
        match self.slots.get() {
            Some(slots) if slots.len() != expected => Err(NdrError::MalformedLength(
                "extent slot count disagrees with extent array size",
            )),
            _ => Ok(()),
        }
    }
}

/// ORPCTHIS structure (MS-DCOM 2.2.13)
///
/// Sent with every ORPC request from client to server.
#[derive(Clone, Debug, PartialEq)]
pub struct OrpcThis {
    /// COM version
    pub version: ComVersion,
    /// Flags (ORPCF_*)
    pub flags: u32,
    /// Reserved (must be 0)
    pub reserved1: u32,
    /// Causality ID (UUID identifying the call chain)
    pub causality_id: NdrUuid,
    /// Optional extension array
    pub extensions: UniquePtr<OrpcExtentArray>,
}

impl OrpcThis {
    /// Create a new ORPCTHIS starting a fresh causality chain
    pub fn new() -> Self {
        Self::with_causality(generate_uuid())
    }

    /// Create with a specific causality ID
    pub fn with_causality(causality_id: NdrUuid) -> Self {
        Self {
            version: ComVersion::DCOM_5_7,
            flags: 0,
            reserved1: 0,
            causality_id,
            extensions: UniquePtr::null(),
        }
    }

    pub fn with_version(mut self, version: ComVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_extensions(mut self, extensions: OrpcExtentArray) -> Self {
        self.extensions = UniquePtr::new(extensions);
        self
    }
}

impl Default for OrpcThis {
    fn default() -> Self {
        Self::new()
    }
}

impl NdrEncode for OrpcThis {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> NdrResult<()> {
        w.align(4);
        self.version.ndr_encode(w)?;
        w.write_u32(self.flags);
        w.write_u32(self.reserved1);
        self.causality_id.ndr_encode(w)?;
        self.extensions.ndr_encode(w)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> NdrResult<()> {
        self.extensions.ndr_encode_deferred(w)
    }
}

impl NdrDecode for OrpcThis {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_decode(r: &mut NdrReader) -> NdrResult<Self> {
        r.align(4)?;
        Ok(Self {
            version: ComVersion::ndr_decode(r)?,
            flags: r.read_u32()?,
            reserved1: r.read_u32()?,
            causality_id: NdrUuid::ndr_decode(r)?,
            extensions: UniquePtr::ndr_decode(r)?,
        })
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader) -> NdrResult<()> {
        self.extensions.ndr_decode_deferred(r)
    }
}

/// ORPCTHAT structure (MS-DCOM 2.2.14)
///
/// Returned with every ORPC response from server to client.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct OrpcThat {
    /// Flags (must be 0)
    pub flags: u32,
    /// Optional extension array
    pub extensions: UniquePtr<OrpcExtentArray>,
}

impl OrpcThat {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NdrEncode for OrpcThat {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> NdrResult<()> {
        w.write_u32(self.flags);
        self.extensions.ndr_encode(w)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> NdrResult<()> {
        self.extensions.ndr_encode_deferred(w)
    }
}

impl NdrDecode for OrpcThat {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_decode(r: &mut NdrReader) -> NdrResult<Self> {
        Ok(Self {
            flags: r.read_u32()?,
            extensions: UniquePtr::ndr_decode(r)?,
        })
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader) -> NdrResult<()> {
        self.extensions.ndr_decode_deferred(r)
    }
}
