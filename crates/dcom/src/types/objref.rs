//! Marshaled interface pointers (MS-DCOM 2.2.18)
//!
//! An interface pointer crosses the wire as an `MInterfacePointer`, an NDR
//! conformant byte blob. The blob holds an OBJREF, which is not NDR: it is
//! always little-endian and packed, so the STDOBJREF lands at offset 24.
//!
//! ```text
//! OBJREF
//!   signature  u32  "MEOW"
//!   flags      u32  STANDARD | HANDLER | CUSTOM | EXTENDED
//!   iid        GUID
//!   u_objref   variant body
//! ```

use bytes::Bytes;
use midl_ndr::{
    wire_count, NdrContext, NdrDecode, NdrEncode, NdrError, NdrReader, NdrUuid, NdrWriter,
    Result as NdrResult,
};

use super::identifiers::{Ipid, Oid, Oxid};
use super::orpc::padded_extent_len;

/// OBJREF signature, "MEOW" in little-endian byte order
pub const OBJREF_SIGNATURE: u32 = 0x574F_454D;

/// Signature guarding the element block of an extended OBJREF ("VYSN")
pub const EXTENDED_SIGNATURE: u32 = 0x4E53_5956;

/// OBJREF flags selecting the variant body
pub mod objref_flags {
    pub const STANDARD: u32 = 0x1;
    pub const HANDLER: u32 = 0x2;
    pub const CUSTOM: u32 = 0x4;
    pub const EXTENDED: u32 = 0x8;
}

/// STDOBJREF flags
pub mod sorf {
    /// The client does not ping the object
    pub const NOPING: u32 = 0x1000;
}

/// Tower ids for string bindings
pub mod tower_id {
    pub const NCACN_IP_TCP: u16 = 0x07;
    pub const NCACN_NP: u16 = 0x0F;
    pub const NCALRPC: u16 = 0x10;
    pub const NCACN_HTTP: u16 = 0x1F;
}

/// Authentication services for security bindings
pub mod authn_svc {
    pub const GSS_NEGOTIATE: u16 = 9;
    pub const WINNT: u16 = 10;
    pub const GSS_KERBEROS: u16 = 16;
}

/// Authorization service written when none is requested
pub const AUTHZ_NONE: u16 = 0xFFFF;

/// STDOBJREF (MS-DCOM 2.2.18.2)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct StdObjRef {
    pub flags: u32,
    /// References handed to the receiver along with this pointer
    pub public_refs: u32,
    pub oxid: Oxid,
    pub oid: Oid,
    pub ipid: Ipid,
}

impl StdObjRef {
    /// Encoded size in bytes
    pub const SIZE: usize = 40;

    pub fn new(oxid: Oxid, oid: Oid, ipid: Ipid, public_refs: u32) -> Self {
        Self {
            flags: 0,
            public_refs,
            oxid,
            oid,
            ipid,
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn requires_pinging(&self) -> bool {
        self.flags & sorf::NOPING == 0
    }
}

impl NdrEncode for StdObjRef {
    fn ndr_align() -> usize {
        8
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> NdrResult<()> {
        w.align(8);
        w.write_u32(self.flags);
        w.write_u32(self.public_refs);
        self.oxid.ndr_encode(w)?;
        self.oid.ndr_encode(w)?;
        self.ipid.ndr_encode(w)
    }
}

impl NdrDecode for StdObjRef {
    fn ndr_align() -> usize {
        8
    }

    fn ndr_decode(r: &mut NdrReader) -> NdrResult<Self> {
        r.align(8)?;
        Ok(Self {
            flags: r.read_u32()?,
            public_refs: r.read_u32()?,
            oxid: Oxid::ndr_decode(r)?,
            oid: Oid::ndr_decode(r)?,
            ipid: Ipid::ndr_decode(r)?,
        })
    }
}

/// STRINGBINDING: a protocol tower id and a network address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringBinding {
    pub tower_id: u16,
    pub network_addr: String,
}

impl StringBinding {
    pub fn new(tower_id: u16, network_addr: impl Into<String>) -> Self {
        Self {
            tower_id,
            network_addr: network_addr.into(),
        }
    }

    /// `host[port]` over TCP
    pub fn tcp(host: &str, port: u16) -> Self {
        Self::new(tower_id::NCACN_IP_TCP, format!("{host}[{port}]"))
    }
}

/// SECURITYBINDING: an authentication service and principal name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecurityBinding {
    pub authn_svc: u16,
    pub authz_svc: u16,
    pub principal_name: String,
}

impl SecurityBinding {
    pub fn new(authn_svc: u16, principal_name: impl Into<String>) -> Self {
        Self {
            authn_svc,
            authz_svc: AUTHZ_NONE,
            principal_name: principal_name.into(),
        }
    }
}

/// DUALSTRINGARRAY (MS-DCOM 2.2.19.1)
///
/// Both sections are NUL-separated UTF-16 streams ending in an extra NUL;
/// an empty section is written as two NULs. `wSecurityOffset` is the index
/// of the first security entry.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct DualStringArray {
    pub string_bindings: Vec<StringBinding>,
    pub security_bindings: Vec<SecurityBinding>,
}

fn wire_u16(len: usize) -> NdrResult<u16> {
    u16::try_from(len).map_err(|_| NdrError::IntegerOverflow)
}

fn push_text(entries: &mut Vec<u16>, text: &str) -> NdrResult<()> {
    for unit in text.encode_utf16() {
        if unit == 0 {
            return Err(NdrError::MalformedLength("binding text contains a NUL"));
        }
        entries.push(unit);
    }
    entries.push(0);
    Ok(())
}

fn close_section(entries: &mut Vec<u16>, empty: bool) {
    if empty {
        entries.push(0);
    }
    entries.push(0);
}

fn take_text(units: &[u16]) -> NdrResult<(String, &[u16])> {
    let end = units
        .iter()
        .position(|&u| u == 0)
        .ok_or(NdrError::MalformedLength("binding text is not terminated"))?;
    let text = String::from_utf16(&units[..end]).map_err(|_| NdrError::Utf16)?;
    Ok((text, &units[end + 1..]))
}

impl DualStringArray {
    pub fn new(string_bindings: Vec<StringBinding>, security_bindings: Vec<SecurityBinding>) -> Self {
        Self {
            string_bindings,
            security_bindings,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.string_bindings.is_empty() && self.security_bindings.is_empty()
    }

    /// The `aStringArray` entries and `wSecurityOffset`
    fn to_entries(&self) -> NdrResult<(Vec<u16>, u16)> {
        let mut entries = Vec::new();
        for binding in &self.string_bindings {
            if binding.tower_id == 0 {
                return Err(NdrError::InvalidEnumValue {
                    type_name: "tower id",
                    value: 0,
                });
            }
            entries.push(binding.tower_id);
            push_text(&mut entries, &binding.network_addr)?;
        }
        close_section(&mut entries, self.string_bindings.is_empty());
        let security_offset = wire_u16(entries.len())?;

        for binding in &self.security_bindings {
            if binding.authn_svc == 0 {
                return Err(NdrError::InvalidEnumValue {
                    type_name: "authentication service",
                    value: 0,
                });
            }
            entries.push(binding.authn_svc);
            entries.push(binding.authz_svc);
            push_text(&mut entries, &binding.principal_name)?;
        }
        close_section(&mut entries, self.security_bindings.is_empty());
        wire_u16(entries.len())?;
        Ok((entries, security_offset))
    }

    fn from_entries(entries: &[u16], security_offset: usize) -> NdrResult<Self> {
        if security_offset > entries.len() {
            return Err(NdrError::MalformedLength("security offset past the string array"));
        }
        let (strings, security) = entries.split_at(security_offset);

        let mut string_bindings = Vec::new();
        let mut rest = strings;
        while let Some((&tower_id, tail)) = rest.split_first() {
            if tower_id == 0 {
                break;
            }
            let (network_addr, tail) = take_text(tail)?;
            string_bindings.push(StringBinding {
                tower_id,
                network_addr,
            });
            rest = tail;
        }

        let mut security_bindings = Vec::new();
        let mut rest = security;
        while let [authn_svc, authz_svc, tail @ ..] = rest {
            if *authn_svc == 0 {
                break;
            }
            let (principal_name, tail) = take_text(tail)?;
            security_bindings.push(SecurityBinding {
                authn_svc: *authn_svc,
                authz_svc: *authz_svc,
                principal_name,
            });
            rest = tail;
        }

        Ok(Self {
            string_bindings,
            security_bindings,
        })
    }

    fn decode_entries(r: &mut NdrReader, num_entries: usize) -> NdrResult<Self> {
        let security_offset = usize::from(r.read_u16()?);
        let entries = (0..num_entries)
            .map(|_| r.read_u16())
            .collect::<NdrResult<Vec<_>>>()?;
        Self::from_entries(&entries, security_offset)
    }

    /// Layout inside an OBJREF: no conformance count
    fn encode_packed(&self, w: &mut NdrWriter) -> NdrResult<()> {
        let (entries, security_offset) = self.to_entries()?;
        w.write_u16(wire_u16(entries.len())?);
        w.write_u16(security_offset);
        entries.into_iter().for_each(|e| w.write_u16(e));
        Ok(())
    }

    fn decode_packed(r: &mut NdrReader) -> NdrResult<Self> {
        let num_entries = usize::from(r.read_u16()?);
        Self::decode_entries(r, num_entries)
    }
}

/// As an RPC parameter the array is a conformant struct sized by
/// `wNumEntries`.
impl NdrEncode for DualStringArray {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> NdrResult<()> {
        let (entries, security_offset) = self.to_entries()?;
        w.write_count(entries.len())?;
        w.write_u16(wire_u16(entries.len())?);
        w.write_u16(security_offset);
        entries.into_iter().for_each(|e| w.write_u16(e));
        Ok(())
    }
}

impl NdrDecode for DualStringArray {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_decode(r: &mut NdrReader) -> NdrResult<Self> {
        let max_count = r.read_count()?;
        let num_entries = usize::from(r.read_u16()?);
        if num_entries != max_count {
            return Err(NdrError::MalformedLength("string array size disagrees with conformance"));
        }
        Self::decode_entries(r, num_entries)
    }
}

/// DATAELEMENT of an extended OBJREF
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataElement {
    pub id: NdrUuid,
    pub data: Vec<u8>,
}

fn put_packed_u32(w: &mut NdrWriter, value: u32) {
    w.write_bytes(&value.to_le_bytes());
}

fn get_packed_u32(r: &mut NdrReader) -> NdrResult<u32> {
    let b = r.read_bytes(4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

impl DataElement {
    fn encode_packed(&self, w: &mut NdrWriter) -> NdrResult<()> {
        let rounded = padded_extent_len(self.data.len())?;
        w.write_bytes(&self.id.to_bytes_le());
        put_packed_u32(w, wire_count(self.data.len())?);
        put_packed_u32(w, wire_count(rounded)?);
        w.write_bytes(&self.data);
        w.write_bytes(&vec![0u8; rounded - self.data.len()]);
        Ok(())
    }

    fn decode_packed(r: &mut NdrReader) -> NdrResult<Self> {
        let mut id = [0u8; 16];
        id.copy_from_slice(&r.read_bytes(16)?);
        let size = get_packed_u32(r)? as usize;
        let rounded = get_packed_u32(r)? as usize;
        if padded_extent_len(size)? != rounded {
            return Err(NdrError::MalformedLength("data element size disagrees with its rounded size"));
        }
        let mut data = r.read_bytes(rounded)?.to_vec();
        data.truncate(size);
        Ok(Self {
            id: NdrUuid::from_bytes_le(id),
            data,
        })
    }
}

/// OBJREF (MS-DCOM 2.2.18.1)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjRef {
    Standard {
        iid: NdrUuid,
        std: StdObjRef,
        resolver: DualStringArray,
    },
    Handler {
        iid: NdrUuid,
        std: StdObjRef,
        clsid: NdrUuid,
        resolver: DualStringArray,
    },
    /// Marshaled by the object's own marshaler; `data` is opaque
    Custom {
        iid: NdrUuid,
        clsid: NdrUuid,
        data: Vec<u8>,
    },
    Extended {
        iid: NdrUuid,
        std: StdObjRef,
        resolver: DualStringArray,
        elements: Vec<DataElement>,
    },
}

impl ObjRef {
    pub fn standard(iid: NdrUuid, std: StdObjRef, resolver: DualStringArray) -> Self {
        Self::Standard { iid, std, resolver }
    }

    pub fn iid(&self) -> NdrUuid {
        match self {
            Self::Standard { iid, .. }
            | Self::Handler { iid, .. }
            | Self::Custom { iid, .. }
            | Self::Extended { iid, .. } => *iid,
        }
    }

    /// The standard reference, absent for custom marshaling
    pub fn std(&self) -> Option<&StdObjRef> {
        match self {
            Self::Standard { std, .. } | Self::Handler { std, .. } | Self::Extended { std, .. } => {
                Some(std)
            }
            Self::Custom { .. } => None,
        }
    }

    pub fn ipid(&self) -> Option<Ipid> {
        self.std().map(|std| std.ipid)
    }

    pub fn flags(&self) -> u32 {
        match self {
            Self::Standard { .. } => objref_flags::STANDARD,
            Self::Handler { .. } => objref_flags::HANDLER,
            Self::Custom { .. } => objref_flags::CUSTOM,
            Self::Extended { .. } => objref_flags::EXTENDED,
        }
    }

    pub fn to_bytes(&self) -> NdrResult<Bytes> {
        let mut w = NdrWriter::new(NdrContext::new());
        w.write_u32(OBJREF_SIGNATURE);
        w.write_u32(self.flags());
        self.iid().ndr_encode(&mut w)?;
        match self {
            Self::Standard { std, resolver, .. } => {
                std.ndr_encode(&mut w)?;
                resolver.encode_packed(&mut w)?;
            }
            Self::Handler {
                std,
                clsid,
                resolver,
                ..
            } => {
                std.ndr_encode(&mut w)?;
                clsid.ndr_encode(&mut w)?;
                resolver.encode_packed(&mut w)?;
            }
            Self::Custom { clsid, data, .. } => {
                clsid.ndr_encode(&mut w)?;
                // cbExtension
                w.write_u32(0);
                w.write_count(data.len())?;
                w.write_bytes(data);
            }
            Self::Extended {
                std,
                resolver,
                elements,
                ..
            } => {
                std.ndr_encode(&mut w)?;
                put_packed_u32(&mut w, EXTENDED_SIGNATURE);
                resolver.encode_packed(&mut w)?;
                put_packed_u32(&mut w, wire_count(elements.len())?);
                put_packed_u32(&mut w, EXTENDED_SIGNATURE);
                for element in elements {
                    element.encode_packed(&mut w)?;
                }
            }
        }
        w.into_bytes()
    }

    /// Parse an OBJREF. Bytes after the variant body are ignored.
    pub fn from_bytes(buf: impl Into<Bytes>) -> NdrResult<Self> {
        let mut r = NdrReader::new(buf, NdrContext::new());
        let signature = r.read_u32()?;
        if signature != OBJREF_SIGNATURE {
            return Err(NdrError::InvalidEnumValue {
                type_name: "OBJREF signature",
                value: signature,
            });
        }
        let flags = r.read_u32()?;
        let iid = NdrUuid::ndr_decode(&mut r)?;
        let objref = match flags {
            objref_flags::STANDARD => Self::Standard {
                iid,
                std: StdObjRef::ndr_decode(&mut r)?,
                resolver: DualStringArray::decode_packed(&mut r)?,
            },
            objref_flags::HANDLER => Self::Handler {
                iid,
                std: StdObjRef::ndr_decode(&mut r)?,
                clsid: NdrUuid::ndr_decode(&mut r)?,
                resolver: DualStringArray::decode_packed(&mut r)?,
            },
            objref_flags::CUSTOM => {
                let clsid = NdrUuid::ndr_decode(&mut r)?;
                let _extension = r.read_u32()?;
                let size = r.read_count()?;
                Self::Custom {
                    iid,
                    clsid,
                    data: r.read_bytes(size)?.to_vec(),
                }
            }
            objref_flags::EXTENDED => {
                let std = StdObjRef::ndr_decode(&mut r)?;
                check_extended_signature(get_packed_u32(&mut r)?)?;
                let resolver = DualStringArray::decode_packed(&mut r)?;
                let count = get_packed_u32(&mut r)? as usize;
                let limit = r.context().max_elements;
                if count > limit {
                    return Err(NdrError::AllocationLimitExceeded {
                        requested: count,
                        limit,
                    });
                }
                check_extended_signature(get_packed_u32(&mut r)?)?;
                let elements = (0..count)
                    .map(|_| DataElement::decode_packed(&mut r))
                    .collect::<NdrResult<Vec<_>>>()?;
                Self::Extended {
                    iid,
                    std,
                    resolver,
                    elements,
                }
            }
            other => {
                return Err(NdrError::InvalidEnumValue {
                    type_name: "OBJREF flags",
                    value: other,
                })
            }
        };
        Ok(objref)
    }
}

fn check_extended_signature(value: u32) -> NdrResult<()> {
    if value != EXTENDED_SIGNATURE {
        return Err(NdrError::InvalidEnumValue {
            type_name: "extended OBJREF signature",
            value,
        });
    }
    Ok(())
}

/// MInterfacePointer (MS-DCOM 2.2.14): `{ ulCntData; [size_is] abData[] }`
///
/// The counts follow the payload's byte order; the OBJREF inside does not.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct MInterfacePointer {
    data: Bytes,
}

impl MInterfacePointer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn from_objref(objref: &ObjRef) -> NdrResult<Self> {
        objref.to_bytes().map(Self::new)
    }

    pub fn objref(&self) -> NdrResult<ObjRef> {
        ObjRef::from_bytes(self.data.clone())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl NdrEncode for MInterfacePointer {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> NdrResult<()> {
        w.write_count(self.data.len())?;
        w.write_count(self.data.len())?;
        w.write_bytes(&self.data);
        Ok(())
    }
}

impl NdrDecode for MInterfacePointer {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_decode(r: &mut NdrReader) -> NdrResult<Self> {
        let max_count = r.read_count()?;
        let size = r.read_u32()? as usize;
        if size != max_count {
            return Err(NdrError::MalformedLength("interface pointer size disagrees with conformance"));
        }
        Ok(Self {
            data: r.read_bytes(max_count)?,
        })
    }
}
