//! Core DCOM types (MS-DCOM 2.2)
//!
//! This module contains the data structures shared by the client and server:
//! - Identifiers: OXID, OID, IPID
//! - Marshaled interface pointers: OBJREF, STDOBJREF, DUALSTRINGARRAY
//! - ORPC headers: ORPCTHIS, ORPCTHAT and their extensions
//! - HRESULT values and their classification

mod error;
mod hresult;
mod identifiers;
mod objref;
mod orpc;

pub use error::*;
pub use hresult::{classify, ErrorKind, Hresult, Outcome};
pub use identifiers::{generate_uuid, Ipid, Oid, Oxid};
pub use objref::*;
pub use orpc::*;

/// Well-known interface UUIDs
pub mod iid {
    use midl_ndr::NdrUuid;

    const fn ole(data1: u32) -> NdrUuid {
        NdrUuid::new(data1, 0, 0, [0xC0, 0, 0, 0, 0, 0, 0, 0x46])
    }

    /// IUnknown
    pub const IUNKNOWN: NdrUuid = ole(0x0000_0000);
    /// IDispatch
    pub const IDISPATCH: NdrUuid = ole(0x0002_0400);
    /// IRemUnknown
    pub const IREMUNKNOWN: NdrUuid = ole(0x0000_0131);
}
