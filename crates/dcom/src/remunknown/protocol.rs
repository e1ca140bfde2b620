//! IRemUnknown wire types and operations
//!
//! ```text
//! RemQueryInterface  opnum 3  (ripid, cRefs, cIids, iids[cIids]) -> REMQIRESULT*[cIids]
//! RemAddRef          opnum 4  (cInterfaceRefs, REMINTERFACEREF[])  -> HRESULT[cInterfaceRefs]
//! RemRelease         opnum 5  (cInterfaceRefs, REMINTERFACEREF[])  -> ()
//! ```

use midl_ndr::{
    ConformantArray, NdrDecode, NdrEncode, NdrReader, NdrUuid, NdrWriter, Result as NdrResult,
    UniquePtr,
};

use crate::operation::{Operation, OperationDescriptor};
use crate::types::{Hresult, Ipid, StdObjRef};

/// Operation numbers for IRemUnknown
pub mod opnum {
    pub const QUERY_INTERFACE: u16 = 3;
    pub const ADD_REF: u16 = 4;
    pub const RELEASE: u16 = 5;
}

/// REMINTERFACEREF (MS-DCOM 2.2.22)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemInterfaceRef {
    pub ipid: Ipid,
    pub public_refs: u32,
    /// Not tracked by this exporter; accepted and ignored
    pub private_refs: u32,
}

impl RemInterfaceRef {
    pub fn new(ipid: Ipid, public_refs: u32) -> Self {
        Self {
            ipid,
            public_refs,
            private_refs: 0,
        }
    }
}

impl NdrEncode for RemInterfaceRef {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> NdrResult<()> {
        self.ipid.ndr_encode(w)?;
        w.write_u32(self.public_refs);
        w.write_u32(self.private_refs);
        Ok(())
    }
}

impl NdrDecode for RemInterfaceRef {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_decode(r: &mut NdrReader) -> NdrResult<Self> {
        Ok(Self {
            ipid: Ipid::ndr_decode(r)?,
            public_refs: r.read_u32()?,
            private_refs: r.read_u32()?,
        })
    }
}

/// REMQIRESULT (MS-DCOM 2.2.23)
///
/// `std` is all zeros when `hresult` is a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemQiResult {
    pub hresult: Hresult,
    pub std: StdObjRef,
}

impl RemQiResult {
    pub fn success(std: StdObjRef) -> Self {
        Self {
            hresult: Hresult::S_OK,
            std,
        }
    }

    pub fn failure(hresult: Hresult) -> Self {
        Self {
            hresult,
            std: StdObjRef::default(),
        }
    }
}

impl NdrEncode for RemQiResult {
    fn ndr_align() -> usize {
        8
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> NdrResult<()> {
        w.align(8);
        self.hresult.ndr_encode(w)?;
        self.std.ndr_encode(w)
    }
}

impl NdrDecode for RemQiResult {
    fn ndr_align() -> usize {
        8
    }

    fn ndr_decode(r: &mut NdrReader) -> NdrResult<Self> {
        r.align(8)?;
        Ok(Self {
            hresult: Hresult::ndr_decode(r)?,
            std: StdObjRef::ndr_decode(r)?,
        })
    }
}

pub struct RemQueryInterface;

impl Operation for RemQueryInterface {
    const DESCRIPTOR: OperationDescriptor =
        OperationDescriptor::new(opnum::QUERY_INTERFACE, "RemQueryInterface");
    type Request = (Ipid, u32, u16, ConformantArray<NdrUuid>);
    type Response = (UniquePtr<ConformantArray<RemQiResult>>,);
}

pub struct RemAddRef;

impl Operation for RemAddRef {
    const DESCRIPTOR: OperationDescriptor = OperationDescriptor::new(opnum::ADD_REF, "RemAddRef");
    type Request = (u16, ConformantArray<RemInterfaceRef>);
    type Response = (ConformantArray<Hresult>,);
}

pub struct RemRelease;

impl Operation for RemRelease {
    const DESCRIPTOR: OperationDescriptor = OperationDescriptor::new(opnum::RELEASE, "RemRelease");
    type Request = (u16, ConformantArray<RemInterfaceRef>);
    type Response = ();
}
