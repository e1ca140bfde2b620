//! IRemUnknown object
//!
//! One per server. Reference counts land on the shared IPID table, so a
//! RemRelease that drops an IPID to zero unexports it for every client.

use std::sync::Arc;

use midl_ndr::{ConformantArray, NdrUuid, UniquePtr};
use tracing::{debug, trace};

use super::protocol::{RemAddRef, RemInterfaceRef, RemQiResult, RemQueryInterface, RemRelease};
use crate::dispatch::{DispatchTable, InterfaceBuilder, Reply};
use crate::exporter::{IpidEntry, ObjectTable};
use crate::types::{iid, DcomError, Hresult, Ipid, Oxid, Result, StdObjRef};

/// Server side of IRemUnknown
pub struct RemUnknown {
    oxid: Oxid,
    table: Arc<DispatchTable>,
    objects: Arc<ObjectTable>,
}

impl RemUnknown {
    pub fn new(oxid: Oxid, table: Arc<DispatchTable>, objects: Arc<ObjectTable>) -> Self {
        Self {
            oxid,
            table,
            objects,
        }
    }

    /// IRemUnknown entry for a dispatch table; objects exported under it
    /// must be `RemUnknown`.
    pub fn interface() -> InterfaceBuilder {
        InterfaceBuilder::new(iid::IREMUNKNOWN, "IRemUnknown")
            .operation::<RemQueryInterface, RemUnknown, _>(|rem, req| {
                let (ipid, refs, count, iids) = req.params;
                if usize::from(count) != iids.len() || refs == 0 {
                    return Reply::with_result((UniquePtr::null(),), Hresult::E_INVALIDARG);
                }
                match rem.query_interface(&ipid, refs, &iids.0) {
                    Ok(results) => {
                        let result = if results.iter().any(|r| r.hresult == Hresult::S_OK) {
                            Hresult::S_OK
                        } else {
                            Hresult::E_NOINTERFACE
                        };
                        Reply::with_result((UniquePtr::new(ConformantArray::new(results)),), result)
                    }
                    Err(err) => {
                        debug!(%ipid, error = %err, "query interface on unknown object");
                        Reply::with_result((UniquePtr::null(),), Hresult::E_INVALIDARG)
                    }
                }
            })
            .operation::<RemAddRef, RemUnknown, _>(|rem, req| {
                let (count, refs) = req.params;
                if usize::from(count) != refs.len() {
                    return Reply::with_result((ConformantArray::new(Vec::new()),), Hresult::E_INVALIDARG);
                }
                let results = rem.add_refs(&refs.0);
                let result = results
                    .iter()
                    .copied()
                    .find(|hr| *hr != Hresult::S_OK)
                    .unwrap_or(Hresult::S_OK);
                Reply::with_result((ConformantArray::new(results),), result)
            })
            .operation::<RemRelease, RemUnknown, _>(|rem, req| {
                let (count, refs) = req.params;
                if usize::from(count) != refs.len() {
                    return Reply::with_result((), Hresult::E_INVALIDARG);
                }
                Reply::with_result((), rem.release_refs(&refs.0))
            })
    }

    pub fn oxid(&self) -> Oxid {
        self.oxid
    }

    /// Export each of `iids` on the object behind `ipid`, holding `refs`
    /// public references apiece. An interface already exported for the
    /// object reuses its IPID.
    pub fn query_interface(&self, ipid: &Ipid, refs: u32, iids: &[NdrUuid]) -> Result<Vec<RemQiResult>> {
        let source = self.objects.resolve(ipid)?;
        let results = iids
            .iter()
            .map(|iid| match self.export_interface(&source, *iid, refs) {
                Ok(ipid) => RemQiResult::success(StdObjRef::new(self.oxid, source.oid, ipid, refs)),
                Err(err) => {
                    debug!(oid = %source.oid, %iid, error = %err, "query interface refused");
                    RemQiResult::failure(Hresult::E_NOINTERFACE)
                }
            })
            .collect();
        Ok(results)
    }

    fn export_interface(&self, source: &IpidEntry, iid: NdrUuid, refs: u32) -> Result<Ipid> {
        if iid == iid::IREMUNKNOWN || !self.table.contains(&iid) {
            return Err(DcomError::InterfaceNotFound(iid));
        }
        let existing = self
            .objects
            .ipids_for_oid(&source.oid)
            .into_iter()
            .filter_map(|ipid| self.objects.resolve(&ipid).ok())
            .find(|entry| entry.iid == iid);
        match existing {
            Some(entry) => {
                self.objects.add_refs(&entry.ipid, refs)?;
                Ok(entry.ipid)
            }
            None => self
                .objects
                .register(source.oid, iid, Arc::clone(&source.object), refs),
        }
    }

    /// Per-reference results; unknown IPIDs are `E_INVALIDARG`
    pub fn add_refs(&self, refs: &[RemInterfaceRef]) -> Vec<Hresult> {
        refs.iter()
            .map(|r| match self.objects.add_refs(&r.ipid, r.public_refs) {
                Ok(count) => {
                    trace!(ipid = %r.ipid, count, "remote add ref");
                    Hresult::S_OK
                }
                Err(err) => {
                    debug!(ipid = %r.ipid, error = %err, "remote add ref failed");
                    Hresult::E_INVALIDARG
                }
            })
            .collect()
    }

    /// Releases every reference it can; `E_INVALIDARG` if any IPID was
    /// unknown.
    pub fn release_refs(&self, refs: &[RemInterfaceRef]) -> Hresult {
        let mut result = Hresult::S_OK;
        for r in refs {
            match self.objects.release_refs(&r.ipid, r.public_refs) {
                Ok(count) => trace!(ipid = %r.ipid, count, "remote release"),
                Err(err) => {
                    debug!(ipid = %r.ipid, error = %err, "remote release failed");
                    result = Hresult::E_INVALIDARG;
                }
            }
        }
        result
    }
}

impl std::fmt::Debug for RemUnknown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemUnknown").field("oxid", &self.oxid).finish()
    }
}
