//! IPID table
//!
//! Tracks which object and interface each exported IPID names, together with
//! the public reference count held by remote clients. Lookups read an
//! immutable snapshot; registrations build the next snapshot off to the side
//! and swap it in, so a resolve never waits on a registration being prepared.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use midl_ndr::NdrUuid;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::dispatch::ObjectHandle;
use crate::types::{DcomError, Ipid, Oid, Result};

/// Entry in the IPID table
pub struct IpidEntry {
    pub ipid: Ipid,
    /// Object this interface belongs to
    pub oid: Oid,
    /// Interface IID
    pub iid: NdrUuid,
    pub object: ObjectHandle,
    public_refs: AtomicU32,
}

impl IpidEntry {
    /// Public references currently held by remote clients
    pub fn public_refs(&self) -> u32 {
        self.public_refs.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for IpidEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpidEntry")
            .field("ipid", &self.ipid)
            .field("oid", &self.oid)
            .field("iid", &self.iid)
            .field("public_refs", &self.public_refs())
            .finish()
    }
}

type Snapshot = Arc<HashMap<Ipid, Arc<IpidEntry>>>;

/// Thread-safe table of exported interface pointers
#[derive(Default)]
pub struct ObjectTable {
    current: RwLock<Snapshot>,
    // Serializes writers so no update is lost between clone and swap.
    update: Mutex<()>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Snapshot {
        self.current.read().clone()
    }

    /// Copy-on-write: every change that adds or removes an IPID clones the
    /// map, O(n) per registration, in exchange for lookups that only clone an
    /// `Arc`. Refcount changes that keep the entry go through the atomic
    /// counter instead.
    fn update<R>(&self, f: impl FnOnce(&mut HashMap<Ipid, Arc<IpidEntry>>) -> R) -> R {
        let _guard = self.update.lock();
        let mut next = HashMap::clone(&self.snapshot());
        let out = f(&mut next);
        *self.current.write() = Arc::new(next);
        out
    }

    /// Export `object` under a fresh random IPID
    pub fn register(&self, oid: Oid, iid: NdrUuid, object: ObjectHandle, refs: u32) -> Result<Ipid> {
        loop {
            match self.register_ipid(Ipid::generate(), oid, iid, object.clone(), refs) {
                Err(DcomError::DuplicateIpid(ipid)) => {
                    debug!(%ipid, "IPID collision, regenerating");
                }
                other => return other,
            }
        }
    }

    /// Export `object` under a caller-chosen IPID
    pub fn register_ipid(
        &self,
        ipid: Ipid,
        oid: Oid,
        iid: NdrUuid,
        object: ObjectHandle,
        refs: u32,
    ) -> Result<Ipid> {
        self.update(|entries| {
            if entries.contains_key(&ipid) {
                return Err(DcomError::DuplicateIpid(ipid));
            }
            entries.insert(
                ipid,
                Arc::new(IpidEntry {
                    ipid,
                    oid,
                    iid,
                    object,
                    public_refs: AtomicU32::new(refs),
                }),
            );
            Ok(())
        })?;
        debug!(%ipid, %oid, %iid, refs, "registered interface pointer");
        Ok(ipid)
    }

    /// Look up an IPID. Unknown and released IPIDs are `ObjectNotFound`.
    pub fn resolve(&self, ipid: &Ipid) -> Result<Arc<IpidEntry>> {
        self.current
            .read()
            .get(ipid)
            .cloned()
            .ok_or(DcomError::ObjectNotFound(*ipid))
    }

    /// Add public references, returning the new count
    pub fn add_refs(&self, ipid: &Ipid, count: u32) -> Result<u32> {
        let _guard = self.update.lock();
        let entry = self.resolve(ipid)?;
        let refs = entry.public_refs().saturating_add(count);
        entry.public_refs.store(refs, Ordering::Release);
        Ok(refs)
    }

    /// Release public references. The entry is removed when the count
    /// reaches zero; the remaining count is returned.
    pub fn release_refs(&self, ipid: &Ipid, count: u32) -> Result<u32> {
        let _guard = self.update.lock();
        let entry = self.resolve(ipid)?;
        let refs = entry.public_refs().saturating_sub(count);
        entry.public_refs.store(refs, Ordering::Release);
        if refs == 0 {
            let mut next = HashMap::clone(&self.snapshot());
            next.remove(ipid);
            *self.current.write() = Arc::new(next);
            debug!(%ipid, "released interface pointer");
        }
        Ok(refs)
    }

    /// Remove an IPID regardless of its reference count
    pub fn revoke(&self, ipid: &Ipid) -> Option<Arc<IpidEntry>> {
        let removed = self.update(|entries| entries.remove(ipid));
        if removed.is_some() {
            debug!(%ipid, "revoked interface pointer");
        }
        removed
    }

    /// All IPIDs exported for one object
    pub fn ipids_for_oid(&self, oid: &Oid) -> Vec<Ipid> {
        let mut ipids: Vec<Ipid> = self
            .snapshot()
            .values()
            .filter(|e| &e.oid == oid)
            .map(|e| e.ipid)
            .collect();
        ipids.sort();
        ipids
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ObjectTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectTable").field("len", &self.len()).finish()
    }
}
