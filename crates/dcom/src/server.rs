//! Object server
//!
//! Resolves the IPID of each incoming call, routes the opnum through the
//! dispatch table and runs the handler. Addressing and dispatch failures are
//! answered with a fault carrying a well-known HRESULT instead of tearing the
//! connection down.

use std::sync::Arc;

use bytes::Bytes;
use midl_ndr::{NdrContext, NdrUuid};
use tokio::net::TcpListener;
use tracing::{debug, error, trace, warn};

use crate::dispatch::{CallContext, DispatchTable, ObjectHandle};
use crate::exporter::ObjectTable;
use crate::remunknown::RemUnknown;
use crate::transport::{
    read_request, write_reply, CallReply, CallTransport, StreamTransport, DEFAULT_MAX_FRAME_SIZE,
};
use crate::types::{
    iid, DcomError, DualStringArray, Hresult, Ipid, ObjRef, Oid, Oxid, Result, StdObjRef,
};

/// Object server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub ndr: NdrContext,
    /// Fault for unknown or released IPIDs
    pub unknown_object_fault: Hresult,
    /// Fault for opnums no interface in the chain implements
    pub unsupported_operation_fault: Hresult,
    /// Fault for request payloads that fail to decode
    pub bad_stub_data_fault: Hresult,
    /// Largest accepted request payload
    pub max_frame_size: usize,
    /// Exporter id written into every OBJREF this server hands out
    pub oxid: Oxid,
    /// Bindings advertised to clients resolving the OXID
    pub resolver: DualStringArray,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ndr: NdrContext::new(),
            unknown_object_fault: Hresult::RPC_E_INVALID_OBJECT,
            unsupported_operation_fault: Hresult::RPC_S_PROCNUM_OUT_OF_RANGE,
            bad_stub_data_fault: Hresult::RPC_X_BAD_STUB_DATA,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            oxid: Oxid::generate(),
            resolver: DualStringArray::default(),
        }
    }
}

impl ServerConfig {
    pub fn with_ndr(mut self, ndr: NdrContext) -> Self {
        self.ndr = ndr;
        self
    }

    pub fn with_unsupported_operation_fault(mut self, hr: Hresult) -> Self {
        self.unsupported_operation_fault = hr;
        self
    }

    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    pub fn with_oxid(mut self, oxid: Oxid) -> Self {
        self.oxid = oxid;
        self
    }

    pub fn with_resolver(mut self, resolver: DualStringArray) -> Self {
        self.resolver = resolver;
        self
    }
}

/// Hosts exported objects behind a dispatch table
pub struct ObjectServer {
    table: Arc<DispatchTable>,
    objects: Arc<ObjectTable>,
    config: ServerConfig,
}

impl ObjectServer {
    pub fn new(table: DispatchTable) -> Self {
        Self::with_config(table, ServerConfig::default())
    }

    pub fn with_config(table: DispatchTable, config: ServerConfig) -> Self {
        Self {
            table: Arc::new(table),
            objects: Arc::new(ObjectTable::new()),
            config,
        }
    }

    pub fn table(&self) -> &Arc<DispatchTable> {
        &self.table
    }

    pub fn objects(&self) -> &Arc<ObjectTable> {
        &self.objects
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Export `object` through interface `iid`, holding one public reference
    pub fn export(&self, oid: Oid, iid: NdrUuid, object: ObjectHandle) -> Result<Ipid> {
        if !self.table.contains(&iid) {
            return Err(DcomError::InterfaceNotFound(iid));
        }
        self.objects.register(oid, iid, object, 1)
    }

    /// Export `object` and describe it as a standard OBJREF handing
    /// `refs` public references to the receiver
    pub fn marshal(&self, oid: Oid, iid: NdrUuid, object: ObjectHandle, refs: u32) -> Result<ObjRef> {
        if !self.table.contains(&iid) {
            return Err(DcomError::InterfaceNotFound(iid));
        }
        let ipid = self.objects.register(oid, iid, object, refs)?;
        debug!(%ipid, %oid, refs, "marshaled interface pointer");
        let std = StdObjRef::new(self.config.oxid, oid, ipid, refs);
        Ok(ObjRef::standard(iid, std, self.config.resolver.clone()))
    }

    /// Export this server's IRemUnknown. The table must carry
    /// [`RemUnknown::interface`].
    pub fn export_rem_unknown(&self) -> Result<Ipid> {
        let rem = RemUnknown::new(self.config.oxid, Arc::clone(&self.table), Arc::clone(&self.objects));
        self.export(Oid::generate(), iid::IREMUNKNOWN, Arc::new(rem))
    }

    /// Resolve, route and run one call
    pub fn dispatch(&self, ipid: Ipid, opnum: u16, payload: Bytes) -> Result<Bytes> {
        let entry = self.objects.resolve(&ipid)?;
        let matched = self.table.route(entry.iid, opnum)?;
        trace!(%ipid, opnum, op = matched.descriptor.name, "dispatching");
        let call = CallContext {
            ipid,
            iid: entry.iid,
            opnum,
            object: &entry.object,
            ndr: self.config.ndr,
        };
        matched.invoke(&call, payload)
    }

    /// Like [`dispatch`](Self::dispatch), with failures mapped to faults
    pub fn handle_call(&self, ipid: Ipid, opnum: u16, payload: Bytes) -> CallReply {
        match self.dispatch(ipid, opnum, payload) {
            Ok(response) => CallReply::Response(response),
            Err(err) => {
                let fault = self.fault_for(&err);
                warn!(%ipid, opnum, %fault, error = %err, "call faulted");
                CallReply::Fault(fault)
            }
        }
    }

    /// HRESULT reported to the caller for a dispatch failure
    pub fn fault_for(&self, err: &DcomError) -> Hresult {
        match err {
            DcomError::ObjectNotFound(_) => self.config.unknown_object_fault,
            DcomError::UnsupportedOperation { .. } => self.config.unsupported_operation_fault,
            DcomError::Ndr(_) => self.config.bad_stub_data_fault,
            DcomError::ObjectTypeMismatch(_) | DcomError::InterfaceNotFound(_) => Hresult::E_NOINTERFACE,
            DcomError::Fault(hr) => *hr,
            _ => Hresult::E_FAIL,
        }
    }

    /// Answer calls on one transport until the peer closes it
    pub async fn serve<T: CallTransport + ?Sized>(&self, transport: &mut T) -> Result<()> {
        debug!("serving transport");
        loop {
            let request = match read_request(transport, self.config.max_frame_size).await {
                Ok(request) => request,
                Err(DcomError::ConnectionClosed) => {
                    debug!("transport closed by peer");
                    return Ok(());
                }
                Err(err) => {
                    error!(error = %err, "failed to read call");
                    return Err(err);
                }
            };
            let reply = self.handle_call(request.ipid, request.opnum, request.payload);
            if let Err(err) = write_reply(transport, &reply, self.config.max_frame_size).await {
                error!(error = %err, "failed to write reply");
                return Err(err);
            }
        }
    }

    /// Accept TCP connections and serve each on its own task
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        debug!(addr = ?listener.local_addr().ok(), "object server listening");
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!(%peer, "accepted connection");
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                let mut transport = StreamTransport::new(stream);
                match server.serve(&mut transport).await {
                    Ok(()) => debug!(%peer, "connection closed"),
                    Err(err) => debug!(%peer, error = %err, "connection ended with error"),
                }
            });
        }
    }
}

impl std::fmt::Debug for ObjectServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectServer")
            .field("table", &self.table)
            .field("objects", &self.objects)
            .field("config", &self.config)
            .finish()
    }
}
