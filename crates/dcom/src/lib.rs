//! DCOM object RPC on top of NDR
//!
//! This crate frames ORPC calls, routes them through a data-driven interface
//! table and addresses them to exported objects by IPID.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ObjectClient::invoke            ObjectServer::handle_call  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Operation framer    │  Dispatch table   │  Object table    │
//! │  - ORPCTHIS/THAT     │  - opnum routing  │  - IPID -> obj   │
//! │  - params, HRESULT   │  - base delegation│  - public refs   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 NDR codec (midl-ndr crate)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │        Call framing over a byte stream (transport)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`types`]: identifiers, ORPC headers, HRESULTs and errors
//! - [`operation`]: request/response encoding for one method
//! - [`dispatch`]: `(interface, opnum) -> handler` table
//! - [`exporter`]: IPID table and reference counts
//! - [`remunknown`]: IRemUnknown over the IPID table
//! - [`transport`]: call frames over tokio streams

pub mod dispatch;
pub mod exporter;
pub mod operation;
pub mod remunknown;
pub mod transport;
pub mod types;

mod client;
mod server;

pub use client::{ClientConfig, ObjectClient};
pub use dispatch::{
    CallContext, DispatchTable, DispatchTableBuilder, InterfaceBuilder, ObjectHandle, Reply,
};
pub use exporter::{IpidEntry, ObjectTable};
pub use operation::{
    decode_request, decode_response, encode_request, encode_response, NdrParams, Operation,
    OperationDescriptor, RequestFrame, ResponseFrame,
};
pub use remunknown::RemUnknown;
pub use server::{ObjectServer, ServerConfig};
pub use transport::{CallReply, CallRequest, CallTransport, StreamTransport};
pub use types::{
    classify, ComVersion, DcomError, DualStringArray, ErrorKind, Hresult, Ipid, MInterfacePointer,
    ObjRef, Oid, OrpcThat, OrpcThis, Outcome, Oxid, Result, StdObjRef,
};

/// DCOM version advertised by default
pub const DCOM_VERSION: ComVersion = ComVersion::DCOM_5_7;
