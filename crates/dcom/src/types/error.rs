//! DCOM error types

use midl_ndr::{NdrError, NdrUuid};
use thiserror::Error;

use super::hresult::Hresult;
use super::identifiers::Ipid;

/// DCOM-specific errors
#[derive(Debug, Error)]
pub enum DcomError {
    /// Structural encode/decode failure
    #[error("NDR error: {0}")]
    Ndr(#[from] NdrError),

    /// No handler at this opnum on the interface or any of its bases
    #[error("operation {opnum} not supported by interface {iid}")]
    UnsupportedOperation { iid: NdrUuid, opnum: u16 },

    /// Unknown or released IPID
    #[error("object not found: {0}")]
    ObjectNotFound(Ipid),

    /// Interface not present in the dispatch table
    #[error("interface not found: {0}")]
    InterfaceNotFound(NdrUuid),

    /// The object behind an IPID is not the type the handler expects
    #[error("object does not implement {0}")]
    ObjectTypeMismatch(&'static str),

    /// Dispatch table rejected at build time
    #[error("invalid dispatch table: {0}")]
    InvalidTable(String),

    /// IPID already registered
    #[error("duplicate IPID: {0}")]
    DuplicateIpid(Ipid),

    /// The server answered with a fault instead of a response
    #[error("call faulted: {0}")]
    Fault(Hresult),

    /// Client invoked without binding an IPID
    #[error("no IPID bound")]
    MissingIpid,

    /// Custom-marshaled OBJREF: there is no IPID to call
    #[error("OBJREF with flags {0:#x} carries no standard reference")]
    NoStandardReference(u32),

    /// Peer announced a frame larger than allowed
    #[error("frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    /// Peer closed the stream
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for DCOM operations
pub type Result<T> = std::result::Result<T, DcomError>;
