//! IRemUnknown (MS-DCOM 3.1.1.5.6)
//!
//! Remote IUnknown for an object exporter:
//! - RemQueryInterface: export more interfaces of an object already exported
//! - RemAddRef: add public references to IPIDs
//! - RemRelease: drop public references; an IPID goes away at zero

mod protocol;
mod server;

pub use protocol::*;
pub use server::*;
