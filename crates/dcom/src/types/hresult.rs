//! HRESULT values and call outcome classification
//!
//! ```text
//!  3 3 2 2 2 2 2 2 2 2 2 2 1 1 1 1 1 1 1 1 1 1
//!  1 0 9 8 7 6 5 4 3 2 1 0 9 8 7 6 5 4 3 2 1 0 9 8 7 6 5 4 3 2 1 0
//! +-+-+-+-+-+---------------------+-------------------------------+
//! |S|R|C|N|X|    Facility         |              Code             |
//! +-+-+-+-+-+---------------------+-------------------------------+
//! ```
//!
//! Only a handful of well-known codes are given a category. Everything else
//! is reported verbatim.

use std::fmt;

use midl_ndr::{NdrDecode, NdrEncode, NdrReader, NdrWriter};

/// Signed 32-bit COM result code
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hresult(pub i32);

// Codes are written in their customary unsigned hex form.
const fn code(raw: u32) -> Hresult {
    Hresult(raw as i32)
}

impl Hresult {
    pub const S_OK: Self = code(0x0000_0000);
    pub const S_FALSE: Self = code(0x0000_0001);
    pub const E_NOTIMPL: Self = code(0x8000_4001);
    pub const E_NOINTERFACE: Self = code(0x8000_4002);
    pub const E_POINTER: Self = code(0x8000_4003);
    pub const E_FAIL: Self = code(0x8000_4005);
    pub const E_ACCESSDENIED: Self = code(0x8007_0005);
    pub const E_OUTOFMEMORY: Self = code(0x8007_000E);
    pub const E_INVALIDARG: Self = code(0x8007_0057);
    pub const CO_E_OBJNOTCONNECTED: Self = code(0x8004_01FD);
    pub const RPC_E_SERVER_DIED: Self = code(0x8001_0007);
    pub const RPC_E_DISCONNECTED: Self = code(0x8001_0108);
    pub const RPC_E_INVALID_OBJECT: Self = code(0x8001_0114);
    pub const RPC_S_PROCNUM_OUT_OF_RANGE: Self = code(0x8007_06D1);
    pub const RPC_X_BAD_STUB_DATA: Self = code(0x8007_06F7);

    /// Severity bit set
    pub fn is_failure(self) -> bool {
        self.0 < 0
    }

    pub fn facility(self) -> u16 {
        ((self.0 as u32 >> 16) & 0x1FFF) as u16
    }

    pub fn code(self) -> u16 {
        (self.0 as u32 & 0xFFFF) as u16
    }

    pub fn outcome(self) -> Outcome {
        classify(self.0)
    }
}

impl fmt::Debug for Hresult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HRESULT(0x{:08X})", self.0 as u32)
    }
}

impl fmt::Display for Hresult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0 as u32)
    }
}

impl From<i32> for Hresult {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl NdrEncode for Hresult {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        self.0.ndr_encode(w)
    }
}

impl NdrDecode for Hresult {
    fn ndr_align() -> usize {
        4
    }

    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        i32::ndr_decode(r).map(Self)
    }
}

/// Category of a nonzero result code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AccessDenied,
    NotImplemented,
    InvalidParameter,
    ObjectNoLongerExists,
    NoInterface,
    OutOfMemory,
    BadStubData,
    /// Nonzero code with the severity bit clear, such as `S_FALSE`
    Informational(i32),
    Other(i32),
}

/// Structured result of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Failure(ErrorKind),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Map a result code to an outcome. Only `0` is success.
pub fn classify(result_code: i32) -> Outcome {
    let hr = Hresult(result_code);
    if hr == Hresult::S_OK {
        return Outcome::Success;
    }
    if !hr.is_failure() {
        return Outcome::Failure(ErrorKind::Informational(result_code));
    }
    let kind = match hr {
        Hresult::E_ACCESSDENIED => ErrorKind::AccessDenied,
        Hresult::E_NOTIMPL | Hresult::RPC_S_PROCNUM_OUT_OF_RANGE => ErrorKind::NotImplemented,
        Hresult::E_INVALIDARG => ErrorKind::InvalidParameter,
        Hresult::CO_E_OBJNOTCONNECTED | Hresult::RPC_E_DISCONNECTED | Hresult::RPC_E_INVALID_OBJECT => {
            ErrorKind::ObjectNoLongerExists
        }
        Hresult::E_NOINTERFACE => ErrorKind::NoInterface,
        Hresult::E_OUTOFMEMORY => ErrorKind::OutOfMemory,
        Hresult::RPC_X_BAD_STUB_DATA => ErrorKind::BadStubData,
        _ => ErrorKind::Other(result_code),
    };
    Outcome::Failure(kind)
}
