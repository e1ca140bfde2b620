//! NDR error types

use thiserror::Error;

/// Default upper bound on the element count of any decoded conformant array
/// or string.
pub const MAX_NDR_ARRAY_ELEMENTS: usize = 1 << 20;

/// NDR encoding/decoding errors
///
/// Every variant is a local structural violation of the wire format. A decode
/// that fails leaves the reader's cursor undefined, so callers abandon the
/// whole payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NdrError {
    /// Fewer bytes remain than the next field requires
    #[error("truncated input: needed {needed} bytes, have {have}")]
    TruncatedInput { needed: usize, have: usize },

    /// Length headers disagree with each other or with the element size
    #[error("malformed length: {0}")]
    MalformedLength(&'static str),

    /// A referent id does not match the pointer being resolved, or a full
    /// pointer body was never materialised
    #[error("dangling referent 0x{0:08x}")]
    DanglingReferent(u32),

    /// A ref pointer slot has no deferred body
    #[error("ref pointer slot has no deferred body")]
    UnexpectedNullRef,

    /// A ref pointer was asked to encode an absent value
    #[error("ref pointer requires a value")]
    RefPointerRequired,

    /// Discriminant outside the enumeration's declared values
    #[error("invalid {type_name} value: {value}")]
    InvalidEnumValue { type_name: &'static str, value: u32 },

    /// Text is not valid UTF-16
    #[error("invalid UTF-16 text")]
    Utf16,

    /// A full pointer id was first decoded as a different Rust type
    #[error("referent 0x{0:08x} is shared between different types")]
    ReferentTypeMismatch(u32),

    /// The deferred queue was driven out of order
    #[error("deferred queue misuse: {0}")]
    InvalidState(&'static str),

    /// A decoded count exceeds the configured limit
    #[error("allocation limit exceeded: requested {requested}, limit {limit}")]
    AllocationLimitExceeded { requested: usize, limit: usize },

    /// Wire sizes overflowed `usize`/`u32`
    #[error("integer overflow computing wire size")]
    IntegerOverflow,
}

/// Result type for NDR operations
pub type Result<T> = std::result::Result<T, NdrError>;
