//! NDR (Network Data Representation) runtime library
//!
//! This crate implements the NDR20 transfer syntax used by DCE RPC and DCOM
//! stubs: primitives, UTF-16 text, conformant arrays and the three pointer
//! kinds, with the two-pass layout NDR requires.
//!
//! # NDR Wire Format
//!
//! - Primitives align to their natural size (1, 2, 4, or 8 bytes), measured
//!   from the start of the payload
//! - Conformance counts precede the elements they describe
//! - A constructed value writes all of its fixed fields first; the bodies of
//!   its embedded pointers follow in pointer order, depth first
//! - Full pointers to the same target share one referent id and one body
//!
//! # Example
//!
//! ```
//! use midl_ndr::{decode, encode, BString, Bstr, NdrContext, UniquePtr};
//!
//! let name: Bstr = UniquePtr::new(BString::new("orders"));
//! let bytes = encode(&name, NdrContext::new())?;
//! let back: Bstr = decode(bytes, NdrContext::new())?;
//! assert_eq!(back, name);
//! # Ok::<(), midl_ndr::NdrError>(())
//! ```

mod arrays;
mod context;
mod decode;
mod deferred;
mod encode;
mod error;
mod pointers;
mod primitives;
mod reader;
mod strings;
mod writer;

pub use arrays::{
    ConformantArray, ConformantVaryingArray, MultiDimArray, SafeArray, SafeArrayBound,
};
pub use context::NdrContext;
pub use decode::NdrDecode;
pub use deferred::PointerKind;
pub use encode::NdrEncode;
pub use error::{NdrError, Result, MAX_NDR_ARRAY_ELEMENTS};
pub use pointers::{FullPtr, NdrPtr, RefPtr, UniquePtr};
pub use primitives::{decode_scalar, encode_scalar, NdrUuid, Scalar, ScalarKind, VariantBool};
pub use reader::{decode, NdrReader};
pub use strings::{BString, Bstr, NdrWString};
pub use writer::{encode, wire_count, NdrWriter, FIRST_REFERENT_ID};

/// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};
