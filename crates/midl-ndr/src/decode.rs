//! NDR decoding trait

use crate::{NdrReader, Result};

/// Trait for types that can be decoded from NDR format
///
/// Mirrors [`NdrEncode`](crate::NdrEncode): `ndr_decode` reads the inline
/// representation and leaves embedded pointers pending, `ndr_decode_deferred`
/// fills them in from the deferred bodies.
pub trait NdrDecode: Sized {
    /// Get the NDR alignment requirement for this type
    fn ndr_align() -> usize;

    /// Read the inline representation.
    fn ndr_decode(r: &mut NdrReader) -> Result<Self>;

    /// Resolve the pointers left pending by `ndr_decode`.
    fn ndr_decode_deferred(&mut self, _r: &mut NdrReader) -> Result<()> {
        Ok(())
    }
}

impl<T: NdrDecode> NdrDecode for Box<T> {
    fn ndr_align() -> usize {
        T::ndr_align()
    }

    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        T::ndr_decode(r).map(Box::new)
    }

    fn ndr_decode_deferred(&mut self, r: &mut NdrReader) -> Result<()> {
        (**self).ndr_decode_deferred(r)
    }
}
