//! NDR encoding trait

use crate::{NdrWriter, Result};

/// Trait for types that can be encoded to NDR format
///
/// Encoding runs in two passes over the same value. [`ndr_encode`] writes the
/// inline (fixed) representation and enqueues a deferred entry for every
/// embedded pointer; [`ndr_encode_deferred`] then visits the same pointers in
/// the same order and writes their bodies. [`NdrWriter::write`] drives both
/// passes.
///
/// [`ndr_encode`]: NdrEncode::ndr_encode
/// [`ndr_encode_deferred`]: NdrEncode::ndr_encode_deferred
pub trait NdrEncode {
    /// Get the NDR alignment requirement for this type
    fn ndr_align() -> usize
    where
        Self: Sized;

    /// Write the inline representation, aligned from the payload start.
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()>;

    /// Write the bodies of the pointers enqueued by `ndr_encode`.
    fn ndr_encode_deferred(&self, _w: &mut NdrWriter) -> Result<()> {
        Ok(())
    }
}

impl<T: NdrEncode> NdrEncode for Box<T> {
    fn ndr_align() -> usize {
        T::ndr_align()
    }

    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        (**self).ndr_encode(w)
    }

    fn ndr_encode_deferred(&self, w: &mut NdrWriter) -> Result<()> {
        (**self).ndr_encode_deferred(w)
    }
}
