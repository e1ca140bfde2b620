//! NDR payload reader

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};

use bytes::{Buf, Bytes};

use crate::deferred::{DeferredQueue, Pending, PointerKind};
use crate::{NdrContext, NdrDecode, NdrError, Result};

/// Shared slot behind a decoded full pointer.
pub(crate) type FullCell<T> = Arc<OnceLock<T>>;

/// Consumes one NDR payload.
///
/// Mirrors [`NdrWriter`](crate::NdrWriter): alignment is measured from the
/// first byte of the input, and every read checks the remaining length so a
/// short buffer surfaces as [`NdrError::TruncatedInput`].
pub struct NdrReader {
    ctx: NdrContext,
    buf: Bytes,
    len: usize,
    deferred: DeferredQueue,
    full_cells: HashMap<u32, Box<dyn Any + Send + Sync>>,
    unfilled: BTreeSet<u32>,
}

impl NdrReader {
    pub fn new(buf: impl Into<Bytes>, ctx: NdrContext) -> Self {
        let buf = buf.into();
        Self {
            ctx,
            len: buf.len(),
            buf,
            deferred: DeferredQueue::default(),
            full_cells: HashMap::new(),
            unfilled: BTreeSet::new(),
        }
    }

    pub fn context(&self) -> &NdrContext {
        &self.ctx
    }

    /// Current offset from the payload start
    pub fn position(&self) -> usize {
        self.len - self.buf.remaining()
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Decode one complete value: its fixed part, then every deferred body.
    pub fn read<T: NdrDecode>(&mut self) -> Result<T> {
        self.deferred.enter();
        let mut value = T::ndr_decode(self)?;
        self.deferred.begin_deferred()?;
        value.ndr_decode_deferred(self)?;
        self.deferred.leave()?;
        Ok(value)
    }

    /// Check that every full pointer introduced in the payload received its
    /// body. Returns the unread tail length.
    pub fn finish(self) -> Result<usize> {
        if let Some(&id) = self.unfilled.iter().next() {
            return Err(NdrError::DanglingReferent(id));
        }
        Ok(self.buf.remaining())
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        let have = self.buf.remaining();
        if have < needed {
            return Err(NdrError::TruncatedInput { needed, have });
        }
        Ok(())
    }

    /// Skip padding up to `alignment`. The padding must be present.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = NdrContext::align_padding(self.position(), alignment);
        self.ensure(padding)?;
        self.buf.advance(padding);
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.align(2)?;
        self.ensure(2)?;
        Ok(self.ctx.get_u16(&mut self.buf))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.align(4)?;
        self.ensure(4)?;
        Ok(self.ctx.get_u32(&mut self.buf))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.align(8)?;
        self.ensure(8)?;
        Ok(self.ctx.get_u64(&mut self.buf))
    }

    /// Raw bytes, no alignment
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }

    /// Count field for a conformant or varying construct, checked against
    /// the context's element limit.
    pub fn read_count(&mut self) -> Result<usize> {
        let count = self.read_u32()? as usize;
        self.check_elements(count)?;
        Ok(count)
    }

    pub(crate) fn check_elements(&self, requested: usize) -> Result<()> {
        let limit = self.ctx.max_elements;
        if requested > limit {
            return Err(NdrError::AllocationLimitExceeded { requested, limit });
        }
        Ok(())
    }

    pub(crate) fn defer(&mut self, id: u32, kind: PointerKind) -> Result<()> {
        self.deferred.enqueue(Pending { id, kind })
    }

    pub(crate) fn take_deferred(&mut self, id: u32, kind: PointerKind) -> Result<()> {
        self.deferred.take(kind, Some(id)).map(|_| ())
    }

    /// Look up the shared slot of a full pointer id that was already
    /// introduced in this payload.
    pub(crate) fn full_cell<T>(&self, id: u32) -> Result<Option<FullCell<T>>>
    where
        T: Send + Sync + 'static,
    {
        match self.full_cells.get(&id) {
            None => Ok(None),
            Some(any) => any
                .downcast_ref::<FullCell<T>>()
                .cloned()
                .map(Some)
                .ok_or(NdrError::ReferentTypeMismatch(id)),
        }
    }

    pub(crate) fn introduce_full<T>(&mut self, id: u32, cell: FullCell<T>)
    where
        T: Send + Sync + 'static,
    {
        self.full_cells.insert(id, Box::new(cell));
        self.unfilled.insert(id);
    }

    pub(crate) fn mark_filled(&mut self, id: u32) {
        self.unfilled.remove(&id);
    }
}

impl std::fmt::Debug for NdrReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdrReader")
            .field("ctx", &self.ctx)
            .field("position", &self.position())
            .field("remaining", &self.remaining())
            .field("full_referents", &self.full_cells.len())
            .finish()
    }
}

/// Decode a single value from a complete payload.
///
/// Trailing bytes after the value are ignored.
pub fn decode<T: NdrDecode>(buf: impl Into<Bytes>, ctx: NdrContext) -> Result<T> {
    let mut r = NdrReader::new(buf, ctx);
    let value = r.read()?;
    r.finish()?;
    Ok(value)
}
