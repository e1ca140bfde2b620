//! NDR payload writer

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::deferred::{DeferredQueue, Pending, PointerKind};
use crate::{NdrContext, NdrEncode, NdrError, Result};

/// First referent id handed out in a payload, as MIDL-generated stubs do.
pub const FIRST_REFERENT_ID: u32 = 0x0002_0000;

/// Builds one NDR payload.
///
/// Positions, and therefore alignment, are measured from the first byte
/// written. The referent tables live exactly as long as the writer, so one
/// writer must never be shared between calls.
#[derive(Debug)]
pub struct NdrWriter {
    ctx: NdrContext,
    buf: BytesMut,
    deferred: DeferredQueue,
    /// `None` once the id space is used up
    next_referent: Option<u32>,
    full_ids: HashMap<usize, u32>,
}

impl NdrWriter {
    pub fn new(ctx: NdrContext) -> Self {
        Self {
            ctx,
            buf: BytesMut::new(),
            deferred: DeferredQueue::default(),
            next_referent: Some(FIRST_REFERENT_ID),
            full_ids: HashMap::new(),
        }
    }

    pub fn context(&self) -> &NdrContext {
        &self.ctx
    }

    /// Current offset from the payload start
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Encode one complete value: its fixed part, then every deferred body.
    ///
    /// Used for each top-level parameter and, recursively, for each pointer
    /// body.
    pub fn write<T: NdrEncode>(&mut self, value: &T) -> Result<()> {
        self.deferred.enter();
        value.ndr_encode(self)?;
        self.deferred.begin_deferred()?;
        value.ndr_encode_deferred(self)?;
        self.deferred.leave()
    }

    /// Finish the payload.
    pub fn into_bytes(self) -> Result<Bytes> {
        if self.deferred.depth() != 0 {
            return Err(NdrError::InvalidState("payload finished inside a level"));
        }
        trace!(len = self.buf.len(), "ndr payload encoded");
        Ok(self.buf.freeze())
    }

    /// Pad with zero bytes up to `alignment`
    pub fn align(&mut self, alignment: usize) {
        let padding = NdrContext::align_padding(self.buf.len(), alignment);
        self.buf.put_bytes(0, padding);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.align(2);
        self.ctx.put_u16(&mut self.buf, value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.align(4);
        self.ctx.put_u32(&mut self.buf, value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.align(8);
        self.ctx.put_u64(&mut self.buf, value);
    }

    /// Raw bytes, no alignment
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Count field for a conformant or varying construct
    pub fn write_count(&mut self, count: usize) -> Result<()> {
        self.write_u32(wire_count(count)?);
        Ok(())
    }

    /// Id 0 is the null marker, so the counter never wraps.
    pub(crate) fn next_referent_id(&mut self) -> Result<u32> {
        let id = self.next_referent.ok_or(NdrError::IntegerOverflow)?;
        self.next_referent = id.checked_add(4);
        Ok(id)
    }

    /// Referent id for a full pointer target; `true` if this is the first
    /// time the target is seen in this payload.
    pub(crate) fn full_referent(&mut self, identity: usize) -> Result<(u32, bool)> {
        if let Some(&id) = self.full_ids.get(&identity) {
            return Ok((id, false));
        }
        let id = self.next_referent_id()?;
        self.full_ids.insert(identity, id);
        Ok((id, true))
    }

    pub(crate) fn known_full_referent(&self, identity: usize) -> Option<u32> {
        self.full_ids.get(&identity).copied()
    }

    pub(crate) fn defer(&mut self, id: u32, kind: PointerKind) -> Result<()> {
        self.deferred.enqueue(Pending { id, kind })
    }

    pub(crate) fn take_deferred(&mut self, kind: PointerKind) -> Result<u32> {
        self.deferred.take(kind, None).map(|p| p.id)
    }

    pub(crate) fn take_deferred_if(&mut self, id: u32, kind: PointerKind) -> Result<bool> {
        self.deferred.take_if(Pending { id, kind })
    }
}

impl Default for NdrWriter {
    fn default() -> Self {
        Self::new(NdrContext::default())
    }
}

/// Element count as carried on the wire
pub fn wire_count(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| NdrError::IntegerOverflow)
}

/// Encode a single value as a complete payload.
pub fn encode<T: NdrEncode>(value: &T, ctx: NdrContext) -> Result<Bytes> {
    let mut w = NdrWriter::new(ctx);
    w.write(value)?;
    w.into_bytes()
}
