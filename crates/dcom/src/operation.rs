//! Operation framing
//!
//! A request payload is an ORPCTHIS followed by the `[in]` parameters; a
//! response payload is an ORPCTHAT, the `[out]` parameters and the HRESULT
//! return value. Each parameter is a separate top-level NDR value: its
//! deferred pointer bodies are flushed before the next parameter begins.

use bytes::Bytes;
use midl_ndr::{NdrContext, NdrDecode, NdrEncode, NdrReader, NdrWriter};
use tracing::trace;

use crate::types::{Hresult, OrpcThat, OrpcThis, Outcome, Result};

/// Immutable identity of one remote method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationDescriptor {
    pub opnum: u16,
    pub name: &'static str,
}

impl OperationDescriptor {
    pub const fn new(opnum: u16, name: &'static str) -> Self {
        Self { opnum, name }
    }
}

/// Ordered list of top-level parameters
///
/// Implemented for `()` and for tuples of NDR types, one element per
/// parameter in declaration order.
pub trait NdrParams: Sized {
    fn encode_params(&self, w: &mut NdrWriter) -> midl_ndr::Result<()>;

    fn decode_params(r: &mut NdrReader) -> midl_ndr::Result<Self>;
}

impl NdrParams for () {
    fn encode_params(&self, _w: &mut NdrWriter) -> midl_ndr::Result<()> {
        Ok(())
    }

    fn decode_params(_r: &mut NdrReader) -> midl_ndr::Result<Self> {
        Ok(())
    }
}

macro_rules! impl_ndr_params {
    ($($name:ident: $idx:tt),+) => {
        impl<$($name),+> NdrParams for ($($name,)+)
        where
            $($name: NdrEncode + NdrDecode),+
        {
            fn encode_params(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
                $(w.write(&self.$idx)?;)+
                Ok(())
            }

            fn decode_params(r: &mut NdrReader) -> midl_ndr::Result<Self> {
                Ok(($(r.read::<$name>()?,)+))
            }
        }
    };
}

impl_ndr_params!(A: 0);
impl_ndr_params!(A: 0, B: 1);
impl_ndr_params!(A: 0, B: 1, C: 2);
impl_ndr_params!(A: 0, B: 1, C: 2, D: 3);
impl_ndr_params!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_ndr_params!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_ndr_params!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_ndr_params!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);

/// Binds a descriptor to its request and response layouts
///
/// ```
/// use dcom::{Operation, OperationDescriptor};
/// use midl_ndr::VariantBool;
///
/// struct IsOpen;
///
/// impl Operation for IsOpen {
///     const DESCRIPTOR: OperationDescriptor = OperationDescriptor::new(9, "IsOpen");
///     type Request = ();
///     type Response = (VariantBool,);
/// }
/// ```
pub trait Operation: 'static {
    const DESCRIPTOR: OperationDescriptor;

    /// `[in]` parameters
    type Request: NdrParams + Send + Sync;

    /// `[out]` parameters, excluding the return value
    type Response: NdrParams + Send + Sync;
}

/// Decoded request: correlation header plus `[in]` parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFrame<P> {
    pub this: OrpcThis,
    pub params: P,
}

impl<P> RequestFrame<P> {
    pub fn new(this: OrpcThis, params: P) -> Self {
        Self { this, params }
    }
}

/// Decoded response: correlation header, `[out]` parameters, return value
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame<P> {
    pub that: OrpcThat,
    pub params: P,
    pub result: Hresult,
}

impl<P> ResponseFrame<P> {
    pub fn new(params: P, result: Hresult) -> Self {
        Self {
            that: OrpcThat::new(),
            params,
            result,
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.result.outcome()
    }
}

pub fn encode_request<P: NdrParams>(
    op: &OperationDescriptor,
    request: &RequestFrame<P>,
    ctx: NdrContext,
) -> Result<Bytes> {
    let mut w = NdrWriter::new(ctx);
    w.write(&request.this)?;
    request.params.encode_params(&mut w)?;
    let bytes = w.into_bytes()?;
    trace!(op = op.name, opnum = op.opnum, len = bytes.len(), "request encoded");
    Ok(bytes)
}

pub fn decode_request<P: NdrParams>(
    op: &OperationDescriptor,
    payload: Bytes,
    ctx: NdrContext,
) -> Result<RequestFrame<P>> {
    let mut r = NdrReader::new(payload, ctx);
    let this = r.read::<OrpcThis>()?;
    let params = P::decode_params(&mut r)?;
    let trailing = r.finish()?;
    trace!(op = op.name, opnum = op.opnum, trailing, "request decoded");
    Ok(RequestFrame { this, params })
}

pub fn encode_response<P: NdrParams>(
    op: &OperationDescriptor,
    response: &ResponseFrame<P>,
    ctx: NdrContext,
) -> Result<Bytes> {
    let mut w = NdrWriter::new(ctx);
    w.write(&response.that)?;
    response.params.encode_params(&mut w)?;
    w.write(&response.result)?;
    let bytes = w.into_bytes()?;
    trace!(op = op.name, opnum = op.opnum, len = bytes.len(), result = %response.result, "response encoded");
    Ok(bytes)
}

/// Decodes the whole response even when the return value is a failure,
/// so `[out]` parameters populated by a failing call are kept.
pub fn decode_response<P: NdrParams>(
    op: &OperationDescriptor,
    payload: Bytes,
    ctx: NdrContext,
) -> Result<ResponseFrame<P>> {
    let mut r = NdrReader::new(payload, ctx);
    let that = r.read::<OrpcThat>()?;
    let params = P::decode_params(&mut r)?;
    let result = r.read::<Hresult>()?;
    let trailing = r.finish()?;
    trace!(op = op.name, opnum = op.opnum, trailing, result = %result, "response decoded");
    Ok(ResponseFrame { that, params, result })
}
