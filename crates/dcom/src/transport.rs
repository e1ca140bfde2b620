//! Call framing over a reliable byte stream
//!
//! Request frame (little-endian):
//!
//! ```text
//! +----------------+-------+----------+-------------+---------+
//! | IPID (16)      | opnum | reserved | payload len | payload |
//! |                | u16   | u16      | u32         |         |
//! +----------------+-------+----------+-------------+---------+
//! ```
//!
//! Reply frame: `status: i32`, `payload len: u32`, payload. A zero status
//! carries a response payload; any other status is a fault with no payload.

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use midl_ndr::NdrUuid;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::{DcomError, Hresult, Ipid, Result};

/// Default limit on an accepted frame payload (1 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1 << 20;

const REQUEST_HEADER_LEN: usize = 24;
const REPLY_HEADER_LEN: usize = 8;

/// Byte transport a call runs over
#[async_trait]
pub trait CallTransport: Send {
    /// Read exactly `n` bytes. End of stream before the first byte is
    /// `ConnectionClosed`.
    async fn read(&mut self, n: usize) -> Result<Bytes>;

    async fn write(&mut self, data: Bytes) -> Result<()>;
}

/// [`CallTransport`] over any tokio stream
pub struct StreamTransport<S> {
    inner: S,
}

impl<S> StreamTransport<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S> CallTransport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read(&mut self, n: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(n);
        let mut filled = 0;
        while filled < n {
            let read = self.inner.read(&mut buf[filled..]).await?;
            if read == 0 {
                if filled == 0 {
                    return Err(DcomError::ConnectionClosed);
                }
                return Err(DcomError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("incomplete frame: expected {} bytes, got {}", n, filled),
                )));
            }
            filled += read;
        }
        Ok(buf.freeze())
    }

    async fn write(&mut self, data: Bytes) -> Result<()> {
        self.inner.write_all(&data).await?;
        self.inner.flush().await?;
        Ok(())
    }
}

/// One call addressed to an interface pointer
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub ipid: Ipid,
    pub opnum: u16,
    pub payload: Bytes,
}

/// Server answer to one call
#[derive(Debug, Clone, PartialEq)]
pub enum CallReply {
    Response(Bytes),
    Fault(Hresult),
}

fn payload_len(len: usize, limit: usize) -> Result<u32> {
    if len > limit {
        return Err(DcomError::FrameTooLarge { size: len, limit });
    }
    u32::try_from(len).map_err(|_| DcomError::FrameTooLarge { size: len, limit })
}

async fn read_payload<T: CallTransport + ?Sized>(transport: &mut T, len: usize, limit: usize) -> Result<Bytes> {
    if len > limit {
        return Err(DcomError::FrameTooLarge { size: len, limit });
    }
    if len == 0 {
        return Ok(Bytes::new());
    }
    transport.read(len).await
}

pub async fn write_request<T: CallTransport + ?Sized>(
    transport: &mut T,
    request: &CallRequest,
    limit: usize,
) -> Result<()> {
    let len = payload_len(request.payload.len(), limit)?;
    let mut frame = BytesMut::with_capacity(REQUEST_HEADER_LEN + request.payload.len());
    frame.put_slice(&request.ipid.0.to_bytes_le());
    frame.put_u16_le(request.opnum);
    frame.put_u16_le(0);
    frame.put_u32_le(len);
    frame.put_slice(&request.payload);
    transport.write(frame.freeze()).await
}

pub async fn read_request<T: CallTransport + ?Sized>(transport: &mut T, limit: usize) -> Result<CallRequest> {
    let mut header = transport.read(REQUEST_HEADER_LEN).await?;
    let mut raw = [0u8; 16];
    header.copy_to_slice(&mut raw);
    let ipid = Ipid(NdrUuid::from_bytes_le(raw));
    let opnum = header.get_u16_le();
    let _reserved = header.get_u16_le();
    let len = header.get_u32_le() as usize;
    let payload = read_payload(transport, len, limit).await?;
    Ok(CallRequest { ipid, opnum, payload })
}

pub async fn write_reply<T: CallTransport + ?Sized>(transport: &mut T, reply: &CallReply, limit: usize) -> Result<()> {
    let (status, payload) = match reply {
        CallReply::Response(payload) => (Hresult::S_OK, payload.clone()),
        CallReply::Fault(hr) => (*hr, Bytes::new()),
    };
    let len = payload_len(payload.len(), limit)?;
    let mut frame = BytesMut::with_capacity(REPLY_HEADER_LEN + payload.len());
    frame.put_i32_le(status.0);
    frame.put_u32_le(len);
    frame.put_slice(&payload);
    transport.write(frame.freeze()).await
}

pub async fn read_reply<T: CallTransport + ?Sized>(transport: &mut T, limit: usize) -> Result<CallReply> {
    let mut header = transport.read(REPLY_HEADER_LEN).await?;
    let status = Hresult(header.get_i32_le());
    let len = header.get_u32_le() as usize;
    let payload = read_payload(transport, len, limit).await?;
    if status == Hresult::S_OK {
        Ok(CallReply::Response(payload))
    } else {
        Ok(CallReply::Fault(status))
    }
}
