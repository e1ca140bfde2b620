//! Object client
//!
//! Issues typed calls against one interface pointer over a [`CallTransport`].

use midl_ndr::NdrContext;
use tracing::{debug, trace};

use crate::operation::{decode_response, encode_request, Operation, RequestFrame, ResponseFrame};
use crate::transport::{
    read_reply, write_request, CallReply, CallRequest, CallTransport, DEFAULT_MAX_FRAME_SIZE,
};
use crate::types::{ComVersion, DcomError, Ipid, ObjRef, OrpcThis, Result};

/// Object client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub ndr: NdrContext,
    /// COM version advertised in every ORPCTHIS
    pub version: ComVersion,
    /// Largest accepted reply payload
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ndr: NdrContext::new(),
            version: ComVersion::DCOM_5_7,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn with_ndr(mut self, ndr: NdrContext) -> Self {
        self.ndr = ndr;
        self
    }

    pub fn with_version(mut self, version: ComVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }
}

/// Client for a remote interface pointer
pub struct ObjectClient<T> {
    transport: T,
    ipid: Option<Ipid>,
    config: ClientConfig,
}

impl<T: CallTransport> ObjectClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            ipid: None,
            config,
        }
    }

    /// Address subsequent calls to `ipid`
    pub fn bind(&mut self, ipid: Ipid) {
        debug!(%ipid, "client bound");
        self.ipid = Some(ipid);
    }

    /// Address subsequent calls to the IPID inside a received OBJREF
    pub fn bind_objref(&mut self, objref: &ObjRef) -> Result<Ipid> {
        let ipid = objref
            .ipid()
            .ok_or(DcomError::NoStandardReference(objref.flags()))?;
        self.bind(ipid);
        Ok(ipid)
    }

    pub fn ipid(&self) -> Option<Ipid> {
        self.ipid
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Call `O` with a fresh causality id
    pub async fn call<O: Operation>(&mut self, params: O::Request) -> Result<ResponseFrame<O::Response>> {
        self.invoke::<O>(OrpcThis::new(), params).await
    }

    /// Call `O` on the bound IPID.
    ///
    /// A fault reply becomes [`DcomError::Fault`]. A response whose return
    /// value is a failure is still returned; inspect
    /// [`ResponseFrame::outcome`].
    pub async fn invoke<O: Operation>(
        &mut self,
        this: OrpcThis,
        params: O::Request,
    ) -> Result<ResponseFrame<O::Response>> {
        let ipid = self.ipid.ok_or(DcomError::MissingIpid)?;
        let this = this.with_version(self.config.version);
        let payload = encode_request(&O::DESCRIPTOR, &RequestFrame::new(this, params), self.config.ndr)?;
        let request = CallRequest {
            ipid,
            opnum: O::DESCRIPTOR.opnum,
            payload,
        };
        write_request(&mut self.transport, &request, self.config.max_frame_size).await?;

        match read_reply(&mut self.transport, self.config.max_frame_size).await? {
            CallReply::Response(payload) => {
                let response = decode_response::<O::Response>(&O::DESCRIPTOR, payload, self.config.ndr)?;
                trace!(%ipid, op = O::DESCRIPTOR.name, result = %response.result, "call completed");
                Ok(response)
            }
            CallReply::Fault(hr) => {
                debug!(%ipid, op = O::DESCRIPTOR.name, fault = %hr, "call faulted");
                Err(DcomError::Fault(hr))
            }
        }
    }
}

impl<T> std::fmt::Debug for ObjectClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectClient")
            .field("ipid", &self.ipid)
            .field("config", &self.config)
            .finish()
    }
}
