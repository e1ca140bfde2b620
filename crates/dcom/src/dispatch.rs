//! Interface dispatch table
//!
//! Maps `(interface, opnum)` to a handler. A derived COM interface occupies
//! the opnums of its base first, so each interface records the first opnum
//! it owns and the interface to delegate anything lower to:
//!
//! ```text
//! IUnknown   0..3
//! IDispatch  3..7     base IUnknown,  first own opnum 3
//! IMyQueue   7..      base IDispatch, first own opnum 7
//! ```
//!
//! The table is built once and never mutated; share it behind an `Arc`.

use std::any::{type_name, Any};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use midl_ndr::{NdrContext, NdrUuid};
use tracing::{debug, trace};

use crate::operation::{
    decode_request, encode_response, Operation, OperationDescriptor, RequestFrame, ResponseFrame,
};
use crate::types::{DcomError, Hresult, Ipid, Result};

/// Object instance behind an IPID
pub type ObjectHandle = Arc<dyn Any + Send + Sync>;

/// Per-call information handed to handlers
#[derive(Clone)]
pub struct CallContext<'a> {
    pub ipid: Ipid,
    /// Interface the IPID was registered for
    pub iid: NdrUuid,
    pub opnum: u16,
    pub object: &'a ObjectHandle,
    pub ndr: NdrContext,
}

impl fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("ipid", &self.ipid)
            .field("iid", &self.iid)
            .field("opnum", &self.opnum)
            .finish()
    }
}

/// Untyped handler: request payload in, response payload out
pub type OperationHandler = Arc<dyn Fn(&CallContext<'_>, Bytes) -> Result<Bytes> + Send + Sync>;

/// `[out]` parameters and return value produced by a typed handler
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<P> {
    pub params: P,
    pub result: Hresult,
}

impl<P> Reply<P> {
    pub fn ok(params: P) -> Self {
        Self {
            params,
            result: Hresult::S_OK,
        }
    }

    pub fn with_result(params: P, result: Hresult) -> Self {
        Self { params, result }
    }
}

#[derive(Clone)]
struct RegisteredOperation {
    descriptor: OperationDescriptor,
    handler: OperationHandler,
}

struct InterfaceEntry {
    iid: NdrUuid,
    name: &'static str,
    base: Option<NdrUuid>,
    first_opnum: u16,
    operations: HashMap<u16, RegisteredOperation>,
}

/// Describes one interface before the table is built
pub struct InterfaceBuilder {
    entry: InterfaceEntry,
    errors: Vec<String>,
}

impl InterfaceBuilder {
    /// A root interface owning every opnum from zero
    pub fn new(iid: NdrUuid, name: &'static str) -> Self {
        Self {
            entry: InterfaceEntry {
                iid,
                name,
                base: None,
                first_opnum: 0,
                operations: HashMap::new(),
            },
            errors: Vec::new(),
        }
    }

    /// Delegate every opnum below `first_opnum` to `base`
    pub fn inherits(mut self, base: NdrUuid, first_opnum: u16) -> Self {
        self.entry.base = Some(base);
        self.entry.first_opnum = first_opnum;
        self
    }

    /// Register a typed handler for `O` on objects of type `T`
    ///
    /// Calls whose IPID resolves to an object of another type fail with
    /// [`DcomError::ObjectTypeMismatch`].
    pub fn operation<O, T, F>(self, handler: F) -> Self
    where
        O: Operation,
        T: Any + Send + Sync,
        F: Fn(&T, RequestFrame<O::Request>) -> Reply<O::Response> + Send + Sync + 'static,
    {
        let raw: OperationHandler = Arc::new(move |call: &CallContext<'_>, payload: Bytes| {
            let object = call
                .object
                .downcast_ref::<T>()
                .ok_or(DcomError::ObjectTypeMismatch(type_name::<T>()))?;
            let request = decode_request::<O::Request>(&O::DESCRIPTOR, payload, call.ndr)?;
            let reply = handler(object, request);
            encode_response(
                &O::DESCRIPTOR,
                &ResponseFrame::new(reply.params, reply.result),
                call.ndr,
            )
        });
        self.raw_operation(O::DESCRIPTOR, raw)
    }

    /// Register an untyped handler
    pub fn raw_operation(mut self, descriptor: OperationDescriptor, handler: OperationHandler) -> Self {
        let opnum = descriptor.opnum;
        if self.entry.operations.contains_key(&opnum) {
            self.errors
                .push(format!("{}: opnum {} registered twice", self.entry.name, opnum));
        }
        self.entry
            .operations
            .insert(opnum, RegisteredOperation { descriptor, handler });
        self
    }
}

/// Collects interfaces and validates them into a [`DispatchTable`]
#[derive(Default)]
pub struct DispatchTableBuilder {
    interfaces: Vec<InterfaceBuilder>,
}

impl DispatchTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interface(mut self, interface: InterfaceBuilder) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Build the table. Fails on duplicate interfaces or opnums, unknown or
    /// cyclic bases, and handlers shadowed by the delegation range.
    pub fn build(self) -> Result<DispatchTable> {
        let mut interfaces = HashMap::new();
        for builder in self.interfaces {
            if let Some(err) = builder.errors.into_iter().next() {
                return Err(DcomError::InvalidTable(err));
            }
            let entry = builder.entry;
            if let Some(shadowed) = entry.operations.keys().find(|&&n| n < entry.first_opnum) {
                return Err(DcomError::InvalidTable(format!(
                    "{}: opnum {} is below its first own opnum {}",
                    entry.name, shadowed, entry.first_opnum
                )));
            }
            if interfaces.contains_key(&entry.iid) {
                return Err(DcomError::InvalidTable(format!(
                    "{} ({}) registered twice",
                    entry.name, entry.iid
                )));
            }
            interfaces.insert(entry.iid, entry);
        }

        for entry in interfaces.values() {
            let mut seen = HashSet::from([entry.iid]);
            let mut next = entry.base;
            while let Some(base) = next {
                let base_entry = interfaces.get(&base).ok_or_else(|| {
                    DcomError::InvalidTable(format!("{}: unknown base interface {}", entry.name, base))
                })?;
                if !seen.insert(base) {
                    return Err(DcomError::InvalidTable(format!(
                        "{}: inheritance cycle through {}",
                        entry.name, base_entry.name
                    )));
                }
                next = base_entry.base;
            }
        }

        debug!(interfaces = interfaces.len(), "dispatch table built");
        Ok(DispatchTable { interfaces })
    }
}

/// Routing state for one call
#[derive(Debug)]
pub enum RouteState<'a> {
    /// Not yet looked up on this interface
    Unrouted(NdrUuid),
    /// Below the interface's own range, continue at the base
    Delegated(NdrUuid),
    Matched(MatchedOperation<'a>),
    Unknown,
}

/// Handler found by [`DispatchTable::route`]
#[derive(Clone)]
pub struct MatchedOperation<'a> {
    /// Interface that owns the handler, possibly a base of the called one
    pub owner: NdrUuid,
    pub descriptor: OperationDescriptor,
    handler: &'a OperationHandler,
}

impl MatchedOperation<'_> {
    pub fn invoke(&self, call: &CallContext<'_>, payload: Bytes) -> Result<Bytes> {
        (self.handler)(call, payload)
    }
}

impl fmt::Debug for MatchedOperation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchedOperation")
            .field("owner", &self.owner)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// Immutable `(interface, opnum) -> handler` map
pub struct DispatchTable {
    interfaces: HashMap<NdrUuid, InterfaceEntry>,
}

impl DispatchTable {
    pub fn builder() -> DispatchTableBuilder {
        DispatchTableBuilder::new()
    }

    pub fn contains(&self, iid: &NdrUuid) -> bool {
        self.interfaces.contains_key(iid)
    }

    pub fn interface_name(&self, iid: &NdrUuid) -> Option<&'static str> {
        self.interfaces.get(iid).map(|entry| entry.name)
    }

    /// Advance the routing state by one interface.
    pub fn step(&self, iid: NdrUuid, opnum: u16) -> Result<RouteState<'_>> {
        let entry = self
            .interfaces
            .get(&iid)
            .ok_or(DcomError::InterfaceNotFound(iid))?;
        if opnum < entry.first_opnum {
            return Ok(match entry.base {
                Some(base) => RouteState::Delegated(base),
                None => RouteState::Unknown,
            });
        }
        Ok(match entry.operations.get(&opnum) {
            Some(op) => RouteState::Matched(MatchedOperation {
                owner: entry.iid,
                descriptor: op.descriptor,
                handler: &op.handler,
            }),
            None => RouteState::Unknown,
        })
    }

    /// Resolve an opnum on `iid`, following base interfaces.
    pub fn route(&self, iid: NdrUuid, opnum: u16) -> Result<MatchedOperation<'_>> {
        let mut state = RouteState::Unrouted(iid);
        loop {
            state = match state {
                RouteState::Unrouted(current) | RouteState::Delegated(current) => {
                    let next = self.step(current, opnum)?;
                    trace!(iid = %current, opnum, state = ?next, "route step");
                    next
                }
                RouteState::Matched(matched) => return Ok(matched),
                RouteState::Unknown => return Err(DcomError::UnsupportedOperation { iid, opnum }),
            };
        }
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.interfaces.values().map(|e| (e.name, e.operations.len())))
            .finish()
    }
}
