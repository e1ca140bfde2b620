//! Dispatch Tests - Interface Inheritance and Opnum Routing
//!
//! These tests exercise the dispatch table through the object server:
//! - Opnums below an interface's first own opnum reach the base interface
//! - The first own opnum reaches the derived interface
//! - Opnums past the highest handler fault with a not-implemented code
//! - Chains several interfaces deep

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;

use common::*;
use dcom::types::iid;
use dcom::{
    encode_request, CallContext, CallReply, DcomError, DispatchTable, Hresult, InterfaceBuilder,
    ObjectServer, Oid, Operation, OrpcThis, RequestFrame, ServerConfig,
};
use midl_ndr::{ConformantArray, NdrContext};

fn request<O: Operation>(params: O::Request) -> Bytes {
    encode_request(&O::DESCRIPTOR, &RequestFrame::new(OrpcThis::new(), params), NdrContext::new())
        .unwrap()
}

#[test]
fn test_delegation_boundaries() {
    init_logging();
    let table = queue_table();

    // Below the threshold: IDispatch owns it.
    let below = table.route(IQUEUE, IQUEUE_FIRST_OPNUM - 4).unwrap();
    assert_eq!(below.owner, iid::IDISPATCH);
    assert_eq!(below.descriptor.name, "GetTypeInfoCount");

    // At the threshold: IQueue owns it.
    let at = table.route(IQUEUE, IQUEUE_FIRST_OPNUM).unwrap();
    assert_eq!(at.owner, IQUEUE);
    assert_eq!(at.descriptor.name, "Push");

    // Above the highest own handler.
    assert!(matches!(
        table.route(IQUEUE, 10),
        Err(DcomError::UnsupportedOperation { opnum: 10, .. })
    ));

    // Delegated but unimplemented in every base.
    assert!(matches!(
        table.route(IQUEUE, 1),
        Err(DcomError::UnsupportedOperation { opnum: 1, .. })
    ));
}

#[test]
fn test_base_operation_through_server() {
    init_logging();
    let (server, ipid) = queue_server("orders");

    let reply = server.handle_call(ipid, 3, request::<GetTypeInfoCount>(()));
    assert!(matches!(reply, CallReply::Response(_)));

    let reply = server.handle_call(ipid, 7, request::<Push>((ConformantArray::new(vec![1, 2]),)));
    assert!(matches!(reply, CallReply::Response(_)));

    let queue = server.objects().resolve(&ipid).unwrap();
    let queue = queue.object.downcast_ref::<QueueObject>().unwrap();
    assert_eq!(*queue.items.lock(), vec![1, 2]);
    assert_eq!(queue.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unsupported_operation_fault_is_configurable() {
    init_logging();
    let config = ServerConfig::default().with_unsupported_operation_fault(Hresult::E_NOTIMPL);
    let server = ObjectServer::with_config(queue_table(), config);
    let ipid = server
        .export(Oid::generate(), IQUEUE, Arc::new(QueueObject::named("q")))
        .unwrap();

    assert_eq!(
        server.handle_call(ipid, Missing::DESCRIPTOR.opnum, request::<Missing>(())),
        CallReply::Fault(Hresult::E_NOTIMPL)
    );
    // The connection-level answer is recoverable; the next call succeeds.
    assert!(matches!(
        server.handle_call(ipid, 9, request::<IsOpen>(())),
        CallReply::Response(_)
    ));
}

#[test]
fn test_ipid_exported_for_base_interface() {
    init_logging();
    let server = ObjectServer::new(queue_table());
    let ipid = server
        .export(Oid::generate(), iid::IDISPATCH, Arc::new(QueueObject::named("q")))
        .unwrap();

    // Routed on IDispatch, so IQueue's opnums are unknown.
    assert!(matches!(
        server.handle_call(ipid, 3, request::<GetTypeInfoCount>(())),
        CallReply::Response(_)
    ));
    assert_eq!(
        server.handle_call(ipid, 9, request::<IsOpen>(())),
        CallReply::Fault(Hresult::RPC_S_PROCNUM_OUT_OF_RANGE)
    );
}

#[test]
fn test_deep_chain() {
    init_logging();
    let levels = [
        midl_ndr::NdrUuid::new(0x1000_0001, 0, 0, [0; 8]),
        midl_ndr::NdrUuid::new(0x1000_0002, 0, 0, [0; 8]),
        midl_ndr::NdrUuid::new(0x1000_0003, 0, 0, [0; 8]),
        midl_ndr::NdrUuid::new(0x1000_0004, 0, 0, [0; 8]),
    ];

    let mut builder = DispatchTable::builder();
    for (depth, uuid) in levels.iter().enumerate() {
        let opnum = depth as u16;
        let handler: dcom::dispatch::OperationHandler =
            Arc::new(move |_call: &CallContext<'_>, _payload: Bytes| {
                Ok(Bytes::from(vec![opnum as u8]))
            });
        let mut interface = InterfaceBuilder::new(*uuid, "level")
            .raw_operation(dcom::OperationDescriptor::new(opnum, "op"), handler);
        if depth > 0 {
            interface = interface.inherits(levels[depth - 1], opnum);
        }
        builder = builder.interface(interface);
    }
    let table = builder.build().unwrap();

    for opnum in 0..4u16 {
        let matched = table.route(levels[3], opnum).unwrap();
        assert_eq!(matched.owner, levels[opnum as usize]);
    }
    assert!(table.route(levels[3], 4).is_err());
}
