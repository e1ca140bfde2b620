//! Ref Counting Tests - IRemUnknown and Marshaled Interface Pointers
//!
//! These tests drive IRemUnknown on a live server:
//! - RemAddRef and RemRelease moving IPID reference counts
//! - RemRelease to zero unexporting the interface
//! - RemQueryInterface handing out IPIDs that accept calls
//! - OBJREFs carried in an MInterfacePointer binding a client

mod common;

use std::sync::Arc;

use common::*;
use dcom::remunknown::{RemAddRef, RemInterfaceRef, RemQueryInterface, RemRelease};
use dcom::types::iid;
use dcom::{
    DcomError, Hresult, Ipid, MInterfacePointer, ObjectServer, Oid, Oxid, RemUnknown, ServerConfig,
};
use midl_ndr::{ConformantArray, NdrContext, NdrPtr, NdrUuid, UniquePtr, VariantBool};

const OXID: Oxid = Oxid(0x0A0B_0C0D);

/// Server exporting one queue and its IRemUnknown
fn rem_server() -> (Arc<ObjectServer>, Ipid, Ipid) {
    let table = queue_table_builder()
        .interface(RemUnknown::interface())
        .build()
        .unwrap();
    let server = Arc::new(ObjectServer::with_config(
        table,
        ServerConfig::default().with_oxid(OXID),
    ));
    let queue = server
        .export(Oid::generate(), IQUEUE, Arc::new(QueueObject::named("orders")))
        .unwrap();
    let rem = server.export_rem_unknown().unwrap();
    (server, queue, rem)
}

fn refs(entries: Vec<RemInterfaceRef>) -> (u16, ConformantArray<RemInterfaceRef>) {
    (entries.len() as u16, ConformantArray::new(entries))
}

#[tokio::test]
async fn test_add_ref_and_release() {
    init_logging();
    let (server, queue, rem) = rem_server();
    let mut client = loopback_client(&server, rem);

    let response = client
        .call::<RemAddRef>(refs(vec![
            RemInterfaceRef::new(queue, 4),
            RemInterfaceRef::new(Ipid::generate(), 1),
        ]))
        .await
        .unwrap();
    assert_eq!(response.result, Hresult::E_INVALIDARG);
    assert_eq!(
        response.params.0.into_inner(),
        vec![Hresult::S_OK, Hresult::E_INVALIDARG]
    );
    assert_eq!(server.objects().resolve(&queue).unwrap().public_refs(), 5);

    let response = client
        .call::<RemRelease>(refs(vec![RemInterfaceRef::new(queue, 3)]))
        .await
        .unwrap();
    assert_eq!(response.result, Hresult::S_OK);
    assert_eq!(server.objects().resolve(&queue).unwrap().public_refs(), 2);

    client
        .call::<RemRelease>(refs(vec![RemInterfaceRef::new(queue, 2)]))
        .await
        .unwrap();
    assert!(server.objects().resolve(&queue).is_err());

    let mut queue_client = loopback_client(&server, queue);
    assert!(matches!(
        queue_client.call::<IsOpen>(()).await,
        Err(DcomError::Fault(Hresult::RPC_E_INVALID_OBJECT))
    ));
}

#[tokio::test]
async fn test_ref_count_must_match_array() {
    init_logging();
    let (server, queue, rem) = rem_server();
    let mut client = loopback_client(&server, rem);

    let (_, entries) = refs(vec![RemInterfaceRef::new(queue, 1)]);
    let response = client.call::<RemAddRef>((2, entries.clone())).await.unwrap();
    assert_eq!(response.result, Hresult::E_INVALIDARG);
    assert!(response.params.0.is_empty());

    let response = client.call::<RemRelease>((0, entries)).await.unwrap();
    assert_eq!(response.result, Hresult::E_INVALIDARG);
    assert_eq!(server.objects().resolve(&queue).unwrap().public_refs(), 1);
}

#[tokio::test]
async fn test_query_interface_returns_callable_ipids() {
    init_logging();
    let (server, queue, rem) = rem_server();
    let mut client = loopback_client(&server, rem);

    let iids = ConformantArray::new(vec![iid::IDISPATCH, NdrUuid::NIL]);
    let response = client
        .call::<RemQueryInterface>((queue, 1, 2, iids))
        .await
        .unwrap();
    assert_eq!(response.result, Hresult::S_OK);
    let results = response.params.0.into_inner().unwrap().into_inner();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].hresult, Hresult::S_OK);
    assert_eq!(results[1].hresult, Hresult::E_NOINTERFACE);

    let std = results[0].std;
    assert_eq!(std.oxid, OXID);
    assert_eq!(std.oid, server.objects().resolve(&queue).unwrap().oid);
    assert_eq!(std.public_refs, 1);

    // The new IPID reaches the same queue through IDispatch.
    let mut dispatch = loopback_client(&server, std.ipid);
    let count = dispatch.call::<GetTypeInfoCount>(()).await.unwrap();
    assert_eq!(count.result, Hresult::S_OK);
    assert_eq!(count.params.0, 0);
}

#[tokio::test]
async fn test_query_interface_failures() {
    init_logging();
    let (server, queue, rem) = rem_server();
    let mut client = loopback_client(&server, rem);

    let response = client
        .call::<RemQueryInterface>((queue, 1, 1, ConformantArray::new(vec![iid::IREMUNKNOWN])))
        .await
        .unwrap();
    assert_eq!(response.result, Hresult::E_NOINTERFACE);

    let response = client
        .call::<RemQueryInterface>((Ipid::generate(), 1, 1, ConformantArray::new(vec![IQUEUE])))
        .await
        .unwrap();
    assert_eq!(response.result, Hresult::E_INVALIDARG);
    assert!(response.params.0.is_null());

    let response = client
        .call::<RemQueryInterface>((queue, 0, 1, ConformantArray::new(vec![IQUEUE])))
        .await
        .unwrap();
    assert_eq!(response.result, Hresult::E_INVALIDARG);
    assert_eq!(server.objects().len(), 2);
}

#[tokio::test]
async fn test_marshaled_pointer_binds_a_client() {
    init_logging();
    let (server, _queue, rem) = rem_server();
    let objref = server
        .marshal(Oid::generate(), IQUEUE, Arc::new(QueueObject::named("spool")), 2)
        .unwrap();

    // The pointer crosses a big-endian payload; the OBJREF inside stays
    // little-endian.
    let pointer = UniquePtr::new(MInterfacePointer::from_objref(&objref).unwrap());
    let wire = midl_ndr::encode(&pointer, NdrContext::big_endian()).unwrap();
    let received: UniquePtr<MInterfacePointer> =
        midl_ndr::decode(wire, NdrContext::big_endian()).unwrap();
    let received = received.get().unwrap().objref().unwrap();
    assert_eq!(received, objref);
    let std = *received.std().unwrap();
    assert_eq!(std.oxid, OXID);

    let mut client = loopback_client(&server, rem);
    assert_eq!(client.bind_objref(&received).unwrap(), std.ipid);
    let response = client.call::<IsOpen>(()).await.unwrap();
    assert_eq!(response.params.0, VariantBool::TRUE);

    client.bind(rem);
    let response = client
        .call::<RemRelease>(refs(vec![RemInterfaceRef::new(std.ipid, std.public_refs)]))
        .await
        .unwrap();
    assert_eq!(response.result, Hresult::S_OK);

    client.bind(std.ipid);
    assert!(matches!(
        client.call::<IsOpen>(()).await,
        Err(DcomError::Fault(Hresult::RPC_E_INVALID_OBJECT))
    ));
}
