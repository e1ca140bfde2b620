//! End-to-End Tests - Typed Calls Through Client, Transport and Server
//!
//! These tests run complete ORPC calls:
//! - IsOpen over an in-memory stream and over TCP
//! - Causality ids and ORPC extensions surviving the trip
//! - Failing HRESULTs with populated [out] parameters
//! - Faults for unknown objects and operations
//! - Big-endian payloads

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use dcom::types::{OrpcExtent, OrpcExtentArray};
use dcom::{
    classify, ClientConfig, DcomError, ErrorKind, Hresult, Ipid, ObjectClient, ObjectServer,
    Oid, OrpcThis, Outcome, ServerConfig, StreamTransport,
};
use midl_ndr::{BString, Bstr, ConformantArray, NdrContext, NdrPtr, NdrUuid, VariantBool};

fn queue_of(server: &ObjectServer, ipid: &Ipid) -> Arc<dcom::IpidEntry> {
    server.objects().resolve(ipid).unwrap()
}

#[tokio::test]
async fn test_is_open_roundtrip() {
    init_logging();
    let (server, ipid) = queue_server("orders");
    let mut client = loopback_client(&server, ipid);

    let cid = NdrUuid::parse("6ba7b810-9dad-11d1-80b4-00c04fd430c8").unwrap();
    let response = client
        .invoke::<IsOpen>(OrpcThis::with_causality(cid), ())
        .await
        .unwrap();

    assert_eq!(response.result, Hresult::S_OK);
    assert_eq!(classify(response.result.0), Outcome::Success);
    assert_eq!(response.params.0, VariantBool::TRUE);
    assert_eq!(response.params.0.as_bool(), Some(true));

    let entry = queue_of(&server, &ipid);
    let queue = entry.object.downcast_ref::<QueueObject>().unwrap();
    let seen = queue.last_this.lock().clone().unwrap();
    assert_eq!(seen.causality_id, cid);
}

#[tokio::test]
async fn test_closed_queue_reports_false() {
    init_logging();
    let (server, ipid) = queue_server("orders");
    queue_of(&server, &ipid)
        .object
        .downcast_ref::<QueueObject>()
        .unwrap()
        .open
        .store(false, Ordering::SeqCst);

    let mut client = loopback_client(&server, ipid);
    let response = client.call::<IsOpen>(()).await.unwrap();
    assert_eq!(response.params.0, VariantBool::FALSE);
    assert!(response.outcome().is_success());
}

#[tokio::test]
async fn test_extensions_reach_the_handler() {
    init_logging();
    let (server, ipid) = queue_server("orders");
    let mut client = loopback_client(&server, ipid);

    let debug_ext = NdrUuid::new(0xF1F1_F1F1, 1, 2, [3; 8]);
    let this = OrpcThis::new().with_extensions(OrpcExtentArray::new(vec![OrpcExtent {
        id: debug_ext,
        data: b"trace-me".to_vec(),
    }])
    .unwrap());
    client.invoke::<IsOpen>(this, ()).await.unwrap();

    let entry = queue_of(&server, &ipid);
    let queue = entry.object.downcast_ref::<QueueObject>().unwrap();
    let seen = queue.last_this.lock().clone().unwrap();
    let extensions = seen.extensions.get().unwrap();
    assert_eq!(extensions.find(&debug_ext).unwrap().data, b"trace-me");
}

#[tokio::test]
async fn test_failing_result_keeps_out_params() {
    init_logging();
    let (server, ipid) = queue_server("orders");
    let mut client = loopback_client(&server, ipid);

    let refused = client.call::<Rename>((Bstr::null(),)).await.unwrap();
    assert_eq!(refused.outcome(), Outcome::Failure(ErrorKind::InvalidParameter));
    assert_eq!(refused.params.0.get().unwrap().to_string(), "orders");

    let renamed = client
        .call::<Rename>((Bstr::new(BString::new("invoices")),))
        .await
        .unwrap();
    assert!(renamed.outcome().is_success());
    assert_eq!(renamed.params.0.get().unwrap().to_string(), "orders");

    let again = client.call::<Rename>((Bstr::new(BString::new("x")),)).await.unwrap();
    assert_eq!(again.params.0.get().unwrap().to_string(), "invoices");
}

#[tokio::test]
async fn test_faults_surface_as_errors() {
    init_logging();
    let (server, ipid) = queue_server("orders");

    let mut stranger = loopback_client(&server, Ipid::generate());
    assert!(matches!(
        stranger.call::<IsOpen>(()).await,
        Err(DcomError::Fault(hr)) if hr == Hresult::RPC_E_INVALID_OBJECT
    ));

    let mut client = loopback_client(&server, ipid);
    let err = client.call::<Missing>(()).await.unwrap_err();
    match err {
        DcomError::Fault(hr) => {
            assert_eq!(hr, Hresult::RPC_S_PROCNUM_OUT_OF_RANGE);
            assert_eq!(hr.outcome(), Outcome::Failure(ErrorKind::NotImplemented));
        }
        other => panic!("expected fault, got {other:?}"),
    }

    // The connection survives a fault.
    assert!(client.call::<IsOpen>(()).await.is_ok());
}

#[tokio::test]
async fn test_released_object_is_gone() {
    init_logging();
    let (server, ipid) = queue_server("orders");
    let mut client = loopback_client(&server, ipid);

    assert_eq!(server.objects().add_refs(&ipid, 2).unwrap(), 3);
    client.call::<IsOpen>(()).await.unwrap();
    assert_eq!(server.objects().release_refs(&ipid, 3).unwrap(), 0);

    assert!(matches!(
        client.call::<IsOpen>(()).await,
        Err(DcomError::Fault(hr)) if hr.outcome() == Outcome::Failure(ErrorKind::ObjectNoLongerExists)
    ));
}

#[tokio::test]
async fn test_big_endian_payloads() {
    init_logging();
    let ndr = NdrContext::big_endian();
    let server = Arc::new(ObjectServer::with_config(
        queue_table(),
        ServerConfig::default().with_ndr(ndr),
    ));
    let ipid = server
        .export(Oid::generate(), IQUEUE, Arc::new(QueueObject::named("be")))
        .unwrap();

    let (client_end, server_end) = tokio::io::duplex(4096);
    let serving = Arc::clone(&server);
    tokio::spawn(async move {
        let mut transport = StreamTransport::new(server_end);
        let _ = serving.serve(&mut transport).await;
    });

    let mut client = ObjectClient::with_config(
        StreamTransport::new(client_end),
        ClientConfig::default().with_ndr(ndr),
    );
    client.bind(ipid);

    let response = client
        .call::<Push>((ConformantArray::new(vec![10, 20, 30]),))
        .await
        .unwrap();
    assert_eq!(response.params.0, 3);
}

#[tokio::test]
async fn test_is_open_over_tcp() {
    init_logging();
    let (server, ipid) = queue_server("orders");
    let addr = start_tcp_server(server).await;

    let mut client = connect_client(addr, ipid).await;
    for _ in 0..3 {
        let response = client.call::<IsOpen>(()).await.unwrap();
        assert!(response.params.0.is_true());
    }
}

#[tokio::test]
async fn test_frame_limit_enforced_by_client() {
    init_logging();
    let (server, ipid) = queue_server("orders");
    let (client_end, server_end) = tokio::io::duplex(4096);
    let serving = Arc::clone(&server);
    tokio::spawn(async move {
        let mut transport = StreamTransport::new(server_end);
        let _ = serving.serve(&mut transport).await;
    });

    let mut client = ObjectClient::with_config(
        StreamTransport::new(client_end),
        ClientConfig::default().with_max_frame_size(4),
    );
    client.bind(ipid);
    assert!(matches!(
        client.call::<Missing>(()).await,
        Err(DcomError::FrameTooLarge { .. })
    ));
}
