//! Stress Tests - Concurrency at Scale
//!
//! These tests exercise the shared server state under load:
//! - Many concurrent clients calling one exported object
//! - Registrations and releases racing with lookups
//! - Independent encoders and decoders running in parallel

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Barrier;

use common::*;
use dcom::{DcomError, ObjectTable, Oid};
use midl_ndr::{decode, encode, BString, Bstr, ConformantArray, NdrContext};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_high_concurrency_many_clients() {
    init_logging();

    const NUM_CLIENTS: usize = 32;
    const REQUESTS_PER_CLIENT: usize = 50;

    let (server, ipid) = queue_server("stress");
    let addr = start_tcp_server(Arc::clone(&server)).await;

    let stats = Arc::new(ConcurrentStats::new());
    let barrier = Arc::new(Barrier::new(NUM_CLIENTS));
    let start = Instant::now();

    let tasks = (0..NUM_CLIENTS).map(|client_id| {
        let stats = Arc::clone(&stats);
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            let mut client = connect_client(addr, ipid).await;
            barrier.wait().await;
            for req_id in 0..REQUESTS_PER_CLIENT {
                let value = (client_id * REQUESTS_PER_CLIENT + req_id) as u32;
                match client.call::<Push>((ConformantArray::new(vec![value]),)).await {
                    Ok(response) if response.outcome().is_success() => stats.record_success(),
                    Ok(_) | Err(_) => stats.record_failure(),
                }
            }
        })
    });

    for result in join_all(tasks).await {
        result.unwrap();
    }

    let total = NUM_CLIENTS * REQUESTS_PER_CLIENT;
    assert_eq!(stats.failures(), 0);
    assert_eq!(stats.successes(), total);

    let entry = server.objects().resolve(&ipid).unwrap();
    let queue = entry.object.downcast_ref::<QueueObject>().unwrap();
    let mut items = queue.items.lock().clone();
    items.sort_unstable();
    assert_eq!(items, (0..total as u32).collect::<Vec<_>>());
    assert_eq!(queue.calls.load(Ordering::SeqCst), total);

    tracing::info!(total, elapsed = ?start.elapsed(), "concurrent clients finished");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_register_release_races_resolve() {
    init_logging();

    const WRITERS: usize = 4;
    const OBJECTS_PER_WRITER: usize = 200;

    let table = Arc::new(ObjectTable::new());
    let pinned = table
        .register(Oid::generate(), IQUEUE, Arc::new(QueueObject::named("pinned")), 1)
        .unwrap();

    let writers = (0..WRITERS).map(|_| {
        let table = Arc::clone(&table);
        tokio::spawn(async move {
            for _ in 0..OBJECTS_PER_WRITER {
                let ipid = table
                    .register(Oid::generate(), IQUEUE, Arc::new(QueueObject::default()), 1)
                    .unwrap();
                assert!(table.resolve(&ipid).is_ok());
                assert_eq!(table.release_refs(&ipid, 1).unwrap(), 0);
                assert!(matches!(table.resolve(&ipid), Err(DcomError::ObjectNotFound(_))));
                tokio::task::yield_now().await;
            }
        })
    });

    let reader = {
        let table = Arc::clone(&table);
        tokio::spawn(async move {
            let deadline = Instant::now() + Duration::from_millis(200);
            let mut lookups = 0usize;
            while Instant::now() < deadline {
                let entry = table.resolve(&pinned).unwrap();
                assert_eq!(entry.ipid, pinned);
                lookups += 1;
                tokio::task::yield_now().await;
            }
            lookups
        })
    };

    for result in join_all(writers).await {
        result.unwrap();
    }
    assert!(reader.await.unwrap() > 0);
    assert_eq!(table.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_encode_decode() {
    init_logging();

    let tasks = (0..64).map(|i| {
        tokio::task::spawn_blocking(move || {
            let ctx = if i % 2 == 0 {
                NdrContext::new()
            } else {
                NdrContext::big_endian()
            };
            let text = format!("payload-{i}");
            let value = (
                Bstr::new(BString::new(&text)),
                ConformantArray::new((0..i).collect::<Vec<u32>>()),
            );
            for _ in 0..100 {
                let first = encode(&value.0, ctx).unwrap();
                let second = encode(&value.1, ctx).unwrap();
                assert_eq!(decode::<Bstr>(first, ctx).unwrap(), value.0);
                assert_eq!(decode::<ConformantArray<u32>>(second, ctx).unwrap(), value.1);
            }
        })
    });

    for result in join_all(tasks).await {
        result.unwrap();
    }
}
