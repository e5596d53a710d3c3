//! Submission and polling against the embedded store and broker, with no
//! worker running.

use fizzq::broker::{Consumer, Delivery, MemoryBroker};
use fizzq::dispatch::Dispatcher;
use fizzq::error::Error;
use fizzq::model::{STATUS_TTL, Status, WorkId};
use fizzq::status::StatusReader;
use fizzq::store::{MemoryStore, StatusStore};
use std::sync::Arc;
use std::time::Duration;

const TOPIC: &str = "raw-input";

struct Fixture {
    broker: MemoryBroker,
    store: Arc<MemoryStore>,
    dispatcher: Dispatcher,
    reader: StatusReader,
}

fn fixture() -> Fixture {
    let broker = MemoryBroker::new();
    broker.create_topic(TOPIC, 3).unwrap();
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Dispatcher::new(store.clone(), Arc::new(broker.clone()), TOPIC);
    let reader = StatusReader::new(store.clone());
    Fixture {
        broker,
        store,
        dispatcher,
        reader,
    }
}

fn total_records(broker: &MemoryBroker) -> i64 {
    (0..3).map(|p| broker.end_offset(TOPIC, p).unwrap()).sum()
}

#[tokio::test]
async fn dispatched_item_reads_as_dispatched_before_processing() {
    let f = fixture();
    let id = f.dispatcher.dispatch(15).await.unwrap();

    assert_eq!(f.reader.get_status(id).await, Status::Dispatched);
    assert_eq!(f.reader.get_result(id).await, None);
    assert_eq!(total_records(&f.broker), 1);
}

#[tokio::test]
async fn status_record_uses_its_store_form() {
    let f = fixture();
    let id = f.dispatcher.dispatch(8).await.unwrap();
    assert_eq!(
        f.store.get(&id.status_key()).await.unwrap().as_deref(),
        Some("Dispatched")
    );
    assert_eq!(f.store.get(&id.result_key()).await.unwrap(), None);
}

#[tokio::test]
async fn record_is_keyed_by_identifier_and_carries_payload() {
    let f = fixture();
    let id = f.dispatcher.dispatch(-42).await.unwrap();

    let mut consumer = f.broker.consumer("inspect");
    consumer.subscribe(TOPIC).await.unwrap();
    let record = loop {
        let delivery = tokio::time::timeout(Duration::from_secs(2), consumer.recv())
            .await
            .unwrap()
            .unwrap();
        if let Delivery::Message(record) = delivery {
            break record;
        }
    };

    assert_eq!(record.key, id.to_string());
    assert_eq!(record.partition, f.broker.partition_of(TOPIC, &record.key).unwrap());
    let payload: i64 = serde_json::from_slice(&record.value).unwrap();
    assert_eq!(payload, -42);
}

#[tokio::test]
async fn identifiers_are_unique() {
    let f = fixture();
    let mut seen = std::collections::HashSet::new();
    for n in 0..200 {
        assert!(seen.insert(f.dispatcher.dispatch(n).await.unwrap()));
    }
}

#[tokio::test]
async fn unknown_and_malformed_identifiers_are_invalid() {
    let f = fixture();
    f.dispatcher.dispatch(1).await.unwrap();

    let stranger = WorkId::new();
    assert_eq!(f.reader.get_status(stranger).await, Status::Invalid);
    assert_eq!(f.reader.get_result(stranger).await, None);

    assert_eq!(f.reader.status_of("not-a-uuid").await, Status::Invalid);
    assert_eq!(f.reader.status_of("").await, Status::Invalid);
    assert_eq!(f.reader.result_of("12345").await, None);
}

#[tokio::test]
async fn garbage_status_values_read_as_invalid() {
    let f = fixture();
    let id = WorkId::new();
    f.store
        .set(&id.status_key(), "Exploded", STATUS_TTL)
        .await
        .unwrap();
    assert_eq!(f.reader.get_status(id).await, Status::Invalid);
}

#[tokio::test]
async fn reads_have_no_side_effects() {
    let f = fixture();
    let id = f.dispatcher.dispatch(3).await.unwrap();
    f.store
        .set(&id.result_key(), "fizz", STATUS_TTL)
        .await
        .unwrap();

    for _ in 0..5 {
        assert_eq!(f.reader.get_status(id).await, Status::Dispatched);
        assert_eq!(f.reader.get_result(id).await.as_deref(), Some("fizz"));
    }
    assert_eq!(f.store.len(), 2);
}

#[tokio::test]
async fn publish_failure_is_surfaced_and_leaves_orphan_status() {
    let f = fixture();
    f.broker.fail_publishes(1).unwrap();

    let err = f.dispatcher.dispatch(5).await.unwrap_err();
    assert!(matches!(err, Error::Publish(_)), "{err}");

    // The status record was written before the publish and is left to expire.
    assert_eq!(f.store.len(), 1);
    assert_eq!(total_records(&f.broker), 0);

    // The broker recovers; the caller resubmits.
    let id = f.dispatcher.dispatch(5).await.unwrap();
    assert_eq!(f.reader.get_status(id).await, Status::Dispatched);
    assert_eq!(total_records(&f.broker), 1);
}

#[tokio::test]
async fn store_failure_prevents_publish() {
    let f = fixture();
    f.store.fail_writes(1);

    let err = f.dispatcher.dispatch(5).await.unwrap_err();
    assert!(matches!(err, Error::Store(_)), "{err}");
    assert_eq!(total_records(&f.broker), 0);
}

#[tokio::test]
async fn unknown_topic_fails_dispatch() {
    let f = fixture();
    let dispatcher = Dispatcher::new(f.store.clone(), Arc::new(f.broker.clone()), "nowhere");
    assert!(matches!(
        dispatcher.dispatch(1).await,
        Err(Error::Publish(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn status_expires_after_ttl() {
    let f = fixture();
    let id = f.dispatcher.dispatch(15).await.unwrap();

    tokio::time::advance(STATUS_TTL - Duration::from_secs(1)).await;
    assert_eq!(f.reader.get_status(id).await, Status::Dispatched);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(f.reader.get_status(id).await, Status::Invalid);
}

#[tokio::test(start_paused = true)]
async fn custom_ttl_is_applied() {
    let f = fixture();
    let dispatcher = f.dispatcher.clone().with_ttl(Duration::from_secs(5));
    let id = dispatcher.dispatch(1).await.unwrap();

    tokio::time::advance(Duration::from_secs(6)).await;
    assert_eq!(f.reader.get_status(id).await, Status::Invalid);
}
