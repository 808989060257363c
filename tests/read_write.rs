//! Purpose: End-to-end tests for record reads and writes through the public API.
//! Exports: None (integration test module).
//! Role: Validate paging, positioning, projection, and write acknowledgment together.
//! Invariants: Uses the in-process broker; no network or filesystem access.
//! Invariants: Every test checks that no broker handle outlives its call.

use std::sync::Arc;
use std::time::Duration;

use recordops::api::{
    ErrorKind, Field, Include, ReadRequest, RecordReader, RecordWriter, WriteRequest,
};
use recordops::broker::TimestampType;
use recordops::broker::memory::MemoryBroker;

fn broker_with_topic(topic: &str, partitions: usize) -> MemoryBroker {
    let broker = MemoryBroker::new();
    broker
        .create_topic(topic, partitions, TimestampType::CreateTime)
        .expect("create topic");
    broker
}

fn reader(broker: &MemoryBroker) -> RecordReader {
    RecordReader::new(Arc::new(broker.clone())).with_poll_timeout(Duration::from_millis(50))
}

fn writer(broker: &MemoryBroker) -> RecordWriter {
    RecordWriter::new(Arc::new(broker.clone()))
}

#[tokio::test]
async fn write_then_read_round_trips_key_value_and_headers() {
    let broker = broker_with_topic("t", 1);
    let written = writer(&broker)
        .write(
            WriteRequest::new("t", "v1")
                .with_key("k1")
                .with_header("h1", "x"),
        )
        .expect("submit")
        .await
        .expect("write");

    let page = reader(&broker)
        .read(&ReadRequest::new("t", 10))
        .expect("read");
    assert_eq!(page.items.len(), 1);
    let record = &page.items[0];
    assert_eq!(record.key.as_deref(), Some("k1"));
    assert_eq!(record.value.as_deref(), Some("v1"));
    assert_eq!(record.headers, written.headers);
    assert_eq!(record.offset, written.offset);
    assert_eq!(record.partition, written.partition);
    assert_eq!(record.timestamp, written.timestamp);
    assert_eq!(record.timestamp_type.as_deref(), Some("CREATE_TIME"));

    assert_eq!(broker.open_read_handles(), 0);
    assert_eq!(broker.open_write_handles(), 0);
}

#[tokio::test]
async fn offset_reads_clamp_past_the_end() {
    let broker = broker_with_topic("t", 1);
    let writer = writer(&broker);
    for value in ["a", "b", "c"] {
        writer
            .write(WriteRequest::new("t", value))
            .expect("submit")
            .await
            .expect("write");
    }
    let reader = reader(&broker);

    let page = reader
        .read(&ReadRequest::new("t", 10).with_offset(5))
        .expect("read past end");
    assert!(page.items.is_empty());

    let page = reader
        .read(&ReadRequest::new("t", 10).with_offset(1))
        .expect("read from 1");
    let offsets: Vec<i64> = page.items.iter().filter_map(|record| record.offset).collect();
    assert_eq!(offsets, vec![1, 2]);
    let values: Vec<&str> = page
        .items
        .iter()
        .filter_map(|record| record.value.as_deref())
        .collect();
    assert_eq!(values, vec!["b", "c"]);
}

#[tokio::test]
async fn timestamp_reads_start_per_partition() {
    let broker = broker_with_topic("t", 2);
    let writer = writer(&broker);
    let cases = [
        (0, "2024-01-15T10:00:00Z"),
        (0, "2024-01-15T11:00:00Z"),
        (1, "2024-01-15T09:00:00Z"),
        (1, "2024-01-15T12:00:00Z"),
    ];
    for (partition, timestamp) in cases {
        writer
            .write(
                WriteRequest::new("t", timestamp)
                    .with_partition(partition)
                    .with_timestamp(timestamp),
            )
            .expect("submit")
            .await
            .expect("write");
    }

    let page = reader(&broker)
        .read(&ReadRequest::new("t", 10).with_timestamp("2024-01-15T10:30:00Z"))
        .expect("read");
    let mut seen: Vec<(i32, i64)> = page
        .items
        .iter()
        .map(|record| (record.partition.expect("partition"), record.offset.expect("offset")))
        .collect();
    seen.sort();
    assert_eq!(seen, vec![(0, 1), (1, 1)]);

    let page = reader(&broker)
        .read(&ReadRequest::new("t", 10).with_timestamp("2024-01-15T13:00:00Z"))
        .expect("read");
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn rejected_write_closes_handle_and_reports_broker_failure() {
    let broker = broker_with_topic("t", 1);
    let err = writer(&broker)
        .write(WriteRequest::new("t", "v").with_partition(4))
        .expect("submit")
        .await
        .expect_err("rejected");
    assert_eq!(err.kind(), ErrorKind::Broker);
    assert_eq!(broker.closed_write_handles(), 1);
    assert_eq!(broker.open_write_handles(), 0);
}

#[test]
fn resolution_errors_release_read_handles() {
    let broker = broker_with_topic("t", 2);
    let reader = reader(&broker);

    let err = reader
        .read(&ReadRequest::new("missing", 10))
        .expect_err("no topic");
    assert_eq!(err.kind(), ErrorKind::NoSuchTopic);

    let err = reader
        .read(&ReadRequest::new("t", 10).with_partition(2))
        .expect_err("no partition");
    assert_eq!(err.kind(), ErrorKind::NoSuchPartition);
    assert!(err.to_string().contains("partition: 2"));

    assert_eq!(broker.open_read_handles(), 0);
}

#[test]
fn concurrent_reads_use_private_handles() {
    let broker = broker_with_topic("t", 3);
    for partition in 0..3 {
        broker
            .append(recordops::broker::OutboundRecord {
                topic: "t".to_string(),
                partition: Some(partition),
                timestamp: None,
                key: None,
                value: Some(format!("p{partition}")),
                headers: Vec::new(),
            })
            .expect("append");
    }

    let reader = reader(&broker);
    let joins: Vec<_> = (0..3)
        .map(|partition| {
            let reader = reader.clone();
            std::thread::spawn(move || {
                reader
                    .read(
                        &ReadRequest::new("t", 10)
                            .with_partition(partition)
                            .with_include(Include::only([Field::Value])),
                    )
                    .expect("read")
            })
        })
        .collect();

    for (partition, join) in joins.into_iter().enumerate() {
        let page = join.join().expect("join");
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].value, Some(format!("p{partition}")));
        assert!(page.items[0].partition.is_none());
    }
    assert_eq!(broker.open_read_handles(), 0);
}
