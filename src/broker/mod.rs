//! Purpose: Describe the broker client capabilities the read and write paths consume.
//! Exports: `HandleFactory`, `ReadHandle`, `WriteHandle`, and the raw wire types.
//! Role: Seam between the record operations and a concrete broker client.
//! Invariants: Read handles are released by dropping them; no explicit close is needed.
//! Invariants: A send callback fires at most once per `WriteHandle::send`.
//! Invariants: Offsets and timestamps are broker-native (`i64`, epoch milliseconds).

pub mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::Error;

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartitionInfo {
    pub topic: String,
    pub partition: i32,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TimestampType {
    NoTimestampType,
    #[default]
    CreateTime,
    LogAppendTime,
}

impl TimestampType {
    pub fn name(self) -> &'static str {
        match self {
            TimestampType::NoTimestampType => "NO_TIMESTAMP_TYPE",
            TimestampType::CreateTime => "CREATE_TIME",
            TimestampType::LogAppendTime => "LOG_APPEND_TIME",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
    pub key: String,
    pub value: Option<Vec<u8>>,
}

/// A message as delivered by `ReadHandle::poll`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: i64,
    pub timestamp_type: TimestampType,
    pub key: Option<String>,
    pub value: Option<String>,
    pub headers: Vec<Header>,
}

/// A message handed to `WriteHandle::send`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutboundRecord {
    pub topic: String,
    pub partition: Option<i32>,
    pub timestamp: Option<i64>,
    pub key: Option<String>,
    pub value: Option<String>,
    pub headers: Vec<Header>,
}

/// What the broker reports back for an acknowledged send.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordMetadata {
    pub topic: String,
    pub partition: i32,
    pub offset: Option<i64>,
    pub timestamp: Option<i64>,
}

pub type SendCallback = Box<dyn FnOnce(Result<RecordMetadata, Error>) + Send + 'static>;

pub trait ReadHandle: Send {
    /// Partitions of `topic`; empty when the topic does not exist.
    fn partitions_for(&mut self, topic: &str) -> Result<Vec<PartitionInfo>, Error>;

    fn assign(&mut self, partitions: &[TopicPartition]) -> Result<(), Error>;

    fn seek(&mut self, partition: &TopicPartition, offset: i64) -> Result<(), Error>;

    fn seek_to_end(&mut self, partitions: &[TopicPartition]) -> Result<(), Error>;

    /// First offset whose timestamp is at or after the requested instant, per partition.
    fn offsets_for_times(
        &mut self,
        query: &BTreeMap<TopicPartition, i64>,
    ) -> Result<BTreeMap<TopicPartition, Option<i64>>, Error>;

    fn end_offsets(
        &mut self,
        partitions: &[TopicPartition],
    ) -> Result<BTreeMap<TopicPartition, i64>, Error>;

    fn poll(&mut self, timeout: Duration) -> Result<Vec<RawRecord>, Error>;
}

pub trait WriteHandle: Send + Sync {
    /// Submits `record`; the outcome is delivered only through `on_complete`.
    fn send(&self, record: OutboundRecord, on_complete: SendCallback);

    fn close(&self, grace: Duration) -> Result<(), Error>;
}

pub trait HandleFactory: Send + Sync {
    fn create_read_handle(&self, max_poll_records: usize) -> Result<Box<dyn ReadHandle>, Error>;

    fn create_write_handle(&self) -> Result<Arc<dyn WriteHandle>, Error>;
}

#[cfg(test)]
mod tests {
    use super::{TimestampType, TopicPartition};

    #[test]
    fn timestamp_type_names_match_broker_enum() {
        assert_eq!(TimestampType::NoTimestampType.name(), "NO_TIMESTAMP_TYPE");
        assert_eq!(TimestampType::CreateTime.name(), "CREATE_TIME");
        assert_eq!(TimestampType::LogAppendTime.name(), "LOG_APPEND_TIME");
    }

    #[test]
    fn topic_partitions_order_by_topic_then_partition() {
        let mut parts = vec![
            TopicPartition::new("b", 0),
            TopicPartition::new("a", 2),
            TopicPartition::new("a", 1),
        ];
        parts.sort();
        assert_eq!(parts[0], TopicPartition::new("a", 1));
        assert_eq!(parts[2].to_string(), "b-0");
    }
}
