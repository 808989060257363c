//! Purpose: In-process partitioned log implementing the broker handle capabilities.
//! Exports: `MemoryBroker`, `MemoryReadHandle`, `MemoryWriteHandle`.
//! Role: Local development backend for the server and the test suites.
//! Invariants: Offsets are dense per partition and start at 0.
//! Invariants: Read handles start at the earliest offset of each assigned partition.
//! Invariants: Open/closed handle counters reflect every create, drop, and close.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use murmur2::murmur2;

use super::{
    HandleFactory, Header, OutboundRecord, PartitionInfo, RawRecord, ReadHandle, RecordMetadata,
    SendCallback, TimestampType, TopicPartition, WriteHandle,
};
use crate::core::error::{Error, ErrorKind};
use crate::core::timestamp::now_millis;

const KEY_HASH_SEED: u32 = 0x9747_b28c;

#[derive(Clone, Debug)]
struct StoredRecord {
    timestamp: i64,
    key: Option<String>,
    value: Option<String>,
    headers: Vec<Header>,
}

#[derive(Debug)]
struct TopicLog {
    timestamp_type: TimestampType,
    partitions: Vec<Vec<StoredRecord>>,
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: BTreeMap<String, TopicLog>,
}

#[derive(Debug, Default)]
struct BrokerInner {
    state: Mutex<BrokerState>,
    appended: Condvar,
    round_robin: AtomicUsize,
    open_read_handles: AtomicUsize,
    open_write_handles: AtomicUsize,
    closed_write_handles: AtomicUsize,
    fail_close: AtomicBool,
}

impl BrokerInner {
    fn lock(&self) -> Result<MutexGuard<'_, BrokerState>, Error> {
        self.state
            .lock()
            .map_err(|_| Error::new(ErrorKind::Internal).with_message("broker state poisoned"))
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_topic(
        &self,
        name: impl Into<String>,
        partitions: usize,
        timestamp_type: TimestampType,
    ) -> Result<(), Error> {
        let name = name.into();
        let mut state = self.inner.lock()?;
        if state.topics.contains_key(&name) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("topic already exists")
                .with_topic(name));
        }
        tracing::debug!(topic = %name, partitions, "created topic");
        state.topics.insert(
            name,
            TopicLog {
                timestamp_type,
                partitions: vec![Vec::new(); partitions],
            },
        );
        Ok(())
    }

    /// Appends one record, choosing a partition when the record does not name one.
    pub fn append(&self, record: OutboundRecord) -> Result<RecordMetadata, Error> {
        let mut state = self.inner.lock()?;
        let log = state.topics.get_mut(&record.topic).ok_or_else(|| {
            Error::new(ErrorKind::Broker)
                .with_message("unknown topic or partition")
                .with_topic(record.topic.clone())
        })?;
        let partition_count = log.partitions.len();
        if partition_count == 0 {
            return Err(Error::new(ErrorKind::Broker)
                .with_message("topic has no partitions")
                .with_topic(record.topic));
        }

        let partition = match record.partition {
            Some(partition) if partition >= 0 && (partition as usize) < partition_count => {
                partition as usize
            }
            Some(partition) => {
                return Err(Error::new(ErrorKind::Broker)
                    .with_message("unknown topic or partition")
                    .with_topic(record.topic)
                    .with_partition(partition));
            }
            None => match &record.key {
                Some(key) => (murmur2(key.as_bytes(), KEY_HASH_SEED) & 0x7fff_ffff) as usize
                    % partition_count,
                None => self.inner.round_robin.fetch_add(1, Ordering::Relaxed) % partition_count,
            },
        };

        let timestamp = match (log.timestamp_type, record.timestamp) {
            (TimestampType::LogAppendTime, _) | (_, None) => now_millis()?,
            (_, Some(timestamp)) => timestamp,
        };

        let entries = &mut log.partitions[partition];
        let offset = entries.len() as i64;
        entries.push(StoredRecord {
            timestamp,
            key: record.key,
            value: record.value,
            headers: record.headers,
        });
        drop(state);
        self.inner.appended.notify_all();

        tracing::debug!(topic = %record.topic, partition, offset, "appended record");
        Ok(RecordMetadata {
            topic: record.topic,
            partition: partition as i32,
            offset: Some(offset),
            timestamp: Some(timestamp),
        })
    }

    /// Makes every subsequent write-handle close report a failure.
    pub fn set_close_failure(&self, fail: bool) {
        self.inner.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn open_read_handles(&self) -> usize {
        self.inner.open_read_handles.load(Ordering::SeqCst)
    }

    pub fn open_write_handles(&self) -> usize {
        self.inner.open_write_handles.load(Ordering::SeqCst)
    }

    pub fn closed_write_handles(&self) -> usize {
        self.inner.closed_write_handles.load(Ordering::SeqCst)
    }
}

impl HandleFactory for MemoryBroker {
    fn create_read_handle(&self, max_poll_records: usize) -> Result<Box<dyn ReadHandle>, Error> {
        if max_poll_records == 0 {
            return Err(Error::new(ErrorKind::Usage).with_message("max poll records must be positive"));
        }
        self.inner.open_read_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryReadHandle {
            broker: Arc::clone(&self.inner),
            max_poll_records,
            positions: BTreeMap::new(),
        }))
    }

    fn create_write_handle(&self) -> Result<Arc<dyn WriteHandle>, Error> {
        self.inner.open_write_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryWriteHandle {
            broker: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct MemoryReadHandle {
    broker: Arc<BrokerInner>,
    max_poll_records: usize,
    positions: BTreeMap<TopicPartition, i64>,
}

impl MemoryReadHandle {
    fn ensure_assigned(&self, partition: &TopicPartition) -> Result<(), Error> {
        if self.positions.contains_key(partition) {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::Usage)
                .with_message("partition is not assigned to this handle")
                .with_topic(partition.topic.clone())
                .with_partition(partition.partition))
        }
    }

    fn collect(&self, state: &BrokerState) -> Vec<RawRecord> {
        let mut out = Vec::new();
        for (tp, position) in &self.positions {
            let Some(log) = state.topics.get(&tp.topic) else {
                continue;
            };
            let Some(entries) = usize::try_from(tp.partition)
                .ok()
                .and_then(|index| log.partitions.get(index))
            else {
                continue;
            };
            let start = (*position).max(0) as usize;
            for (index, entry) in entries.iter().enumerate().skip(start) {
                if out.len() >= self.max_poll_records {
                    return out;
                }
                out.push(RawRecord {
                    topic: tp.topic.clone(),
                    partition: tp.partition,
                    offset: index as i64,
                    timestamp: entry.timestamp,
                    timestamp_type: log.timestamp_type,
                    key: entry.key.clone(),
                    value: entry.value.clone(),
                    headers: entry.headers.clone(),
                });
            }
        }
        out
    }
}

fn partition_len(state: &BrokerState, tp: &TopicPartition) -> Result<i64, Error> {
    state
        .topics
        .get(&tp.topic)
        .and_then(|log| {
            usize::try_from(tp.partition)
                .ok()
                .and_then(|index| log.partitions.get(index))
        })
        .map(|entries| entries.len() as i64)
        .ok_or_else(|| {
            Error::new(ErrorKind::Broker)
                .with_message("unknown topic or partition")
                .with_topic(tp.topic.clone())
                .with_partition(tp.partition)
        })
}

impl ReadHandle for MemoryReadHandle {
    fn partitions_for(&mut self, topic: &str) -> Result<Vec<PartitionInfo>, Error> {
        let state = self.broker.lock()?;
        let count = state
            .topics
            .get(topic)
            .map(|log| log.partitions.len())
            .unwrap_or(0);
        Ok((0..count)
            .map(|partition| PartitionInfo {
                topic: topic.to_string(),
                partition: partition as i32,
            })
            .collect())
    }

    fn assign(&mut self, partitions: &[TopicPartition]) -> Result<(), Error> {
        self.positions = partitions.iter().map(|tp| (tp.clone(), 0)).collect();
        Ok(())
    }

    fn seek(&mut self, partition: &TopicPartition, offset: i64) -> Result<(), Error> {
        self.ensure_assigned(partition)?;
        if offset < 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("seek offset must not be negative")
                .with_offset(offset));
        }
        self.positions.insert(partition.clone(), offset);
        Ok(())
    }

    fn seek_to_end(&mut self, partitions: &[TopicPartition]) -> Result<(), Error> {
        let state = self.broker.lock()?;
        let mut ends = Vec::with_capacity(partitions.len());
        for tp in partitions {
            self.ensure_assigned(tp)?;
            ends.push((tp.clone(), partition_len(&state, tp)?));
        }
        drop(state);
        self.positions.extend(ends);
        Ok(())
    }

    fn offsets_for_times(
        &mut self,
        query: &BTreeMap<TopicPartition, i64>,
    ) -> Result<BTreeMap<TopicPartition, Option<i64>>, Error> {
        let state = self.broker.lock()?;
        let mut out = BTreeMap::new();
        for (tp, target) in query {
            partition_len(&state, tp)?;
            let found = state
                .topics
                .get(&tp.topic)
                .and_then(|log| log.partitions.get(tp.partition as usize))
                .and_then(|entries| entries.iter().position(|entry| entry.timestamp >= *target))
                .map(|index| index as i64);
            out.insert(tp.clone(), found);
        }
        Ok(out)
    }

    fn end_offsets(
        &mut self,
        partitions: &[TopicPartition],
    ) -> Result<BTreeMap<TopicPartition, i64>, Error> {
        let state = self.broker.lock()?;
        partitions
            .iter()
            .map(|tp| partition_len(&state, tp).map(|end| (tp.clone(), end)))
            .collect()
    }

    fn poll(&mut self, timeout: Duration) -> Result<Vec<RawRecord>, Error> {
        if self.positions.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("no partitions assigned"));
        }
        let deadline = Instant::now() + timeout;
        let mut state = self.broker.lock()?;
        let batch = loop {
            let batch = self.collect(&state);
            let now = Instant::now();
            if !batch.is_empty() || now >= deadline {
                break batch;
            }
            state = self
                .broker
                .appended
                .wait_timeout(state, deadline - now)
                .map_err(|_| Error::new(ErrorKind::Internal).with_message("broker state poisoned"))?
                .0;
        };
        drop(state);

        for record in &batch {
            let tp = TopicPartition::new(record.topic.clone(), record.partition);
            self.positions.insert(tp, record.offset + 1);
        }
        Ok(batch)
    }
}

impl Drop for MemoryReadHandle {
    fn drop(&mut self) {
        self.broker.open_read_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MemoryWriteHandle {
    broker: MemoryBroker,
    closed: AtomicBool,
}

impl WriteHandle for MemoryWriteHandle {
    fn send(&self, record: OutboundRecord, on_complete: SendCallback) {
        if self.closed.load(Ordering::SeqCst) {
            on_complete(Err(Error::new(ErrorKind::Broker)
                .with_message("write handle is closed")
                .with_topic(record.topic)));
            return;
        }
        on_complete(self.broker.append(record));
    }

    fn close(&self, _grace: Duration) -> Result<(), Error> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let inner = &self.broker.inner;
            inner.open_write_handles.fetch_sub(1, Ordering::SeqCst);
            inner.closed_write_handles.fetch_add(1, Ordering::SeqCst);
        }
        if self.broker.inner.fail_close.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Io).with_message("failed to flush write handle"));
        }
        Ok(())
    }
}

impl Drop for MemoryWriteHandle {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            self.broker
                .inner
                .open_write_handles
                .fetch_sub(1, Ordering::SeqCst);
        }
    }
}
