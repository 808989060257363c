// Target partition selection and per-partition starting positions for a read.
use std::collections::BTreeMap;

use crate::broker::{PartitionInfo, ReadHandle, TopicPartition};
use crate::core::error::{Error, ErrorKind};

/// Where a read begins; a timestamp wins over an offset when both are given.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartFrom {
    Assigned,
    Offset(i64),
    Timestamp(i64),
}

impl StartFrom {
    pub fn new(offset: Option<i64>, timestamp_millis: Option<i64>) -> Self {
        match (timestamp_millis, offset) {
            (Some(millis), _) => StartFrom::Timestamp(millis),
            (None, Some(offset)) => StartFrom::Offset(offset),
            (None, None) => StartFrom::Assigned,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Position {
    Offset(i64),
    End,
}

pub fn target_partitions(
    topic: &str,
    partitions: &[PartitionInfo],
    filter: Option<i32>,
) -> Result<Vec<TopicPartition>, Error> {
    if partitions.is_empty() {
        return Err(Error::new(ErrorKind::NoSuchTopic)
            .with_message("no such topic")
            .with_topic(topic));
    }

    let targets: Vec<TopicPartition> = partitions
        .iter()
        .filter(|info| filter.is_none_or(|wanted| wanted == info.partition))
        .map(|info| TopicPartition::new(info.topic.clone(), info.partition))
        .collect();

    if targets.is_empty() {
        // Only reachable with a filter: an unfiltered read of a non-empty topic keeps all.
        let requested = filter.unwrap_or_default();
        return Err(Error::new(ErrorKind::NoSuchPartition)
            .with_message(format!("no such partition for topic {topic}: {requested}"))
            .with_topic(topic)
            .with_partition(requested));
    }
    Ok(targets)
}

/// Computes the seek for each target; `StartFrom::Assigned` leaves positions untouched.
pub fn resolve_positions(
    handle: &mut dyn ReadHandle,
    targets: &[TopicPartition],
    start: StartFrom,
) -> Result<Vec<(TopicPartition, Position)>, Error> {
    match start {
        StartFrom::Assigned => Ok(Vec::new()),
        StartFrom::Timestamp(millis) => {
            let query: BTreeMap<TopicPartition, i64> =
                targets.iter().map(|tp| (tp.clone(), millis)).collect();
            let found = handle.offsets_for_times(&query)?;
            Ok(targets
                .iter()
                .map(|tp| {
                    let position = match found.get(tp).copied().flatten() {
                        Some(offset) => Position::Offset(offset),
                        None => Position::End,
                    };
                    (tp.clone(), position)
                })
                .collect())
        }
        StartFrom::Offset(offset) => {
            let ends = handle.end_offsets(targets)?;
            targets
                .iter()
                .map(|tp| {
                    let end = ends.get(tp).copied().ok_or_else(|| {
                        Error::new(ErrorKind::Broker)
                            .with_message("broker did not report an end offset")
                            .with_topic(tp.topic.clone())
                            .with_partition(tp.partition)
                    })?;
                    Ok((tp.clone(), Position::Offset(offset.min(end))))
                })
                .collect()
        }
    }
}

pub fn apply_positions(
    handle: &mut dyn ReadHandle,
    positions: &[(TopicPartition, Position)],
) -> Result<(), Error> {
    for (tp, position) in positions {
        match position {
            Position::Offset(offset) => handle.seek(tp, *offset)?,
            Position::End => handle.seek_to_end(std::slice::from_ref(tp))?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Position, StartFrom, resolve_positions, target_partitions};
    use crate::broker::memory::MemoryBroker;
    use crate::broker::{
        HandleFactory, OutboundRecord, PartitionInfo, TimestampType, TopicPartition,
    };
    use crate::core::error::ErrorKind;

    fn infos(topic: &str, count: i32) -> Vec<PartitionInfo> {
        (0..count)
            .map(|partition| PartitionInfo {
                topic: topic.to_string(),
                partition,
            })
            .collect()
    }

    fn seeded(timestamps: &[i64]) -> MemoryBroker {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 1, TimestampType::CreateTime).expect("create");
        for ts in timestamps {
            broker
                .append(OutboundRecord {
                    topic: "t".to_string(),
                    partition: Some(0),
                    timestamp: Some(*ts),
                    key: None,
                    value: Some("v".to_string()),
                    headers: Vec::new(),
                })
                .expect("append");
        }
        broker
    }

    #[test]
    fn timestamp_takes_precedence_over_offset() {
        assert_eq!(StartFrom::new(Some(3), Some(10)), StartFrom::Timestamp(10));
        assert_eq!(StartFrom::new(Some(3), None), StartFrom::Offset(3));
        assert_eq!(StartFrom::new(None, None), StartFrom::Assigned);
    }

    #[test]
    fn empty_topic_is_no_such_topic_even_with_filter() {
        let err = target_partitions("t", &[], Some(0)).expect_err("no topic");
        assert_eq!(err.kind(), ErrorKind::NoSuchTopic);
    }

    #[test]
    fn unmatched_filter_is_no_such_partition() {
        let err = target_partitions("t", &infos("t", 3), Some(5)).expect_err("no partition");
        assert_eq!(err.kind(), ErrorKind::NoSuchPartition);
        assert_eq!(err.topic(), Some("t"));
        assert_eq!(err.partition(), Some(5));
        assert!(err.message().expect("message").contains("5"));
    }

    #[test]
    fn filter_selects_single_partition() {
        let targets = target_partitions("t", &infos("t", 3), Some(1)).expect("targets");
        assert_eq!(targets, vec![TopicPartition::new("t", 1)]);
        let all = target_partitions("t", &infos("t", 3), None).expect("targets");
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn offset_past_end_clamps_to_end() {
        let broker = seeded(&[1, 2, 3]);
        let mut handle = broker.create_read_handle(10).expect("handle");
        let tp = TopicPartition::new("t", 0);
        let positions =
            resolve_positions(handle.as_mut(), &[tp.clone()], StartFrom::Offset(5)).expect("resolve");
        assert_eq!(positions, vec![(tp.clone(), Position::Offset(3))]);

        let positions =
            resolve_positions(handle.as_mut(), &[tp.clone()], StartFrom::Offset(3)).expect("resolve");
        assert_eq!(positions, vec![(tp, Position::Offset(3))]);
    }

    #[test]
    fn timestamp_beyond_last_record_moves_to_end() {
        let broker = seeded(&[100, 200]);
        let mut handle = broker.create_read_handle(10).expect("handle");
        let tp = TopicPartition::new("t", 0);
        let positions = resolve_positions(handle.as_mut(), &[tp.clone()], StartFrom::Timestamp(150))
            .expect("resolve");
        assert_eq!(positions, vec![(tp.clone(), Position::Offset(1))]);

        let positions = resolve_positions(handle.as_mut(), &[tp.clone()], StartFrom::Timestamp(999))
            .expect("resolve");
        assert_eq!(positions, vec![(tp, Position::End)]);
    }

    #[test]
    fn assigned_start_issues_no_seeks() {
        let broker = seeded(&[]);
        let mut handle = broker.create_read_handle(10).expect("handle");
        let positions = resolve_positions(
            handle.as_mut(),
            &[TopicPartition::new("t", 0)],
            StartFrom::Assigned,
        )
        .expect("resolve");
        assert!(positions.is_empty());
    }
}
