//! Purpose: Bounded, filterable reads of topic records through a request-scoped handle.
//! Exports: `RecordReader`, `DEFAULT_POLL_TIMEOUT`.
//! Role: Synchronous read path used by the HTTP layer and library callers.
//! Invariants: Exactly one poll per read; an empty poll is an empty page, not an error.
//! Invariants: Input and resolution errors abort before polling; no partial pages.
//! Invariants: The read handle is dropped before `read` returns on every path.
#![allow(clippy::result_large_err)]

use std::sync::Arc;
use std::time::Duration;

use super::position::{StartFrom, apply_positions, resolve_positions, target_partitions};
use super::projection::project;
use super::record::{PagedResponse, ReadRequest, Record};
use crate::broker::HandleFactory;
use crate::core::error::{Error, ErrorKind};
use crate::core::timestamp::parse_optional_millis;

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct RecordReader {
    factory: Arc<dyn HandleFactory>,
    poll_timeout: Duration,
}

impl RecordReader {
    pub fn new(factory: Arc<dyn HandleFactory>) -> Self {
        Self {
            factory,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    pub fn read(&self, request: &ReadRequest) -> Result<PagedResponse<Record>, Error> {
        validate_limit(request)?;
        let timestamp = parse_optional_millis(request.timestamp.as_deref())?;
        let start = StartFrom::new(request.offset, timestamp);

        let mut handle = self.factory.create_read_handle(request.limit)?;
        let partitions = handle.partitions_for(&request.topic)?;
        let targets = target_partitions(&request.topic, &partitions, request.partition)?;
        validate_offset(request)?;
        handle.assign(&targets)?;

        let positions = resolve_positions(handle.as_mut(), &targets, start)?;
        apply_positions(handle.as_mut(), &positions)?;
        tracing::debug!(
            topic = %request.topic,
            partitions = targets.len(),
            start = ?start,
            limit = request.limit,
            "polling records"
        );

        let polled = handle.poll(self.poll_timeout)?;
        drop(handle);

        let items: Vec<Record> = polled
            .iter()
            .map(|raw| project(raw, &request.include))
            .collect();
        tracing::debug!(topic = %request.topic, count = items.len(), "read records");
        Ok(PagedResponse::for_items(items))
    }
}

fn validate_limit(request: &ReadRequest) -> Result<(), Error> {
    if request.limit == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("limit must be greater than zero")
            .with_topic(request.topic.clone()));
    }
    Ok(())
}

// Runs after partition discovery so a missing topic wins over a bad offset.
fn validate_offset(request: &ReadRequest) -> Result<(), Error> {
    if let Some(offset) = request.offset {
        if offset < 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("offset must not be negative")
                .with_topic(request.topic.clone())
                .with_offset(offset));
        }
    }
    Ok(())
}
