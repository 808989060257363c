//! Purpose: Publish a single record and correlate the broker acknowledgment.
//! Exports: `RecordWriter`, `PendingWrite`.
//! Role: Asynchronous write path used by the HTTP layer and library callers.
//! Invariants: Send failures surface only through `PendingWrite`, never from `write`.
//! Invariants: The write handle is closed with zero grace before `PendingWrite` resolves.
//! Invariants: Close failures are logged and never replace the send outcome.
#![allow(clippy::result_large_err)]

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;

use super::record::{Record, WriteRequest, WriteResult};
use crate::broker::{HandleFactory, Header, OutboundRecord, RecordMetadata, WriteHandle};
use crate::core::error::{Error, ErrorKind};
use crate::core::timestamp::{format_millis, parse_optional_millis};

#[derive(Clone)]
pub struct RecordWriter {
    factory: Arc<dyn HandleFactory>,
}

/// Resolves once with the broker outcome of one `RecordWriter::write`.
#[derive(Debug)]
pub struct PendingWrite {
    rx: oneshot::Receiver<Result<WriteResult, Error>>,
}

impl Future for PendingWrite {
    type Output = Result<WriteResult, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(Error::new(ErrorKind::Broker)
                    .with_message("write handle dropped the send without completing it"))
            })
        })
    }
}

impl RecordWriter {
    pub fn new(factory: Arc<dyn HandleFactory>) -> Self {
        Self { factory }
    }

    /// Submits `request`; only input validation and handle creation fail synchronously.
    pub fn write(&self, request: WriteRequest) -> Result<PendingWrite, Error> {
        let timestamp = parse_optional_millis(request.timestamp.as_deref())?;
        let outbound = OutboundRecord {
            topic: request.topic.clone(),
            partition: request.partition,
            timestamp,
            key: request.key.clone(),
            value: Some(request.value.clone()),
            headers: wire_headers(&request.headers),
        };

        let handle = self.factory.create_write_handle()?;
        let teardown = Arc::clone(&handle);
        let (tx, rx) = oneshot::channel();
        tracing::debug!(topic = %request.topic, partition = ?request.partition, "sending record");

        handle.send(
            outbound,
            Box::new(move |outcome| {
                let result = match outcome {
                    Ok(metadata) => Ok(write_result(metadata, request)),
                    Err(err) => {
                        let topic = request.topic;
                        Err(err
                            .caused(ErrorKind::Broker, "failed to send record")
                            .with_topic(topic))
                    }
                };
                close_quietly(teardown.as_ref());
                let _ = tx.send(result);
            }),
        );
        Ok(PendingWrite { rx })
    }
}

fn wire_headers(headers: &BTreeMap<String, String>) -> Vec<Header> {
    headers
        .iter()
        .map(|(key, value)| Header {
            key: key.clone(),
            value: Some(value.as_bytes().to_vec()),
        })
        .collect()
}

fn write_result(metadata: RecordMetadata, request: WriteRequest) -> WriteResult {
    Record {
        partition: Some(metadata.partition),
        offset: metadata.offset,
        timestamp: metadata.timestamp.map(format_millis),
        timestamp_type: None,
        key: request.key,
        value: Some(request.value),
        headers: Some(request.headers),
    }
}

fn close_quietly(handle: &dyn WriteHandle) {
    if let Err(err) = handle.close(Duration::ZERO) {
        tracing::warn!(error = %err, "failed to close write handle");
    }
}
