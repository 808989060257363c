//! Purpose: Define the public record operations for topic inspection and test publishing.
//! Exports: Reader/writer entry points, request/response types, and field selection.
//! Role: Public, additive-only surface consumed by the HTTP layer and embedders.
//! Invariants: Reader and writer share no mutable state; each call owns its handle.
//! Invariants: Handle factories are passed in explicitly, never looked up globally.

mod position;
mod projection;
mod reader;
mod record;
mod writer;

pub use crate::core::error::{Error, ErrorKind, to_exit_code};
pub use position::{Position, StartFrom, apply_positions, resolve_positions, target_partitions};
pub use projection::{Field, Include, project};
pub use reader::{DEFAULT_POLL_TIMEOUT, RecordReader};
pub use record::{PagedResponse, ReadRequest, Record, WriteRequest, WriteResult};
pub use writer::{PendingWrite, RecordWriter};
