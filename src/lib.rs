//! Purpose: Library crate behind the `recordops` admin server.
//! Exports: `api` (record reads/writes), `broker` (handle capabilities), `serve` (HTTP).
//! Role: Bounded topic inspection and single-record publishing over a broker client.
//! Invariants: Every read and write owns its broker handle for the duration of the call.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod broker;
pub mod core;
pub mod serve;
