// Core modules shared by the read and write paths: error modeling and timestamps.
pub mod error;
pub mod timestamp;
