//! Infrastructure adapters and runtime bootstrap.

pub mod blobs;
pub mod db;
pub mod error;
pub mod http;
pub mod memory;
pub mod origin;
pub mod telemetry;
