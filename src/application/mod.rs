//! Resolution pipeline services.

pub mod blobs;
pub mod context;
pub mod error;
pub mod jobs;
pub mod origin;
pub mod reconcile;
pub mod repos;
pub mod resolver;
