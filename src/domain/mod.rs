//! Domain layer types and invariants.

pub mod blob;
pub mod entities;
pub mod error;
pub mod normalize;
pub mod request;
pub mod types;
