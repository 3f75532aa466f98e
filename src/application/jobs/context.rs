use std::fmt;

use crate::{application::reconcile::Reconciler, domain::types::Family};

/// What a scheduled worker sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepTarget {
    Tag(Family),
    Blobs,
}

impl SweepTarget {
    pub fn worker_name(self) -> String {
        match self {
            SweepTarget::Tag(family) => format!("tag-sweep-{}", family.prefix()),
            SweepTarget::Blobs => "blob-sweep".to_string(),
        }
    }
}

impl fmt::Display for SweepTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepTarget::Tag(family) => f.write_str(&family.tag()),
            SweepTarget::Blobs => f.write_str("blobs"),
        }
    }
}

/// Data handed to each sweep worker: the shared reconciler bound to one target.
#[derive(Clone)]
pub struct SweepContext {
    pub reconciler: Reconciler,
    pub target: SweepTarget,
}
