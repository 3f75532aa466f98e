mod context;
mod sweeps;

pub use context::{SweepContext, SweepTarget};
pub use sweeps::{
    DEFAULT_BLOB_SCHEDULE, DEFAULT_TAG_SCHEDULE, ScheduleError, ScheduledSweep, SweepTick,
    process_sweep_job, sweep_monitor, sweep_plan,
};
