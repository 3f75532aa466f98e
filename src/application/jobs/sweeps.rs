//! Cron-driven reconciliation workers.
//!
//! Each `(target, schedule)` pair becomes an independent apalis worker backed
//! by a [`CronStream`]; a slow sweep never delays another target.

use std::str::FromStr;

use apalis::prelude::{Data, Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::{CronStream, Schedule};
use thiserror::Error;
use tracing::info;

use super::context::{SweepContext, SweepTarget};
use crate::{application::reconcile::Reconciler, domain::types::Family};

/// Every 15 minutes, at second 0.
pub const DEFAULT_TAG_SCHEDULE: &str = "0 */15 * * * *";
/// Every 10 minutes, at second 0.
pub const DEFAULT_BLOB_SCHEDULE: &str = "0 */10 * * * *";

/// Marker for a cron tick; apalis-cron builds one from each tick timestamp.
#[derive(Default, Debug, Clone)]
pub struct SweepTick;

impl From<chrono::DateTime<chrono::Utc>> for SweepTick {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Debug, Error)]
#[error("invalid cron expression `{expression}`: {reason}")]
pub struct ScheduleError {
    pub expression: String,
    pub reason: String,
}

pub struct ScheduledSweep {
    pub target: SweepTarget,
    pub schedule: Schedule,
}

fn parse_schedule(expression: &str) -> Result<Schedule, ScheduleError> {
    Schedule::from_str(expression).map_err(|err| ScheduleError {
        expression: expression.to_string(),
        reason: err.to_string(),
    })
}

/// One tag sweep per listing family on `tag_schedule`, plus the blob sweep.
pub fn sweep_plan(
    tag_schedule: &str,
    blob_schedule: &str,
) -> Result<Vec<ScheduledSweep>, ScheduleError> {
    let mut plan = Family::LISTINGS
        .into_iter()
        .map(|family| {
            Ok(ScheduledSweep {
                target: SweepTarget::Tag(family),
                schedule: parse_schedule(tag_schedule)?,
            })
        })
        .collect::<Result<Vec<_>, ScheduleError>>()?;
    plan.push(ScheduledSweep {
        target: SweepTarget::Blobs,
        schedule: parse_schedule(blob_schedule)?,
    });
    Ok(plan)
}

pub async fn process_sweep_job(
    _job: SweepTick,
    ctx: Data<SweepContext>,
) -> Result<(), apalis::prelude::Error> {
    let report = match ctx.target {
        SweepTarget::Tag(family) => ctx.reconciler.sweep_tag(family).await,
        SweepTarget::Blobs => ctx.reconciler.sweep_blobs().await,
    };
    info!(
        target = "reelcache::application::jobs",
        sweep = %ctx.target,
        report = %report,
        "scheduled sweep completed"
    );
    Ok(())
}

pub fn sweep_monitor(reconciler: &Reconciler, plan: Vec<ScheduledSweep>) -> Monitor {
    plan.into_iter().fold(Monitor::new(), |monitor, sweep| {
        let worker = WorkerBuilder::new(sweep.target.worker_name())
            .data(SweepContext {
                reconciler: reconciler.clone(),
                target: sweep.target,
            })
            .backend(CronStream::new(sweep.schedule))
            .build_fn(process_sweep_job);
        monitor.register(worker)
    })
}
