use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

use mayday_core::job::JobDefinition;

use crate::runtime::Runtime;

/// One job plus its next scheduled fire instant.
struct ScheduledJob {
    def: Arc<JobDefinition>,
    next_fire: DateTime<Utc>,
}

/// What to do with a due (or not yet due) job on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickAction {
    /// Not due yet.
    Wait,
    /// Due and idle: hand to the runtime, advance the boundary.
    Fire,
    /// Due but still running, inside the jitter window: hold the boundary
    /// so the job fires immediately once the prior run completes.
    Defer,
    /// Due but still running, past the jitter window: skip this boundary.
    Skip,
}

/// Pure per-job tick decision; the jitter policy lives here.
fn plan(
    now: DateTime<Utc>,
    next_fire: DateTime<Utc>,
    jitter: Option<chrono::Duration>,
    running: bool,
) -> TickAction {
    if now < next_fire {
        return TickAction::Wait;
    }
    if !running {
        return TickAction::Fire;
    }
    match jitter {
        Some(j) if now <= next_fire + j => TickAction::Defer,
        _ => TickAction::Skip,
    }
}

/// Owns the active job set and the tick loop.
///
/// Ticks on a short fixed period, fires due jobs through the runtime, and
/// retires jobs whose window has closed. The loop itself never blocks on
/// job I/O and never stops because one job failed.
pub struct Scheduler {
    tick: Duration,
    jobs: Vec<ScheduledJob>,
    runtime: Arc<Runtime>,
}

impl Scheduler {
    /// Seed next-fire instants for every definition; jobs already past
    /// their end bound retire immediately.
    pub fn new(defs: Vec<JobDefinition>, runtime: Arc<Runtime>, tick: Duration) -> Self {
        let now = Utc::now();
        let mut jobs = Vec::with_capacity(defs.len());
        for def in defs {
            match def.recurrence.next_fire_after(now) {
                Some(next_fire) => {
                    debug!(rule = %def.name, next = %next_fire, "scheduled");
                    jobs.push(ScheduledJob { def: Arc::new(def), next_fire });
                }
                None => info!(rule = %def.name, "window already closed, retired at startup"),
            }
        }
        Self { tick, jobs, runtime }
    }

    /// Run until the shutdown signal flips.
    pub fn spawn(mut self, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move {
            let mut tick = interval(self.tick);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        self.on_tick(Utc::now());
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("scheduler stopping");
                            break;
                        }
                    }
                }
            }
            Ok(())
        })
    }

    fn on_tick(&mut self, now: DateTime<Utc>) {
        let runtime = &self.runtime;
        self.jobs.retain_mut(|job| {
            let action = plan(
                now,
                job.next_fire,
                job.def.recurrence.jitter(),
                runtime.is_running(&job.def.name),
            );
            match action {
                TickAction::Wait => true,
                TickAction::Defer => {
                    debug!(rule = %job.def.name, "still running, deferring within jitter window");
                    true
                }
                TickAction::Skip => {
                    warn!(rule = %job.def.name, "still running, skipped");
                    advance(job, now)
                }
                TickAction::Fire => {
                    if runtime.execute(Arc::clone(&job.def)) {
                        debug!(rule = %job.def.name, "fired");
                    }
                    advance(job, now)
                }
            }
        });
    }

    #[cfg(test)]
    fn job_names(&self) -> Vec<String> {
        self.jobs.iter().map(|j| j.def.name.clone()).collect()
    }

    #[cfg(test)]
    fn next_fire_of(&self, name: &str) -> Option<DateTime<Utc>> {
        self.jobs.iter().find(|j| j.def.name == name).map(|j| j.next_fire)
    }
}

// Recompute the boundary; false retires the job.
fn advance(job: &mut ScheduledJob, now: DateTime<Utc>) -> bool {
    match job.def.recurrence.next_fire_after(now) {
        Some(next_fire) => {
            job.next_fire = next_fire;
            true
        }
        None => {
            info!(rule = %job.def.name, "window closed, retired");
            false
        }
    }
}
