//! Expiry scheduling seam.
//!
//! Activation schedules a deferred revocation at the request's end
//! time. The trait exists so tests can drive time deterministically and
//! so embedders can swap in their own timer wheel. Scheduled callbacks
//! are best-effort: durability comes from the startup reconciliation
//! sweep, not from the scheduler surviving restarts.

use std::future::Future;
use std::pin::Pin;

use breakglass_core::now_millis;

pub type ScheduledTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs a task at (or after) an absolute wall-clock time.
pub trait Scheduler: Send + Sync {
    /// Schedule `task` to run at `at_ms` (Unix ms). If the time is
    /// already past, the task runs immediately.
    fn schedule_at(&self, at_ms: i64, task: ScheduledTask);
}

/// Scheduler backed by the tokio timer.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_at(&self, at_ms: i64, task: ScheduledTask) {
        let delay_ms = (at_ms - now_millis()).max(0) as u64;
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            task.await;
        });
    }
}

/// Scheduler that drops every task. For tests that drive expiry through
/// the reconciliation sweep instead of timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

impl Scheduler for NoopScheduler {
    fn schedule_at(&self, _at_ms: i64, _task: ScheduledTask) {}
}
