//! Interval-aligned scheduling.
//!
//! Ticks sit on the interval grid counted from the Unix epoch, so with a
//! ten minute interval captures happen at :00, :10, :20 and so on.  One
//! capture runs at a time; a capture that overruns the interval delays the
//! next tick instead of overlapping it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeDelta, Utc};
use tracing::{info, warn};

use ipeye_common::config::CaptureConfig;

use crate::error::{CaptureError, Severity};
use crate::job::{CaptureJob, CaptureResult};

/// Longest single sleep while waiting, so shutdown is noticed promptly.
const WAIT_SLICE: Duration = Duration::from_secs(1);

/// Round `t` down to a multiple of `interval` since the epoch.
pub fn truncate(t: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let step = interval.as_nanos() as i128;
    if step == 0 {
        return t;
    }
    let nanos = i128::from(t.timestamp()) * 1_000_000_000 + i128::from(t.timestamp_subsec_nanos());
    let excess = nanos.rem_euclid(step);
    t - TimeDelta::nanoseconds(excess as i64)
}

/// The fixed-period tick sequence.
#[derive(Debug, Clone)]
pub struct Schedule {
    interval: Duration,
    step: TimeDelta,
    next: DateTime<Utc>,
}

impl Schedule {
    /// The first tick is the boundary following `now + interval`, truncated.
    pub fn new(now: DateTime<Utc>, interval: Duration) -> Result<Self> {
        let step = TimeDelta::from_std(interval)
            .with_context(|| format!("Interval {interval:?} out of range"))?;
        let first = now
            .checked_add_signed(step)
            .with_context(|| format!("Interval {interval:?} out of range"))?;
        Ok(Self {
            interval,
            step,
            next: truncate(first, interval),
        })
    }

    pub fn next_tick(&self) -> DateTime<Utc> {
        self.next
    }

    /// Move past the tick that just ran.
    ///
    /// Returns the number of boundaries dropped because the last capture
    /// overran by more than one interval; only the latest missed one is
    /// kept, and it fires immediately.
    pub fn advance(&mut self, now: DateTime<Utc>) -> u64 {
        self.next += self.step;
        if now < self.next + self.step {
            return 0;
        }
        let latest = truncate(now, self.interval);
        let dropped = (latest - self.next).num_nanoseconds().unwrap_or(i64::MAX) as u128
            / self.interval.as_nanos().max(1);
        self.next = latest;
        dropped as u64
    }
}

/// Tracks consecutive hard failures and decides when to give up.
#[derive(Debug)]
pub struct FailurePolicy {
    limit: u32,
    consecutive: u32,
}

impl FailurePolicy {
    /// `limit == 0` never gives up.
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            consecutive: 0,
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// Account for one capture; errors once the limit is reached.
    pub fn record(&mut self, result: &CaptureResult) -> Result<()> {
        match result.error.as_ref().map(CaptureError::severity) {
            Some(Severity::Hard) => self.consecutive += 1,
            _ => self.consecutive = 0,
        }
        if self.limit > 0 && self.consecutive >= self.limit {
            anyhow::bail!(
                "{} consecutive hard failures, last at {}: {}",
                self.consecutive,
                result.tick,
                result
                    .error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default()
            );
        }
        Ok(())
    }
}

/// Run captures forever, or until `shutdown` is set.
pub fn run(config: &CaptureConfig, job: &CaptureJob<'_>, shutdown: &AtomicBool) -> Result<()> {
    let mut schedule = Schedule::new(Utc::now(), config.interval)?;
    let mut policy = FailurePolicy::new(config.max_consecutive_failures);

    loop {
        let tick = schedule.next_tick();
        info!("Waiting until {}", format_tick(tick));
        if !wait_until(tick, shutdown) {
            break;
        }

        let result = job.run(tick.with_timezone(&Local).naive_local());
        policy.record(&result)?;
        if policy.consecutive() > 0 {
            warn!("{} consecutive hard failure(s)", policy.consecutive());
        }

        let dropped = schedule.advance(Utc::now());
        if dropped > 0 {
            warn!("Capture overran the interval, dropped {dropped} tick(s)");
        }
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
    }

    info!("Scheduler stopped");
    Ok(())
}

/// Sleep until `deadline`.  Returns `false` if shutdown was requested first.
fn wait_until(deadline: DateTime<Utc>, shutdown: &AtomicBool) -> bool {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        match (deadline - Utc::now()).to_std() {
            Ok(remaining) if !remaining.is_zero() => std::thread::sleep(remaining.min(WAIT_SLICE)),
            _ => return true,
        }
    }
}

fn format_tick(tick: DateTime<Utc>) -> String {
    tick.with_timezone(&Local)
        .format("%a %b %d %H:%M:%S %z %Y")
        .to_string()
}
