use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Which counter a finished iteration lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Sent,
    Error,
}

/// Run-wide counters shared by every worker.
///
/// Each counter is only ever moved by a single atomic add. [`snapshot`] reads
/// the two counters independently, so a snapshot taken mid-run may be one
/// increment apart between fields; it is for reporting only.
///
/// [`snapshot`]: StatsAggregator::snapshot
#[derive(Debug)]
pub struct StatsAggregator {
    sent: AtomicU64,
    errors: AtomicU64,
    started: Instant,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(started: Instant) -> Self {
        Self {
            sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started,
        }
    }

    /// Bump one counter and return its new value.
    pub fn increment(&self, kind: OutcomeKind) -> u64 {
        match kind {
            OutcomeKind::Sent => {
                metrics::counter!("stress_tx_sent_total").increment(1);
                self.sent.fetch_add(1, Ordering::Relaxed) + 1
            }
            OutcomeKind::Error => {
                metrics::counter!("stress_tx_errors_total").increment(1);
                self.errors.fetch_add(1, Ordering::Relaxed) + 1
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub sent: u64,
    pub errors: u64,
    pub elapsed: Duration,
}

impl StatsSnapshot {
    pub fn attempted(&self) -> u64 {
        self.sent + self.errors
    }

    /// Accepted submissions per second so far.
    pub fn rate(&self) -> f64 {
        rate_per_sec(self.sent, self.elapsed)
    }

    pub fn deviation_pct(&self, target_tps: u64) -> f64 {
        deviation_pct(self.rate(), target_tps)
    }
}

pub fn rate_per_sec(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    count as f64 / secs
}

/// Signed percentage difference between an achieved rate and the target.
pub fn deviation_pct(rate: f64, target_tps: u64) -> f64 {
    if target_tps == 0 {
        return 0.0;
    }
    let target = target_tps as f64;
    (rate - target) / target * 100.0
}
