use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::stats::{StatsAggregator, StatsSnapshot};

/// One console progress sample.
#[derive(Debug, Clone, Copy)]
pub struct ProgressLine {
    pub snapshot: StatsSnapshot,
    pub planned: u64,
    pub target_tps: u64,
}

impl fmt::Display for ProgressLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Progress: {}/{} txs | Elapsed: {:.2}s | TPS: {:.2} | Target: {} | Deviation: {:.1}% | Errors: {}",
            self.snapshot.sent,
            self.planned,
            self.snapshot.elapsed.as_secs_f64(),
            self.snapshot.rate(),
            self.target_tps,
            self.snapshot.deviation_pct(self.target_tps),
            self.snapshot.errors,
        )
    }
}

/// Periodically prints a [`ProgressLine`] until cancelled.
pub struct ProgressReporter {
    stats: Arc<StatsAggregator>,
    planned: u64,
    target_tps: u64,
    period: Duration,
}

impl ProgressReporter {
    pub fn new(stats: Arc<StatsAggregator>, planned: u64, target_tps: u64, period: Duration) -> Self {
        Self {
            stats,
            planned,
            target_tps,
            period,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<u64> {
        tokio::spawn(self.run(cancel))
    }

    /// Tick until `cancel` fires; returns how many lines were printed.
    pub async fn run(self, cancel: CancellationToken) -> u64 {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut printed = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    println!("{}", self.sample());
                    printed += 1;
                }
            }
        }

        debug!(printed, "progress reporter stopped");
        printed
    }

    pub fn sample(&self) -> ProgressLine {
        ProgressLine {
            snapshot: self.stats.snapshot(),
            planned: self.planned,
            target_tps: self.target_tps,
        }
    }
}
