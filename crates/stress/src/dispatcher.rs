//! Splits the run budget across workers, runs them with a progress reporter,
//! and turns the final counters into a [`FinalReport`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::account::{Account, Address};
use crate::client::ChainClient;
use crate::config::{RemainderPolicy, RunConfig};
use crate::errors::{Result, StressError};
use crate::reporter::ProgressReporter;
use crate::sink::{ResultSink, RunHeader};
use crate::stats::{deviation_pct, rate_per_sec, StatsAggregator};
use crate::submitter::Submitter;
use crate::transaction::Signer;
use crate::worker::{RecipientSelector, Worker, WorkerShared, WorkerSummary};

/// Per-worker iteration counts for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaPlan {
    pub total_budget: u64,
    pub quotas: Vec<u64>,
}

impl QuotaPlan {
    pub fn new(total_budget: u64, workers: usize, policy: RemainderPolicy) -> Self {
        if workers == 0 {
            return Self {
                total_budget,
                quotas: Vec::new(),
            };
        }
        let base = total_budget / workers as u64;
        let remainder = total_budget % workers as u64;
        let quotas = (0..workers as u64)
            .map(|i| match policy {
                RemainderPolicy::Distribute if i < remainder => base + 1,
                _ => base,
            })
            .collect();
        Self {
            total_budget,
            quotas,
        }
    }

    /// Iterations that will actually be attempted.
    pub fn scheduled(&self) -> u64 {
        self.quotas.iter().sum()
    }

    /// Budget lost to integer division.
    pub fn dropped(&self) -> u64 {
        self.total_budget - self.scheduled()
    }
}

#[derive(Debug, Clone)]
pub struct FinalReport {
    pub sent: u64,
    pub errors: u64,
    /// `target_tps * duration`.
    pub planned: u64,
    /// Sum of worker quotas.
    pub scheduled: u64,
    pub total_time: Duration,
    pub target_tps: u64,
    pub actual_tps: f64,
    pub deviation_pct: f64,
    pub interrupted: bool,
    /// Accepted submissions whose identifier could not be written out.
    pub unrecorded: u64,
    pub workers: Vec<WorkerSummary>,
}

impl FinalReport {
    pub fn attempted(&self) -> u64 {
        self.sent + self.errors
    }
}

impl fmt::Display for FinalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.interrupted {
            writeln!(f, "=== TEST INTERRUPTED ===")?;
        } else {
            writeln!(f, "=== TEST COMPLETE ===")?;
        }
        writeln!(f, "Total Transactions Sent: {}/{}", self.sent, self.planned)?;
        writeln!(f, "Total Errors: {}", self.errors)?;
        writeln!(f, "Total Time: {:.2} seconds", self.total_time.as_secs_f64())?;
        writeln!(f, "Target TPS: {}", self.target_tps)?;
        writeln!(f, "Actual TPS: {:.2}", self.actual_tps)?;
        write!(f, "Deviation: {:.2}%", self.deviation_pct)
    }
}

pub struct Dispatcher {
    config: Arc<RunConfig>,
    client: Arc<dyn ChainClient>,
    signer: Arc<dyn Signer>,
}

impl Dispatcher {
    pub fn new(
        config: Arc<RunConfig>,
        client: Arc<dyn ChainClient>,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            config,
            client,
            signer,
        }
    }

    pub fn plan(&self) -> QuotaPlan {
        QuotaPlan::new(
            self.config.total_budget(),
            self.config.workers,
            self.config.remainder,
        )
    }

    fn header(&self, senders: usize, recipients: usize) -> RunHeader {
        RunHeader::new(self.config.label.clone())
            .field("Senders", senders)
            .field("Workers", self.config.workers)
            .field("Recipients", recipients)
            .field("Chain ID", self.config.chain_id)
            .field("Target TPS", self.config.target_tps)
            .field("Duration", format!("{} seconds", self.config.duration_secs))
    }

    /// Run every worker to quota (or until `cancel`) and report.
    ///
    /// Only setup problems are returned as errors; individual submission
    /// failures end up in the report's error count.
    pub async fn run(
        &self,
        senders: Vec<Arc<Account>>,
        recipients: Vec<Address>,
        cancel: CancellationToken,
    ) -> Result<FinalReport> {
        self.config.validate()?;
        if senders.is_empty() {
            return Err(StressError::InvalidConfig("no sender accounts".into()));
        }
        if recipients.is_empty() {
            return Err(StressError::InvalidConfig("no recipient accounts".into()));
        }

        let header = self.header(senders.len(), recipients.len());
        let sink = Arc::new(ResultSink::create(&self.config.output, &header)?);
        let plan = self.plan();
        if plan.dropped() > 0 {
            info!(
                dropped = plan.dropped(),
                total_budget = plan.total_budget,
                workers = self.config.workers,
                "budget does not divide evenly; remainder dropped"
            );
        }

        let stats = Arc::new(StatsAggregator::new());
        let shared = WorkerShared {
            config: Arc::clone(&self.config),
            recipients: recipients.into(),
            submitter: Submitter::new(Arc::clone(&self.client)),
            signer: Arc::clone(&self.signer),
            stats: Arc::clone(&stats),
            sink: Arc::clone(&sink),
        };
        let seed = self.config.seed.unwrap_or_else(rand::random);

        info!(
            workers = self.config.workers,
            senders = senders.len(),
            target_tps = self.config.target_tps,
            duration_secs = self.config.duration_secs,
            scheduled = plan.scheduled(),
            delay_us = self.config.pacing_delay().as_micros() as u64,
            "starting transaction submission"
        );

        let reporter_cancel = cancel.child_token();
        let reporter = ProgressReporter::new(
            Arc::clone(&stats),
            plan.total_budget,
            self.config.target_tps,
            self.config.report_interval(),
        )
        .spawn(reporter_cancel.clone());

        let mut workers = JoinSet::new();
        for (id, quota) in plan.quotas.iter().copied().enumerate() {
            let sender = Arc::clone(&senders[id % senders.len()]);
            let selector = RecipientSelector::new(self.config.recipient_policy, seed, id);
            let worker = Worker::new(id, sender, quota, selector, shared.clone());
            workers.spawn(worker.run(cancel.clone()));
        }

        let mut summaries = Vec::with_capacity(plan.quotas.len());
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(summary) => summaries.push(summary),
                Err(err) => error!(error = %err, "worker task failed"),
            }
        }
        summaries.sort_by_key(|summary| summary.id);

        reporter_cancel.cancel();
        if let Err(err) = reporter.await {
            error!(error = %err, "progress reporter task failed");
        }

        let snapshot = stats.snapshot();
        let actual_tps = rate_per_sec(snapshot.sent, snapshot.elapsed);
        let report = FinalReport {
            sent: snapshot.sent,
            errors: snapshot.errors,
            planned: plan.total_budget,
            scheduled: plan.scheduled(),
            total_time: snapshot.elapsed,
            target_tps: self.config.target_tps,
            actual_tps,
            deviation_pct: deviation_pct(actual_tps, self.config.target_tps),
            interrupted: summaries.iter().any(|summary| summary.cancelled),
            unrecorded: sink.unrecorded(),
            workers: summaries,
        };

        if report.unrecorded > 0 {
            warn!(
                unrecorded = report.unrecorded,
                "some accepted identifiers are missing from the output file"
            );
        }
        if let Err(err) = sink.write_summary(&report) {
            error!(error = %err, "failed to write run summary");
        }

        info!(
            sent = report.sent,
            errors = report.errors,
            actual_tps = report.actual_tps,
            deviation_pct = report.deviation_pct,
            interrupted = report.interrupted,
            "transaction submission finished"
        );
        Ok(report)
    }
}
