//! A single-use submission loop bound to one sender.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::account::{Account, Address};
use crate::config::{RecipientPolicy, RunConfig};
use crate::sink::ResultSink;
use crate::stats::{OutcomeKind, StatsAggregator};
use crate::submitter::{SubmissionOutcome, Submitter};
use crate::transaction::{Signer, TransactionIntent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Done,
}

/// Chooses the recipient index for each iteration.
#[derive(Debug)]
pub enum RecipientSelector {
    RoundRobin,
    Random(StdRng),
}

impl RecipientSelector {
    pub fn new(policy: RecipientPolicy, seed: u64, worker_id: usize) -> Self {
        match policy {
            RecipientPolicy::RoundRobin => RecipientSelector::RoundRobin,
            RecipientPolicy::Random => {
                RecipientSelector::Random(StdRng::seed_from_u64(seed ^ worker_id as u64))
            }
        }
    }

    pub fn pick(&mut self, worker_id: usize, iteration: u64, recipients: usize) -> usize {
        match self {
            RecipientSelector::RoundRobin => {
                ((worker_id as u64).wrapping_add(iteration) % recipients as u64) as usize
            }
            RecipientSelector::Random(rng) => rng.gen_range(0..recipients),
        }
    }
}

/// Per-worker tallies, returned when the worker finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub id: usize,
    pub quota: u64,
    pub attempted: u64,
    pub sent: u64,
    pub errors: u64,
    pub cancelled: bool,
}

/// Handles shared by every worker of a run.
#[derive(Clone)]
pub struct WorkerShared {
    pub config: Arc<RunConfig>,
    pub recipients: Arc<[Address]>,
    pub submitter: Submitter,
    pub signer: Arc<dyn Signer>,
    pub stats: Arc<StatsAggregator>,
    pub sink: Arc<ResultSink>,
}

enum Step {
    Submitted,
    SignFailed,
    /// Cancelled while the submit was in flight.
    Abandoned,
}

pub struct Worker {
    id: usize,
    sender: Arc<Account>,
    quota: u64,
    delay: Duration,
    selector: RecipientSelector,
    shared: WorkerShared,
    state: WorkerState,
    summary: WorkerSummary,
}

impl Worker {
    pub fn new(
        id: usize,
        sender: Arc<Account>,
        quota: u64,
        selector: RecipientSelector,
        shared: WorkerShared,
    ) -> Self {
        let delay = shared.config.pacing_delay();
        Self {
            id,
            sender,
            quota,
            delay,
            selector,
            shared,
            state: WorkerState::Running,
            summary: WorkerSummary {
                id,
                quota,
                ..WorkerSummary::default()
            },
        }
    }

    /// Run `quota` iterations, or fewer if `cancel` fires first.
    ///
    /// Each iteration sleeps for whatever is left of the pacing delay. An
    /// iteration that overruns the delay is not made up later. A submit still
    /// in flight when `cancel` fires is dropped and counted as an error, so
    /// shutdown never waits on the client's request timeout.
    pub async fn run(mut self, cancel: CancellationToken) -> WorkerSummary {
        debug!(
            worker = self.id,
            sender = %self.sender.address(),
            quota = self.quota,
            delay_us = self.delay.as_micros() as u64,
            "worker started"
        );

        while self.state == WorkerState::Running {
            if self.summary.attempted >= self.quota {
                self.state = WorkerState::Done;
                break;
            }
            if cancel.is_cancelled() {
                self.summary.cancelled = true;
                self.state = WorkerState::Done;
                break;
            }

            let started = Instant::now();
            match self.step(&cancel).await {
                Step::Submitted => {}
                Step::SignFailed => continue,
                Step::Abandoned => {
                    self.summary.cancelled = true;
                    self.state = WorkerState::Done;
                    break;
                }
            }

            let elapsed = started.elapsed();
            if elapsed < self.delay {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.summary.cancelled = self.summary.attempted < self.quota;
                        self.state = WorkerState::Done;
                    }
                    _ = tokio::time::sleep(self.delay - elapsed) => {}
                }
            }
        }

        debug!(
            worker = self.id,
            attempted = self.summary.attempted,
            sent = self.summary.sent,
            errors = self.summary.errors,
            cancelled = self.summary.cancelled,
            "worker finished"
        );
        self.summary
    }

    async fn step(&mut self, cancel: &CancellationToken) -> Step {
        let shared = &self.shared;
        let index = self
            .selector
            .pick(self.id, self.summary.attempted, shared.recipients.len());
        let intent = TransactionIntent {
            from: self.sender.address(),
            to: shared.recipients[index],
            amount: shared.config.amount,
            fee_price: shared.config.fee_price,
            sequence: self.sender.sequence().next(),
            chain_id: shared.config.chain_id,
        };
        self.summary.attempted += 1;

        let payload = match shared.signer.sign(&intent, self.sender.signing_key()) {
            Ok(payload) => payload,
            Err(err) => {
                self.record_failure(intent.sequence, &err.to_string());
                return Step::SignFailed;
            }
        };

        let outcome = tokio::select! {
            biased;
            outcome = self.shared.submitter.submit(&payload) => Some(outcome),
            _ = cancel.cancelled() => None,
        };
        let Some(outcome) = outcome else {
            self.record_failure(intent.sequence, "submission abandoned on shutdown");
            return Step::Abandoned;
        };

        match outcome {
            SubmissionOutcome::Success { identifier } => {
                self.shared.stats.increment(OutcomeKind::Sent);
                self.summary.sent += 1;
                self.record_identifier(&identifier);
            }
            SubmissionOutcome::Failure { reason } => {
                self.record_failure(intent.sequence, &reason);
            }
        }
        Step::Submitted
    }

    /// The submission already counts as sent; a lost line is only reported.
    fn record_identifier(&self, identifier: &str) {
        if let Err(err) = self.shared.sink.record(identifier) {
            if self.shared.sink.unrecorded() <= self.shared.config.error_log_limit {
                warn!(worker = self.id, %identifier, error = %err, "failed to record identifier");
            }
        }
    }

    fn record_failure(&mut self, sequence: u64, reason: &str) {
        let total = self.shared.stats.increment(OutcomeKind::Error);
        self.summary.errors += 1;
        if total <= self.shared.config.error_log_limit {
            warn!(
                worker = self.id,
                sender = %self.sender.address(),
                sequence,
                error = %reason,
                "failed to send transaction"
            );
        }
    }
}
