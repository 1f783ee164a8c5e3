//! # IPPAN Stress
//!
//! Rate-controlled load generator for a node's transaction submission RPC.
//!
//! A [`Dispatcher`] splits `target_tps * duration` across workers. Each
//! [`Worker`] owns a sender (and through it a [`SequenceAllocator`]), signs and
//! submits transfers, paces itself to its share of the target rate, and feeds
//! a shared [`StatsAggregator`] and [`ResultSink`]. A [`ProgressReporter`]
//! prints throughput once per period until the workers finish.

pub mod account;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod provisioning;
pub mod reporter;
pub mod sink;
pub mod stats;
pub mod submitter;
pub mod transaction;
pub mod verify;
pub mod worker;

pub use account::{generate_accounts, Account, Address, SequenceAllocator};
pub use client::{ChainClient, HttpChainClient, TxStatus};
pub use config::{RecipientPolicy, RemainderPolicy, RunConfig, StressConfig};
pub use dispatcher::{Dispatcher, FinalReport, QuotaPlan};
pub use errors::{Result, StressError};
pub use reporter::ProgressReporter;
pub use sink::{ResultSink, RunHeader};
pub use stats::{OutcomeKind, StatsAggregator, StatsSnapshot};
pub use submitter::{SubmissionOutcome, Submitter};
pub use transaction::{Ed25519Signer, SignedPayload, Signer, TransactionIntent};
pub use worker::{Worker, WorkerState, WorkerSummary};
