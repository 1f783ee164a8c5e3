//! Run configuration: serde defaults, then an optional file, then
//! `IPPAN_STRESS__*` environment variables. The binary applies CLI flags last
//! and calls [`StressConfig::finalize`] before sharing it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StressError};

/// How a worker picks the recipient for each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecipientPolicy {
    /// `(worker_id + iteration) % recipients`
    #[default]
    RoundRobin,
    /// Seeded per worker from the run seed.
    Random,
}

/// What happens to `total_budget % workers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemainderPolicy {
    /// Drop the remainder; every worker gets `total / workers`.
    #[default]
    Truncate,
    /// The first `total % workers` workers run one extra iteration.
    Distribute,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub target_tps: u64,
    pub duration_secs: u64,
    /// Zero means one worker per sender.
    pub workers: usize,
    pub chain_id: u64,
    pub fee_price: u128,
    pub amount: u128,
    pub output: PathBuf,
    pub label: String,
    pub recipient_policy: RecipientPolicy,
    pub seed: Option<u64>,
    pub remainder: RemainderPolicy,
    pub error_log_limit: u64,
    pub report_interval_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target_tps: 500,
            duration_secs: 30,
            workers: 0,
            chain_id: 32382,
            fee_price: 1_000_000_000,
            amount: 1_000_000_000_000,
            output: PathBuf::from("tx_hashes.txt"),
            label: "Multi-Address Stress Test".to_string(),
            recipient_policy: RecipientPolicy::RoundRobin,
            seed: None,
            remainder: RemainderPolicy::Truncate,
            error_log_limit: 10,
            report_interval_ms: 1_000,
        }
    }
}

impl RunConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    /// `target_tps * duration`, before splitting across workers.
    pub fn total_budget(&self) -> u64 {
        self.target_tps.saturating_mul(self.duration_secs)
    }

    /// Gap each worker aims for between iteration starts: `1s / (tps / workers)`.
    pub fn pacing_delay(&self) -> Duration {
        if self.target_tps == 0 {
            return Duration::ZERO;
        }
        let nanos = self.workers as u128 * 1_000_000_000 / self.target_tps as u128;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_tps == 0 {
            return Err(invalid("target_tps must be > 0"));
        }
        if self.duration_secs == 0 {
            return Err(invalid("duration_secs must be > 0"));
        }
        if self.workers == 0 {
            return Err(invalid("workers must be > 0"));
        }
        if self.output.as_os_str().is_empty() {
            return Err(invalid("output path must not be empty"));
        }
        if self.report_interval_ms == 0 {
            return Err(invalid("report_interval_ms must be > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    pub senders: usize,
    pub recipients: usize,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            senders: 20,
            recipients: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FundingConfig {
    /// Senders are already funded; only sync their sequences.
    pub skip: bool,
    /// Hex secret of the account that pays for funding.
    pub funder_key: Option<String>,
    pub fund_amount: u128,
    pub min_balance: u128,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            skip: false,
            funder_key: None,
            fund_amount: 10_000 * 10u128.pow(18),
            min_balance: 10u128.pow(18),
            timeout_secs: 120,
            poll_interval_secs: 3,
        }
    }
}

impl FundingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    pub rpc_url: String,
    pub run: RunConfig,
    pub accounts: AccountsConfig,
    pub funding: FundingConfig,
    pub log: LogConfig,
    /// Listen address for the Prometheus exporter, if any.
    pub metrics_addr: Option<String>,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8080".to_string(),
            run: RunConfig::default(),
            accounts: AccountsConfig::default(),
            funding: FundingConfig::default(),
            log: LogConfig::default(),
            metrics_addr: None,
        }
    }
}

impl StressConfig {
    pub const ENV_PREFIX: &'static str = "IPPAN_STRESS";

    /// Layer an optional file and the environment over the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(invalid(format!(
                    "configuration file {} not found",
                    path.display()
                )));
            }
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix(Self::ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Resolve derived defaults and validate. Call once, after all overrides.
    pub fn finalize(mut self) -> Result<Self> {
        if self.run.workers == 0 {
            self.run.workers = self.accounts.senders;
        }
        if self.accounts.senders == 0 {
            return Err(invalid("senders must be > 0"));
        }
        if self.accounts.recipients == 0 {
            return Err(invalid("recipients must be > 0"));
        }
        if self.rpc_url.trim().is_empty() {
            return Err(invalid("rpc_url must not be empty"));
        }
        if self.funding.poll_interval_secs == 0 {
            return Err(invalid("funding.poll_interval_secs must be > 0"));
        }
        self.run.validate()?;
        Ok(self)
    }
}

fn invalid(message: impl Into<String>) -> StressError {
    StressError::InvalidConfig(message.into())
}
