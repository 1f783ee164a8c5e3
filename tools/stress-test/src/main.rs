//! Multi-address stress test: fund a pool of senders, then drive a sustained
//! target TPS of signed transfers at a node and record every accepted hash.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ippan_stress::provisioning::provision;
use ippan_stress::verify::verify_artifact;
use ippan_stress::{
    generate_accounts, Account, Address, ChainClient, Dispatcher, Ed25519Signer, HttpChainClient,
    RecipientPolicy, RemainderPolicy, StressConfig,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(author, version, about = "IPPAN multi-address sustained TPS stress test")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fund senders (unless skipped) and run the paced submission test.
    Run(RunArgs),
    /// Check every hash recorded in an output file against the node.
    Verify(VerifyArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    RoundRobin,
    Random,
}

impl From<PolicyArg> for RecipientPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::RoundRobin => RecipientPolicy::RoundRobin,
            PolicyArg::Random => RecipientPolicy::Random,
        }
    }
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Optional config file (TOML/YAML/JSON); IPPAN_STRESS__* env vars also apply
    #[arg(long)]
    config: Option<PathBuf>,

    /// RPC base URL
    #[arg(long, env = "RPC_URL")]
    rpc: Option<String>,

    /// Target transactions per second
    #[arg(long)]
    tps: Option<u64>,

    /// Test duration in seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Number of sender accounts
    #[arg(long)]
    senders: Option<usize>,

    /// Number of recipient accounts
    #[arg(long)]
    recipients: Option<usize>,

    /// Concurrent workers (defaults to one per sender)
    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    chain_id: Option<u64>,

    /// Fee price in atomic units
    #[arg(long)]
    fee_price: Option<u128>,

    /// Transfer amount in atomic units
    #[arg(long)]
    amount: Option<u128>,

    /// Output file for transaction hashes
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum)]
    recipient_policy: Option<PolicyArg>,

    /// Seed for random recipient selection
    #[arg(long)]
    seed: Option<u64>,

    /// Give the budget remainder to the first workers instead of dropping it
    #[arg(long)]
    distribute_remainder: bool,

    /// Skip the funding phase (senders already funded)
    #[arg(long)]
    skip_funding: bool,

    /// Funder secret key as hex; can also come from IPPAN_FUNDER_KEY
    #[arg(long, env = "IPPAN_FUNDER_KEY", hide_env_values = true)]
    funder_key: Option<String>,

    #[arg(long)]
    log_level: Option<String>,

    #[arg(long, value_parser = ["pretty", "json"])]
    log_format: Option<String>,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9898)
    #[arg(long)]
    metrics_addr: Option<String>,
}

#[derive(Debug, Args)]
struct VerifyArgs {
    #[arg(long, env = "RPC_URL", default_value = "http://127.0.0.1:8080")]
    rpc: String,

    /// Output file written by `run`
    #[arg(long, default_value = "tx_hashes.txt")]
    input: PathBuf,

    /// Concurrent lookups
    #[arg(long, default_value_t = 16)]
    concurrency: usize,
}

impl RunArgs {
    fn into_config(self) -> Result<StressConfig> {
        let mut config = StressConfig::load(self.config.as_deref()).context("load configuration")?;

        if let Some(rpc) = self.rpc {
            config.rpc_url = rpc;
        }
        if let Some(tps) = self.tps {
            config.run.target_tps = tps;
        }
        if let Some(duration) = self.duration {
            config.run.duration_secs = duration;
        }
        if let Some(senders) = self.senders {
            config.accounts.senders = senders;
        }
        if let Some(recipients) = self.recipients {
            config.accounts.recipients = recipients;
        }
        if let Some(workers) = self.workers {
            config.run.workers = workers;
        }
        if let Some(chain_id) = self.chain_id {
            config.run.chain_id = chain_id;
        }
        if let Some(fee_price) = self.fee_price {
            config.run.fee_price = fee_price;
        }
        if let Some(amount) = self.amount {
            config.run.amount = amount;
        }
        if let Some(output) = self.output {
            config.run.output = output;
        }
        if let Some(policy) = self.recipient_policy {
            config.run.recipient_policy = policy.into();
        }
        if self.seed.is_some() {
            config.run.seed = self.seed;
        }
        if self.distribute_remainder {
            config.run.remainder = RemainderPolicy::Distribute;
        }
        if self.skip_funding {
            config.funding.skip = true;
        }
        if self.funder_key.is_some() {
            config.funding.funder_key = self.funder_key;
        }
        if let Some(level) = self.log_level {
            config.log.level = level;
        }
        if let Some(format) = self.log_format {
            config.log.format = format;
        }
        if self.metrics_addr.is_some() {
            config.metrics_addr = self.metrics_addr;
        }

        Ok(config.finalize()?)
    }
}

fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

fn init_metrics(addr: &str) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid metrics address {addr}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("install Prometheus exporter")?;
    info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}

/// Cancel `token` on the first Ctrl-C so workers wind down and the summary
/// still gets written.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt received; stopping workers");
                token.cancel();
            }
            Err(err) => warn!(error = %err, "failed to listen for interrupt"),
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Run(args) => run(args).await,
        Command::Verify(args) => verify(args).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = args.into_config()?;
    init_logging(&config.log.level, &config.log.format);
    if let Some(addr) = &config.metrics_addr {
        init_metrics(addr)?;
    }

    println!("=== MULTI-ADDRESS STRESS TEST ===");
    println!("RPC URL: {}", config.rpc_url);
    println!("Target TPS: {}", config.run.target_tps);
    println!("Duration: {} seconds", config.run.duration_secs);
    println!("Sender Addresses: {}", config.accounts.senders);
    println!("Recipient Addresses: {}", config.accounts.recipients);
    println!("Workers: {}", config.run.workers);
    println!("Total Transactions: {}", config.run.total_budget());
    println!("Chain ID: {}", config.run.chain_id);
    println!();

    let client: Arc<dyn ChainClient> = Arc::new(
        HttpChainClient::new(config.rpc_url.clone(), config.run.workers)
            .context("build RPC client")?,
    );
    let signer = Arc::new(Ed25519Signer);

    info!("generating accounts");
    let senders: Vec<Arc<Account>> = generate_accounts(config.accounts.senders)
        .into_iter()
        .map(Arc::new)
        .collect();
    let recipients: Vec<Address> = generate_accounts(config.accounts.recipients)
        .iter()
        .map(Account::address)
        .collect();
    info!(
        senders = senders.len(),
        recipients = recipients.len(),
        "generated sender and recipient accounts"
    );

    provision(
        client.as_ref(),
        signer.as_ref(),
        &config.funding,
        &config.run,
        &senders,
    )
    .await
    .context("provision sender accounts")?;

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let output = config.run.output.clone();
    let dispatcher = Dispatcher::new(Arc::new(config.run), client, signer);
    let report = dispatcher
        .run(senders, recipients, cancel)
        .await
        .context("stress test failed")?;

    println!();
    println!("{report}");
    println!("Transaction hashes saved to: {}", output.display());
    Ok(())
}

async fn verify(args: VerifyArgs) -> Result<()> {
    init_logging("info", "pretty");
    let client = HttpChainClient::new(args.rpc, args.concurrency).context("build RPC client")?;
    let report = verify_artifact(&client, &args.input, args.concurrency)
        .await
        .with_context(|| format!("verify {}", args.input.display()))?;
    println!("{report}");
    Ok(())
}
