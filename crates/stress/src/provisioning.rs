//! Pre-run setup: funding senders from a funder account, waiting for the
//! funds to land, and syncing sender sequence counters with the node.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::account::Account;
use crate::client::ChainClient;
use crate::config::{FundingConfig, RunConfig};
use crate::errors::{Result, StressError};
use crate::transaction::{Signer, TransactionIntent};

/// Send `amount` from `funder` to every sender, one transaction each.
pub async fn fund_senders(
    client: &dyn ChainClient,
    signer: &dyn Signer,
    funder: &Account,
    senders: &[Arc<Account>],
    amount: u128,
    run: &RunConfig,
) -> Result<()> {
    let start = client
        .sequence(&funder.address())
        .await
        .map_err(|err| StressError::Funding(format!("failed to get funder sequence: {err}")))?;
    funder.sequence().reset(start);

    info!(
        accounts = senders.len(),
        amount = %amount,
        funder = %funder.address(),
        "funding sender accounts"
    );

    for (i, sender) in senders.iter().enumerate() {
        let intent = TransactionIntent {
            from: funder.address(),
            to: sender.address(),
            amount,
            fee_price: run.fee_price,
            sequence: funder.sequence().next(),
            chain_id: run.chain_id,
        };
        let payload = signer
            .sign(&intent, funder.signing_key())
            .map_err(|err| StressError::Funding(format!("failed to sign funding tx: {err}")))?;
        client
            .submit(&payload)
            .await
            .map_err(|err| StressError::Funding(format!("failed to send funding tx: {err}")))?;

        if (i + 1) % 10 == 0 || i + 1 == senders.len() {
            info!("funded {}/{} accounts", i + 1, senders.len());
        }
    }
    Ok(())
}

/// Poll balances until every account holds at least `min_balance`.
pub async fn wait_for_funding(
    client: &dyn ChainClient,
    accounts: &[Arc<Account>],
    min_balance: u128,
    max_wait: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let started = Instant::now();

    loop {
        let balances = join_all(
            accounts
                .iter()
                .map(|account| async move { (account.address(), client.balance(&account.address()).await) }),
        )
        .await;

        let mut funded = 0;
        for (address, balance) in balances {
            match balance {
                Ok(balance) if balance >= min_balance => funded += 1,
                Ok(_) => {}
                Err(err) => warn!(%address, error = %err, "failed to check balance"),
            }
        }

        info!("verified {}/{} accounts funded", funded, accounts.len());
        if funded == accounts.len() {
            return Ok(());
        }

        let waited = started.elapsed();
        if waited > max_wait {
            return Err(StressError::FundingTimeout {
                funded,
                total: accounts.len(),
                waited,
            });
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Reset each account's sequence counter to the node's next value. Lookup
/// failures are logged and leave that counter untouched.
pub async fn sync_sequences(client: &dyn ChainClient, accounts: &[Arc<Account>]) {
    let results = join_all(
        accounts
            .iter()
            .map(|account| async move { (account, client.sequence(&account.address()).await) }),
    )
    .await;

    for (account, result) in results {
        match result {
            Ok(next) => account.sequence().reset(next),
            Err(err) => warn!(address = %account.address(), error = %err, "failed to get sequence"),
        }
    }
}

/// Full pre-run flow driven by [`FundingConfig`].
pub async fn provision(
    client: &dyn ChainClient,
    signer: &dyn Signer,
    funding: &FundingConfig,
    run: &RunConfig,
    senders: &[Arc<Account>],
) -> Result<()> {
    if funding.skip {
        info!("skipping funding phase");
    } else {
        let key = funding.funder_key.as_deref().ok_or_else(|| {
            StressError::InvalidConfig("funder key is required unless funding is skipped".into())
        })?;
        let funder = Account::from_secret_hex(key)?;
        fund_senders(client, signer, &funder, senders, funding.fund_amount, run).await?;
        info!("waiting for funding transactions to land");
        wait_for_funding(
            client,
            senders,
            funding.min_balance,
            funding.timeout(),
            funding.poll_interval(),
        )
        .await?;
        info!("all sender accounts funded");
    }

    sync_sequences(client, senders).await;
    Ok(())
}
