//! Read an output artifact back and ask the node about each identifier.

use std::fmt;
use std::path::Path;

use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::client::{ChainClient, TxStatus};
use crate::errors::Result;
use crate::sink::read_identifiers;

const MAX_SAMPLES: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub total: usize,
    pub known: usize,
    pub unknown: usize,
    pub failed: usize,
    pub samples: Vec<String>,
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== VERIFICATION RESULTS ===")?;
        writeln!(f, "Checked: {}", self.total)?;
        writeln!(f, "Known to node: {}", self.known)?;
        writeln!(f, "Unknown: {}", self.unknown)?;
        write!(f, "Lookup failures: {}", self.failed)?;
        for sample in &self.samples {
            write!(f, "\n  {sample}")?;
        }
        Ok(())
    }
}

pub async fn verify_identifiers(
    client: &dyn ChainClient,
    identifiers: Vec<String>,
    concurrency: usize,
) -> VerificationReport {
    let total = identifiers.len();
    let mut report = VerificationReport {
        total,
        ..VerificationReport::default()
    };

    let mut lookups = stream::iter(identifiers)
        .map(|identifier| async move {
            let status = client.transaction_status(&identifier).await;
            (identifier, status)
        })
        .buffer_unordered(concurrency.max(1));

    while let Some((identifier, status)) = lookups.next().await {
        match status {
            Ok(TxStatus::Known) => {
                report.known += 1;
                if report.samples.len() < MAX_SAMPLES {
                    report.samples.push(identifier);
                }
            }
            Ok(TxStatus::Unknown) => report.unknown += 1,
            Err(err) => {
                debug!(%identifier, error = %err, "transaction lookup failed");
                report.failed += 1;
            }
        }
        let checked = report.known + report.unknown + report.failed;
        if checked % 100 == 0 {
            info!("checked {}/{} transactions", checked, total);
        }
    }
    report
}

pub async fn verify_artifact(
    client: &dyn ChainClient,
    path: &Path,
    concurrency: usize,
) -> Result<VerificationReport> {
    let contents = tokio::fs::read_to_string(path).await?;
    let identifiers = read_identifiers(&contents);
    info!(count = identifiers.len(), path = %path.display(), "verifying recorded transactions");
    Ok(verify_identifiers(client, identifiers, concurrency).await)
}
