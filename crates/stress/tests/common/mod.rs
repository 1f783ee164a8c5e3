#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use ippan_stress::transaction::SignedEnvelope;
use ippan_stress::*;
use parking_lot::Mutex;
use tokio::time::Instant;

type FailRule = Box<dyn Fn(&TransactionIntent) -> bool + Send + Sync>;

/// In-memory node: accepts signed envelopes, credits recipients, and can be
/// told to reject specific intents or to respond slowly.
#[derive(Default)]
pub struct MockChain {
    submitted: Mutex<Vec<(Instant, TransactionIntent)>>,
    known: Mutex<HashSet<String>>,
    sequences: Mutex<HashMap<Address, u64>>,
    balances: Mutex<HashMap<Address, u128>>,
    fail_if: Option<FailRule>,
    latency: Duration,
    skip_signature_check: bool,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept envelopes without checking signatures; pairs with [`UnsignedSigner`].
    pub fn trusting(mut self) -> Self {
        self.skip_signature_check = true;
        self
    }

    pub fn failing_when(
        mut self,
        rule: impl Fn(&TransactionIntent) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.fail_if = Some(Box::new(rule));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_sequence(&self, address: Address, next: u64) {
        self.sequences.lock().insert(address, next);
    }

    pub fn set_balance(&self, address: Address, balance: u128) {
        self.balances.lock().insert(address, balance);
    }

    pub fn submitted(&self) -> Vec<(Instant, TransactionIntent)> {
        self.submitted.lock().clone()
    }

    pub fn intents(&self) -> Vec<TransactionIntent> {
        self.submitted().into_iter().map(|(_, intent)| intent).collect()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn sequence(&self, address: &Address) -> Result<u64> {
        Ok(self.sequences.lock().get(address).copied().unwrap_or(0))
    }

    async fn submit(&self, payload: &SignedPayload) -> Result<String> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let envelope = SignedEnvelope::decode(&payload.bytes)?;
        if !self.skip_signature_check {
            assert!(envelope.verify(), "mock node received a bad signature");
        }
        let intent = envelope.intent;

        if self.fail_if.as_ref().is_some_and(|rule| rule(&intent)) {
            return Err(StressError::Rpc {
                status: 400,
                code: "rejected".into(),
                message: format!("rejected sequence {}", intent.sequence),
            });
        }

        *self.balances.lock().entry(intent.to).or_insert(0) += intent.amount;
        self.known.lock().insert(payload.identifier.clone());
        self.submitted.lock().push((Instant::now(), intent));
        Ok(payload.identifier.clone())
    }

    async fn balance(&self, address: &Address) -> Result<u128> {
        Ok(self.balances.lock().get(address).copied().unwrap_or(0))
    }

    async fn transaction_status(&self, identifier: &str) -> Result<TxStatus> {
        if self.known.lock().contains(identifier) {
            Ok(TxStatus::Known)
        } else {
            Ok(TxStatus::Unknown)
        }
    }
}

/// Signer that refuses selected sequences and otherwise defers to ed25519.
pub struct FlakySigner {
    pub refuse: HashSet<u64>,
}

impl Signer for FlakySigner {
    fn sign(&self, intent: &TransactionIntent, key: &SigningKey) -> Result<SignedPayload> {
        if self.refuse.contains(&intent.sequence) {
            return Err(StressError::Signing(format!("refused {}", intent.sequence)));
        }
        Ed25519Signer.sign(intent, key)
    }
}

/// Wraps the intent in an envelope with an empty signature. Only a
/// [`MockChain::trusting`] node accepts these.
pub struct UnsignedSigner;

impl Signer for UnsignedSigner {
    fn sign(&self, intent: &TransactionIntent, _key: &SigningKey) -> Result<SignedPayload> {
        let envelope = SignedEnvelope {
            intent: intent.clone(),
            public_key: intent.from.0,
            signature: Vec::new(),
        };
        let bytes = bincode::serialize(&envelope)
            .map_err(|err| StressError::Signing(err.to_string()))?;
        Ok(SignedPayload::new(bytes))
    }
}

pub fn run_config(target_tps: u64, duration_secs: u64, workers: usize, output: &Path) -> RunConfig {
    RunConfig {
        target_tps,
        duration_secs,
        workers,
        output: output.to_path_buf(),
        seed: Some(7),
        ..RunConfig::default()
    }
}

pub fn accounts(count: usize) -> Vec<Arc<Account>> {
    generate_accounts(count).into_iter().map(Arc::new).collect()
}

pub fn addresses(count: usize) -> Vec<Address> {
    generate_accounts(count)
        .iter()
        .map(Account::address)
        .collect()
}
