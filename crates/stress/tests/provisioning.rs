mod common;

use std::time::Duration;

use common::{accounts, MockChain};
use ippan_stress::config::FundingConfig;
use ippan_stress::provisioning::{fund_senders, provision, sync_sequences, wait_for_funding};
use ippan_stress::verify::{verify_artifact, verify_identifiers};
use ippan_stress::*;
use tempfile::tempdir;

#[tokio::test]
async fn funding_uses_consecutive_funder_sequences() {
    let chain = MockChain::new();
    let funder = Account::generate();
    chain.set_sequence(funder.address(), 7);
    let senders = accounts(12);

    fund_senders(
        &chain,
        &Ed25519Signer,
        &funder,
        &senders,
        5_000,
        &RunConfig::default(),
    )
    .await
    .unwrap();

    let intents = chain.intents();
    assert_eq!(intents.len(), 12);
    for (i, intent) in intents.iter().enumerate() {
        assert_eq!(intent.from, funder.address());
        assert_eq!(intent.to, senders[i].address());
        assert_eq!(intent.sequence, 7 + i as u64);
        assert_eq!(intent.amount, 5_000);
    }
    assert_eq!(chain.balance(&senders[11].address()).await.unwrap(), 5_000);
}

#[tokio::test]
async fn funding_send_failure_is_fatal() {
    let chain = MockChain::new().failing_when(|intent| intent.sequence == 1);
    let funder = Account::generate();
    let err = fund_senders(
        &chain,
        &Ed25519Signer,
        &funder,
        &accounts(3),
        1,
        &RunConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, StressError::Funding(_)));
    assert_eq!(chain.intents().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn waiting_for_funding_times_out() {
    let chain = MockChain::new();
    let senders = accounts(3);
    chain.set_balance(senders[0].address(), 100);

    let err = wait_for_funding(
        &chain,
        &senders,
        100,
        Duration::from_secs(10),
        Duration::from_secs(3),
    )
    .await
    .unwrap_err();

    match err {
        StressError::FundingTimeout {
            funded,
            total,
            waited,
        } => {
            assert_eq!(funded, 1);
            assert_eq!(total, 3);
            assert!(waited > Duration::from_secs(10));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn waiting_for_funding_succeeds_once_balances_land() {
    let chain = MockChain::new();
    let senders = accounts(2);
    for sender in &senders {
        chain.set_balance(sender.address(), 1_000);
    }
    wait_for_funding(
        &chain,
        &senders,
        1_000,
        Duration::from_secs(10),
        Duration::from_secs(3),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn sync_resets_sender_sequences() {
    let chain = MockChain::new();
    let senders = accounts(2);
    chain.set_sequence(senders[0].address(), 42);
    senders[1].sequence().reset(9);

    sync_sequences(&chain, &senders).await;

    assert_eq!(senders[0].sequence().peek(), 42);
    assert_eq!(senders[1].sequence().peek(), 0);
}

#[tokio::test(start_paused = true)]
async fn provision_funds_waits_and_syncs() {
    let chain = MockChain::new();
    let funder = Account::generate();
    let senders = accounts(4);
    let funding = FundingConfig {
        funder_key: Some(hex::encode(funder.signing_key().to_bytes())),
        fund_amount: 10,
        min_balance: 10,
        ..FundingConfig::default()
    };

    provision(&chain, &Ed25519Signer, &funding, &RunConfig::default(), &senders)
        .await
        .unwrap();
    assert_eq!(chain.intents().len(), 4);
}

#[tokio::test]
async fn provision_without_funder_key_is_rejected() {
    let chain = MockChain::new();
    let err = provision(
        &chain,
        &Ed25519Signer,
        &FundingConfig::default(),
        &RunConfig::default(),
        &accounts(1),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, StressError::InvalidConfig(_)));
}

#[tokio::test]
async fn skipped_funding_only_syncs() {
    let chain = MockChain::new();
    let senders = accounts(1);
    chain.set_sequence(senders[0].address(), 3);
    let funding = FundingConfig {
        skip: true,
        ..FundingConfig::default()
    };
    provision(&chain, &Ed25519Signer, &funding, &RunConfig::default(), &senders)
        .await
        .unwrap();
    assert!(chain.intents().is_empty());
    assert_eq!(senders[0].sequence().peek(), 3);
}

#[tokio::test]
async fn verification_counts_known_and_unknown() {
    let chain = MockChain::new();
    let sender = Account::generate();
    let mut known = Vec::new();
    for sequence in 0..3 {
        let intent = TransactionIntent {
            from: sender.address(),
            to: sender.address(),
            amount: 1,
            fee_price: 1,
            sequence,
            chain_id: 1,
        };
        let payload = Ed25519Signer.sign(&intent, sender.signing_key()).unwrap();
        known.push(chain.submit(&payload).await.unwrap());
    }

    let mut identifiers = known.clone();
    identifiers.push("0xdeadbeef".to_string());
    let report = verify_identifiers(&chain, identifiers, 2).await;
    assert_eq!(report.total, 4);
    assert_eq!(report.known, 3);
    assert_eq!(report.unknown, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.samples.len(), 3);

    let dir = tempdir().unwrap();
    let path = dir.path().join("hashes.txt");
    let sink = ResultSink::create(&path, &RunHeader::new("run").field("Senders", 1)).unwrap();
    for id in &known {
        sink.record(id).unwrap();
    }
    drop(sink);
    let report = verify_artifact(&chain, &path, 4).await.unwrap();
    assert_eq!(report.total, 3);
    assert_eq!(report.known, 3);
}
