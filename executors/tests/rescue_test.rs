use fixtures::*;

use std::{sync::atomic::Ordering, time::Duration};

use alloy::primitives::U256;
use rescue_core::{chain::ChainReceipt, error::EngineError, gas::WEI_PER_GWEI, ledger::RescueStatus};
use rescue_executors::{
    rescue::{BudgetMode, RescueError},
    store::ledger_view,
};

const FINNEY: u64 = 1_000_000_000_000_000;

#[tokio::test]
async fn insufficient_ledger_budget_fails_before_any_record() {
    setup_tracing();
    let harness = Harness::new();
    harness.store.seed_payment(VICTIM, 1, U256::from(10 * FINNEY));
    // 136,363 units buffered to 150,000 at a 100 gwei cap = 0.015 ETH
    harness.chain.with(|s| s.estimate = Ok(136_363));

    let err = harness
        .admission(BudgetMode::Ledger)
        .rescue(rescue_request(true))
        .await
        .unwrap_err();

    match err {
        RescueError::InsufficientFunds {
            extra_gas_eth_needed,
            estimated_gas_eth,
            remaining_eth,
        } => {
            assert_eq!(extra_gas_eth_needed, U256::from(5 * FINNEY));
            assert_eq!(estimated_gas_eth, U256::from(15 * FINNEY));
            assert_eq!(remaining_eth, U256::from(10 * FINNEY));
        }
        other => panic!("expected insufficient funds, got {other:?}"),
    }

    assert!(harness.store.rescues().is_empty());
    assert!(harness.chain.with(|s| s.sent.is_empty()));
    assert!(!harness.rescue_lock_held(VICTIM));
}

#[tokio::test]
async fn ledger_rescue_records_usage_and_remaining_budget() {
    let harness = Harness::new();
    harness.store.seed_payment(VICTIM, 1, U256::from(20 * FINNEY));

    let response = harness
        .admission(BudgetMode::Ledger)
        .rescue(rescue_request(true))
        .await
        .unwrap();

    // 80,000 gas at 50 gwei
    let spent = U256::from(4 * FINNEY);
    assert_eq!(response.status, RescueStatus::Success);
    assert_eq!(response.rescue_transaction_hash, RESCUE_HASH);
    assert_eq!(response.gas_used, 80_000);
    assert_eq!(response.eth_used, spent);
    assert_eq!(response.remaining_eth, Some(U256::from(16 * FINNEY)));

    let records = harness.store.rescues();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.status, RescueStatus::Success);
    assert_eq!(record.rescue_transaction_hash, Some(RESCUE_HASH));
    assert_eq!(record.eth_used, Some(spent));
    assert_eq!(record.receiver_address, RECEIVER);
    assert_eq!(record.tokens, vec![TOKEN]);
    assert_eq!(record.deadline, 1_900_000_000);

    let sent = harness.chain.with(|s| s.sent.clone());
    assert_eq!(sent.len(), 1);
    let tx = &sent[0];
    assert_eq!(tx.from, Some(BACKEND));
    assert_eq!(tx.to, Some(VICTIM.into()));
    assert_eq!(tx.gas, Some(110_000));
    assert_eq!(tx.max_fee_per_gas, Some(100 * WEI_PER_GWEI));
    assert_eq!(tx.max_priority_fee_per_gas, Some(20 * WEI_PER_GWEI));
    let authorization = &tx.authorization_list.as_ref().unwrap()[0];
    assert_eq!(authorization.address, DELEGATE);
    assert_eq!(authorization.y_parity(), 1);

    // ten blocks of two seconds
    assert_eq!(
        harness.chain.with(|s| s.receipt_timeouts.clone()),
        vec![Duration::from_secs(20)]
    );
}

#[tokio::test]
async fn earlier_rescues_count_against_the_ledger() {
    let harness = Harness::new();
    harness.store.seed_payment(VICTIM, 1, U256::from(20 * FINNEY));
    let admission = harness.admission(BudgetMode::Ledger);

    admission.rescue(rescue_request(true)).await.unwrap();

    // 150,000 units buffered to 165,000 = 0.0165 ETH against 0.016 left
    harness.chain.with(|s| s.estimate = Ok(150_000));
    let err = admission.rescue(rescue_request(true)).await.unwrap_err();

    assert!(matches!(
        err,
        RescueError::InsufficientFunds { extra_gas_eth_needed, remaining_eth, .. }
            if extra_gas_eth_needed == U256::from(FINNEY / 2)
                && remaining_eth == U256::from(16 * FINNEY)
    ));
    assert_eq!(harness.store.rescues().len(), 1);
}

#[tokio::test]
async fn reverted_rescue_is_failed_but_charged() {
    let harness = Harness::new();
    harness.store.seed_payment(VICTIM, 1, U256::from(20 * FINNEY));
    harness.chain.with(|s| {
        s.receipt = Ok(ChainReceipt {
            transaction_hash: RESCUE_HASH,
            success: false,
            gas_used: 50_000,
            effective_gas_price: 2 * WEI_PER_GWEI,
            block_number: Some(102),
        })
    });

    let response = harness
        .admission(BudgetMode::Ledger)
        .rescue(rescue_request(true))
        .await
        .unwrap();

    let charged = U256::from(100_000_000_000_000u64);
    assert_eq!(response.status, RescueStatus::Failed);
    assert_eq!(response.gas_used, 50_000);
    assert_eq!(response.eth_used, charged);

    let record = &harness.store.rescues()[0];
    assert_eq!(record.status, RescueStatus::Failed);
    assert_eq!(record.gas_used, Some(50_000));
    assert_eq!(record.eth_used, Some(charged));
}

#[tokio::test]
async fn broadcast_error_marks_pending_record_failed() {
    let harness = Harness::new();
    harness.store.seed_payment(VICTIM, 1, U256::from(20 * FINNEY));
    harness.chain.with(|s| {
        s.send = Err(EngineError::InternalError {
            message: "nonce too low".to_string(),
        })
    });

    let err = harness
        .admission(BudgetMode::Ledger)
        .rescue(rescue_request(true))
        .await
        .unwrap_err();

    match err {
        RescueError::Fatal {
            message,
            rescue_transaction_hash,
        } => {
            assert!(message.contains("nonce too low"), "{message}");
            assert_eq!(rescue_transaction_hash, None);
        }
        other => panic!("expected fatal error, got {other:?}"),
    }

    let record = &harness.store.rescues()[0];
    assert_eq!(record.status, RescueStatus::Failed);
    assert_eq!(record.rescue_transaction_hash, None);
    assert_eq!(record.eth_used, None);
    assert!(!harness.rescue_lock_held(VICTIM));
}

#[tokio::test]
async fn receipt_timeout_marks_broadcast_record_failed() {
    let harness = Harness::new();
    harness.store.seed_payment(VICTIM, 1, U256::from(20 * FINNEY));
    harness.chain.with(|s| {
        s.receipt = Err(EngineError::ReceiptTimeout {
            chain_id: CHAIN_ID,
            transaction_hash: RESCUE_HASH.to_string(),
            timeout_secs: 20,
        })
    });

    let err = harness
        .admission(BudgetMode::Ledger)
        .rescue(rescue_request(true))
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        RescueError::Fatal { rescue_transaction_hash: Some(hash), .. } if *hash == RESCUE_HASH.to_string()
    ));

    let record = &harness.store.rescues()[0];
    assert_eq!(record.status, RescueStatus::Failed);
    assert_eq!(record.rescue_transaction_hash, Some(RESCUE_HASH));
}

#[tokio::test]
async fn lost_hash_write_still_awaits_receipt_and_charges_ledger() {
    setup_tracing();
    let harness = Harness::new();
    harness.store.seed_payment(VICTIM, 1, U256::from(20 * FINNEY));
    harness.store.fail_next_updates(1);

    let response = harness
        .admission(BudgetMode::Ledger)
        .rescue(rescue_request(true))
        .await
        .unwrap();

    let spent = U256::from(4 * FINNEY);
    assert_eq!(response.status, RescueStatus::Success);
    assert_eq!(response.eth_used, spent);
    assert_eq!(response.remaining_eth, Some(U256::from(16 * FINNEY)));

    assert_eq!(harness.chain.with(|s| s.sent.len()), 1);
    assert_eq!(harness.chain.with(|s| s.receipt_timeouts.len()), 1);
    // the hash write failed, the final write carried it
    assert_eq!(harness.store.update_attempts.load(Ordering::SeqCst), 2);

    let record = &harness.store.rescues()[0];
    assert_eq!(record.status, RescueStatus::Success);
    assert_eq!(record.rescue_transaction_hash, Some(RESCUE_HASH));
    assert_eq!(record.eth_used, Some(spent));

    let view = ledger_view(harness.store.as_ref(), CHAIN_ID, VICTIM)
        .await
        .unwrap();
    assert_eq!(view.balance.remaining(), U256::from(16 * FINNEY));
}

#[tokio::test]
async fn local_mode_spends_from_backend_balance_and_records_after_receipt() {
    let harness = Harness::new();

    let response = harness
        .admission(BudgetMode::Local)
        .rescue(rescue_request(true))
        .await
        .unwrap();

    assert_eq!(response.status, RescueStatus::Success);
    assert_eq!(response.remaining_eth, None);
    assert!(harness.explorer.queries().is_empty(), "local mode never reads the ledger");

    let records = harness.store.rescues();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RescueStatus::Success);
    assert_eq!(records[0].gas_used, Some(80_000));
}

#[tokio::test]
async fn local_mode_checks_backend_balance() {
    let harness = Harness::new();
    harness.chain.with(|s| s.balance = U256::from(5 * FINNEY));

    let err = harness
        .admission(BudgetMode::Local)
        .rescue(rescue_request(true))
        .await
        .unwrap_err();

    // 110,000 units at 100 gwei = 0.011 ETH
    assert!(matches!(
        err,
        RescueError::InsufficientFunds { extra_gas_eth_needed, estimated_gas_eth, remaining_eth }
            if extra_gas_eth_needed == U256::from(6 * FINNEY)
                && estimated_gas_eth == U256::from(11 * FINNEY)
                && remaining_eth == U256::from(5 * FINNEY)
    ));
    assert!(harness.store.rescues().is_empty());
}

#[tokio::test]
async fn estimation_failure_is_an_upstream_error() {
    let harness = Harness::new();
    harness.store.seed_payment(VICTIM, 1, U256::from(20 * FINNEY));
    harness.chain.with(|s| {
        s.estimate = Err(EngineError::InternalError {
            message: "execution reverted".to_string(),
        })
    });

    let err = harness
        .admission(BudgetMode::Ledger)
        .rescue(rescue_request(true))
        .await
        .unwrap_err();

    assert!(matches!(err, RescueError::Engine { .. }));
    assert!(harness.store.rescues().is_empty());
}
