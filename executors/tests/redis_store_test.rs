use alloy::primitives::{Address, TxHash, U256};
use chrono::Utc;
use redis::AsyncCommands;
use rescue_core::ledger::{GasPayment, RescueStatus, RescueTransaction};
use rescue_executors::store::{LedgerStore, LedgerStoreError, RedisLedgerStore, ledger_view};
use uuid::Uuid;

const REDIS_URL: &str = "redis://127.0.0.1:6379/";

async fn store() -> (RedisLedgerStore, redis::aio::ConnectionManager) {
    let client = redis::Client::open(REDIS_URL).unwrap();
    let conn = client.get_connection_manager().await.unwrap();
    let namespace = format!("rescue_test:{}", Uuid::new_v4());
    (RedisLedgerStore::new(conn.clone(), Some(namespace)), conn)
}

async fn cleanup(store: &RedisLedgerStore, conn: &mut redis::aio::ConnectionManager) {
    let keys: Vec<String> = conn
        .keys(format!("{}*", store.gas_payments_key().trim_end_matches("gas_payments")))
        .await
        .unwrap();
    if !keys.is_empty() {
        let _: () = conn.del(keys).await.unwrap();
    }
}

#[tokio::test]
#[ignore = "requires a local redis"]
async fn gas_payment_insert_is_unique_per_hash() {
    let (store, mut conn) = store().await;
    let who = Address::repeat_byte(0xaa);
    let payment = GasPayment::new(who, TxHash::repeat_byte(1), U256::from(700u64), 1, 10);

    assert!(store.insert_gas_payment(&payment).await.unwrap());
    let duplicate = GasPayment {
        eth_paid: U256::from(1u64),
        ..GasPayment::new(who, payment.gas_transaction_hash, U256::ZERO, 1, 11)
    };
    assert!(!store.insert_gas_payment(&duplicate).await.unwrap());

    let stored = store
        .get_gas_payment(payment.gas_transaction_hash)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, payment);
    assert_eq!(store.gas_payments_for(1, who).await.unwrap().len(), 1);
    assert!(store.gas_payments_for(2, who).await.unwrap().is_empty());

    cleanup(&store, &mut conn).await;
}

#[tokio::test]
#[ignore = "requires a local redis"]
async fn rescue_lifecycle_and_ledger_view() {
    let (store, mut conn) = store().await;
    let who = Address::repeat_byte(0xbb);
    store
        .insert_gas_payment(&GasPayment::new(who, TxHash::repeat_byte(2), U256::from(1_000u64), 1, 5))
        .await
        .unwrap();

    let mut record = RescueTransaction {
        id: Uuid::new_v4(),
        compromised_address: who,
        receiver_address: Address::repeat_byte(0x55),
        tokens: vec![Address::repeat_byte(0x44)],
        gas_transaction_hash: None,
        rescue_transaction_hash: None,
        gas_used: None,
        eth_used: None,
        chain_id: 1,
        deadline: 1_900_000_000,
        status: RescueStatus::Pending,
        created_at: Utc::now(),
    };

    let missing = store.update_rescue_transaction(&record).await.unwrap_err();
    assert!(matches!(missing, LedgerStoreError::RescueTransactionNotFound { .. }));

    store.create_rescue_transaction(&record).await.unwrap();
    record.status = RescueStatus::Success;
    record.gas_used = Some(10);
    record.eth_used = Some(U256::from(400u64));
    store.update_rescue_transaction(&record).await.unwrap();

    let loaded = store.get_rescue_transaction(record.id).await.unwrap().unwrap();
    assert_eq!(loaded, record);

    let view = ledger_view(&store, 1, who).await.unwrap();
    assert_eq!(view.payments.len(), 1);
    assert_eq!(view.rescues.len(), 1);
    assert_eq!(view.balance.remaining(), U256::from(600u64));

    cleanup(&store, &mut conn).await;
}

#[tokio::test]
#[ignore = "requires a local redis"]
async fn checkpoint_only_moves_forward() {
    let (store, mut conn) = store().await;

    assert!(store.get_checkpoint(8453).await.unwrap().is_none());
    assert!(store.advance_checkpoint(8453, 100).await.unwrap());
    assert!(!store.advance_checkpoint(8453, 99).await.unwrap());
    assert!(!store.advance_checkpoint(8453, 100).await.unwrap());
    assert!(store.advance_checkpoint(8453, 101).await.unwrap());

    let checkpoint = store.get_checkpoint(8453).await.unwrap().unwrap();
    assert_eq!(checkpoint.last_block, 101);
    assert_eq!(checkpoint.chain_id, 8453);

    cleanup(&store, &mut conn).await;
}
