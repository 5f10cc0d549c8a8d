use alloy::primitives::Address;
use rescue_core::{chain::ChainTransaction, ledger::GasPayment};

/// A gas payment is a plain value transfer to the backend wallet whose calldata is exactly
/// the 20-byte compromised address it pays for.
pub const GAS_PAYMENT_PAYLOAD_LENGTH: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotToBackend,
    PayloadShape { length: usize },
    Reverted,
    Unmined,
}

/// Single extraction path for both explorer rows and directly fetched transactions.
pub fn classify(
    tx: &ChainTransaction,
    backend: Address,
    chain_id: u64,
) -> Result<GasPayment, Rejection> {
    if tx.to != Some(backend) {
        return Err(Rejection::NotToBackend);
    }
    if tx.input.len() != GAS_PAYMENT_PAYLOAD_LENGTH {
        return Err(Rejection::PayloadShape {
            length: tx.input.len(),
        });
    }
    if tx.success == Some(false) {
        return Err(Rejection::Reverted);
    }
    let Some(block_number) = tx.block_number else {
        return Err(Rejection::Unmined);
    };

    let compromised_address = Address::from_slice(&tx.input);

    Ok(GasPayment::new(
        compromised_address,
        tx.hash,
        tx.value,
        chain_id,
        block_number,
    ))
}

pub fn extract_gas_payment(
    tx: &ChainTransaction,
    backend: Address,
    chain_id: u64,
) -> Option<GasPayment> {
    classify(tx, backend, chain_id)
        .inspect_err(|reason| {
            tracing::trace!(hash = %tx.hash, ?reason, "Transaction is not a gas payment");
        })
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, TxHash, U256};

    const BACKEND: Address = Address::repeat_byte(0xbe);

    fn transfer(input: Vec<u8>) -> ChainTransaction {
        ChainTransaction {
            hash: TxHash::repeat_byte(0x01),
            from: Address::repeat_byte(0x02),
            to: Some(BACKEND),
            value: U256::from(5_000u64),
            input: Bytes::from(input),
            block_number: Some(77),
            success: Some(true),
        }
    }

    #[test]
    fn extracts_compromised_address_from_payload() {
        let victim = Address::repeat_byte(0xaa);
        let payment = extract_gas_payment(&transfer(victim.to_vec()), BACKEND, 10).unwrap();

        assert_eq!(payment.compromised_address, victim);
        assert_eq!(payment.eth_paid, U256::from(5_000u64));
        assert_eq!(payment.block_number, 77);
        assert_eq!(payment.chain_id, 10);
        assert_eq!(payment.gas_transaction_hash, TxHash::repeat_byte(0x01));
    }

    #[test]
    fn ignores_other_shapes() {
        assert_eq!(
            classify(&transfer(vec![0xaa; 21]), BACKEND, 1).unwrap_err(),
            Rejection::PayloadShape { length: 21 }
        );
        assert_eq!(
            classify(&transfer(vec![]), BACKEND, 1).unwrap_err(),
            Rejection::PayloadShape { length: 0 }
        );

        let mut elsewhere = transfer(vec![0xaa; 20]);
        elsewhere.to = Some(Address::repeat_byte(0x03));
        assert_eq!(classify(&elsewhere, BACKEND, 1).unwrap_err(), Rejection::NotToBackend);

        let mut creation = transfer(vec![0xaa; 20]);
        creation.to = None;
        assert_eq!(classify(&creation, BACKEND, 1).unwrap_err(), Rejection::NotToBackend);
    }

    #[test]
    fn ignores_reverted_and_pending_transfers() {
        let mut reverted = transfer(vec![0xaa; 20]);
        reverted.success = Some(false);
        assert_eq!(classify(&reverted, BACKEND, 1).unwrap_err(), Rejection::Reverted);

        let mut pending = transfer(vec![0xaa; 20]);
        pending.block_number = None;
        pending.success = None;
        assert_eq!(classify(&pending, BACKEND, 1).unwrap_err(), Rejection::Unmined);
    }
}
