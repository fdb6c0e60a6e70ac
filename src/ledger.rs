use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Store;
use crate::error::{invalid_input_error, not_found_error, Error};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Affordability {
    pub ok: bool,
    pub balance: Decimal,
    pub shortfall: Decimal,
}

impl Affordability {
    pub fn evaluate(balance: Decimal, amount: Decimal) -> Self {
        let shortfall = (amount - balance).max(Decimal::ZERO);

        Self {
            ok: shortfall.is_zero(),
            balance,
            shortfall,
        }
    }
}

/// Wallet balances. Every mutation row-locks the rider, so concurrent debits
/// against one wallet serialize while different riders never contend.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn balance(&self, rider_id: Uuid) -> Result<Decimal, Error> {
        let rider = self
            .store
            .find_rider(rider_id)
            .await?
            .ok_or_else(|| not_found_error("rider not found"))?;

        Ok(rider.wallet_balance)
    }

    /// Read-only; nothing is held back from the wallet.
    #[tracing::instrument(skip(self))]
    pub async fn check_and_reserve(
        &self,
        rider_id: Uuid,
        amount: Decimal,
    ) -> Result<Affordability, Error> {
        if amount.is_sign_negative() {
            return Err(invalid_input_error("amount must not be negative"));
        }

        let balance = self.balance(rider_id).await?;

        Ok(Affordability::evaluate(balance, amount))
    }

    /// Returns the balance after the debit.
    #[tracing::instrument(skip(self))]
    pub async fn debit(&self, rider_id: Uuid, amount: Decimal) -> Result<Decimal, Error> {
        let mut tx = self.store.begin().await?;

        let mut rider = tx.rider_for_update(rider_id).await?;
        let balance = rider.debit(amount)?;
        tx.update_rider(&rider).await?;

        tx.commit().await?;

        Ok(balance)
    }

    /// Returns the balance after the credit.
    #[tracing::instrument(skip(self))]
    pub async fn credit(&self, rider_id: Uuid, amount: Decimal) -> Result<Decimal, Error> {
        let mut tx = self.store.begin().await?;

        let mut rider = tx.rider_for_update(rider_id).await?;
        let balance = rider.credit(amount)?;
        tx.update_rider(&rider).await?;

        tx.commit().await?;

        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::entities::Rider;
    use crate::error::ErrorKind;
    use rust_decimal_macros::dec;

    async fn ledger_with_rider(balance: Decimal) -> (Ledger, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let mut rider = Rider::new(Uuid::new_v4(), "Divya".into());
        rider.wallet_balance = balance;
        store.insert_rider(&rider).await.unwrap();

        (Ledger::new(store), rider.id)
    }

    #[test]
    fn affordability_rule() {
        assert_eq!(
            Affordability::evaluate(dec!(100), dec!(210)),
            Affordability {
                ok: false,
                balance: dec!(100),
                shortfall: dec!(110),
            }
        );

        let exact = Affordability::evaluate(dec!(210), dec!(210));
        assert!(exact.ok);
        assert_eq!(exact.shortfall, dec!(0));
    }

    #[tokio::test]
    async fn debit_and_credit() {
        let (ledger, rider_id) = ledger_with_rider(dec!(100)).await;

        assert_eq!(ledger.credit(rider_id, dec!(150)).await.unwrap(), dec!(250));
        assert_eq!(ledger.debit(rider_id, dec!(210)).await.unwrap(), dec!(40));

        let err = ledger.debit(rider_id, dec!(41)).await.unwrap_err();
        assert_eq!(err.shortfall(), Some((dec!(40), dec!(1))));
        assert_eq!(ledger.balance(rider_id).await.unwrap(), dec!(40));

        let err = ledger.credit(rider_id, dec!(0)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn unknown_rider_is_not_found() {
        let (ledger, _) = ledger_with_rider(dec!(0)).await;

        let err = ledger.balance(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found_error());

        let err = ledger.debit(Uuid::new_v4(), dec!(1)).await.unwrap_err();
        assert!(err.is_not_found_error());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_debits_never_overdraw() {
        let (ledger, rider_id) = ledger_with_rider(dec!(100)).await;

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.debit(rider_id, dec!(30)).await })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 3);
        assert_eq!(ledger.balance(rider_id).await.unwrap(), dec!(10));
    }
}
