use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{insufficient_funds_error, invalid_input_error, Error};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rider {
    pub id: Uuid,
    pub name: String,
    pub wallet_balance: Decimal,
    pub trip_count: i64,
}

impl Rider {
    pub fn new(user_id: Uuid, name: String) -> Self {
        Self {
            id: user_id,
            name,
            wallet_balance: Decimal::ZERO,
            trip_count: 0,
        }
    }

    /// Subtracts `amount` from the wallet. The balance never goes negative.
    pub fn debit(&mut self, amount: Decimal) -> Result<Decimal, Error> {
        ensure_positive(amount)?;

        if self.wallet_balance < amount {
            return Err(insufficient_funds_error(
                self.wallet_balance,
                amount - self.wallet_balance,
            ));
        }

        self.wallet_balance -= amount;
        Ok(self.wallet_balance)
    }

    pub fn credit(&mut self, amount: Decimal) -> Result<Decimal, Error> {
        ensure_positive(amount)?;

        self.wallet_balance += amount;
        Ok(self.wallet_balance)
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), Error> {
    if amount <= Decimal::ZERO {
        return Err(invalid_input_error("amount must be positive"));
    }

    Ok(())
}

#[test]
fn debit_never_overdraws() {
    use rust_decimal_macros::dec;

    let mut rider = Rider::new(Uuid::new_v4(), "Ravi".into());
    rider.credit(dec!(100)).unwrap();

    let err = rider.debit(dec!(210)).unwrap_err();
    assert_eq!(err.shortfall(), Some((dec!(100), dec!(110))));
    assert_eq!(rider.wallet_balance, dec!(100));

    assert_eq!(rider.debit(dec!(99.99)).unwrap(), dec!(0.01));
    assert!(rider.credit(dec!(0)).is_err());
    assert!(rider.debit(dec!(-5)).is_err());
}
