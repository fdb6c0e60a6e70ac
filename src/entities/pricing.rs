use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::VehicleClass;
use crate::error::{invalid_input_error, Error};

/// One row of the pricing table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub vehicle_class: VehicleClass,
    pub base_fare: Decimal,
    pub per_km_rate: Decimal,
    pub per_min_rate: Decimal,
}

impl Pricing {
    pub fn validate(&self) -> Result<(), Error> {
        if self.base_fare.is_sign_negative()
            || self.per_km_rate.is_sign_negative()
            || self.per_min_rate.is_sign_negative()
        {
            return Err(invalid_input_error("pricing rates must not be negative"));
        }

        Ok(())
    }
}
