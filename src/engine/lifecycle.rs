use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::Store;
use crate::entities::{FareDetails, Place, Ride, Settlement, VehicleClass};
use crate::error::{invalid_transition_error, Error};

/// Outcome of a completed ride. The ride is committed either way;
/// `settlement_error` carries the `InsufficientFunds` error when the wallet
/// could not cover the fare.
#[derive(Debug)]
pub struct Completion {
    pub ride: Ride,
    pub settlement_error: Option<Error>,
}

/// Applies ride transitions atomically. Each transition locks the ride, then
/// the driver, then the rider, and either commits every row or none.
#[derive(Clone)]
pub struct Lifecycle {
    store: Arc<dyn Store>,
}

impl Lifecycle {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, fare))]
    pub async fn create(
        &self,
        rider_id: Uuid,
        vehicle_class: VehicleClass,
        pickup: Place,
        dropoff: Place,
        fare: FareDetails,
    ) -> Result<Ride, Error> {
        let ride = Ride::new(rider_id, vehicle_class, pickup, dropoff, fare)?;

        self.store.insert_ride(&ride).await?;

        tracing::info!(ride_id = %ride.id, "ride requested");

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    pub async fn accept(&self, ride_id: Uuid, driver_id: Uuid) -> Result<Ride, Error> {
        let mut tx = self.store.begin().await?;

        let mut ride = tx.ride_for_update(ride_id).await?;
        ride.accept(driver_id)?;

        let mut driver = tx.driver_for_update(driver_id).await?;
        if driver.vehicle_class != ride.vehicle_class {
            return Err(invalid_transition_error(
                "driver vehicle class does not match the ride",
            ));
        }
        driver.assign(ride_id)?;

        let ride = tx.update_ride(&ride).await?;
        tx.update_driver(&driver).await?;

        tx.commit().await?;

        tracing::info!("ride accepted");

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    pub async fn pick_up(&self, ride_id: Uuid, driver_id: Uuid) -> Result<Ride, Error> {
        let mut tx = self.store.begin().await?;

        let mut ride = tx.ride_for_update(ride_id).await?;
        ride.pick_up(driver_id)?;

        let ride = tx.update_ride(&ride).await?;

        tx.commit().await?;

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    pub async fn complete(&self, ride_id: Uuid, driver_id: Uuid) -> Result<Completion, Error> {
        let mut tx = self.store.begin().await?;

        let mut ride = tx.ride_for_update(ride_id).await?;
        let amount = ride.complete(driver_id)?;

        let mut driver = tx.driver_for_update(driver_id).await?;
        if !driver.free(ride_id) {
            tracing::warn!("driver was not assigned to the completed ride");
        }

        let mut rider = tx.rider_for_update(ride.rider_id).await?;

        let settlement_error = if amount <= Decimal::ZERO {
            ride.settle(Settlement::Settled);
            None
        } else {
            match rider.debit(amount) {
                Ok(_) => {
                    ride.settle(Settlement::Settled);
                    None
                }
                Err(err) => match err.shortfall() {
                    Some((_, shortfall)) => {
                        tracing::warn!(%shortfall, "wallet could not cover the fare");
                        ride.settle(Settlement::Discrepancy { shortfall });
                        Some(err)
                    }
                    None => return Err(err),
                },
            }
        };

        rider.trip_count += 1;

        let ride = tx.update_ride(&ride).await?;
        tx.update_driver(&driver).await?;
        tx.update_rider(&rider).await?;

        tx.commit().await?;

        tracing::info!("ride completed");

        Ok(Completion {
            ride,
            settlement_error,
        })
    }

    /// `authorize` sees the locked ride before it changes.
    #[tracing::instrument(skip(self, authorize))]
    pub async fn cancel<F>(
        &self,
        ride_id: Uuid,
        actor_id: Uuid,
        reason: String,
        authorize: F,
    ) -> Result<Ride, Error>
    where
        F: FnOnce(&Ride) -> Result<(), Error> + Send,
    {
        let mut tx = self.store.begin().await?;

        let mut ride = tx.ride_for_update(ride_id).await?;
        authorize(&ride)?;

        let assigned = ride.cancel(actor_id, reason)?;

        if let Some(driver_id) = assigned {
            let mut driver = tx.driver_for_update(driver_id).await?;
            driver.free(ride_id);
            tx.update_driver(&driver).await?;
        }

        let ride = tx.update_ride(&ride).await?;

        tx.commit().await?;

        tracing::info!("ride cancelled");

        Ok(ride)
    }
}
