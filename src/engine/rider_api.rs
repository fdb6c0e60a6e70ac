use super::Engine;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{
    api::{NewRider, RiderAPI, RiderProfile, RiderUpdate, RECENT_RIDES},
    auth::{Platform, User},
    db::{Participant, RideFilter},
    entities::Rider,
    error::{invalid_input_error, not_found_error, Error},
    ledger::Affordability,
};

#[async_trait]
impl RiderAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn create_rider(&self, user: User, new_rider: NewRider) -> Result<Rider, Error> {
        self.authorize(user.clone(), "book_ride", Platform::default())?;

        let name = new_rider.name.trim();
        if name.is_empty() {
            return Err(invalid_input_error("name must not be empty"));
        }

        let rider = Rider::new(user.id, name.into());

        self.store.insert_rider(&rider).await?;

        Ok(rider)
    }

    #[tracing::instrument(skip(self))]
    async fn rider_profile(&self, user: User) -> Result<RiderProfile, Error> {
        let recent = RideFilter {
            participant: Participant::Rider(user.id),
            statuses: vec![],
            limit: RECENT_RIDES,
            offset: 0,
        };

        let (rider, completed_rides, average_fare, recent_rides) = futures::try_join!(
            self.store.find_rider(user.id),
            self.store.completed_trip_count(user.id),
            self.store.average_completed_fare(user.id),
            self.store.list_rides(&recent),
        )?;

        let rider = rider.ok_or_else(|| not_found_error("rider not found"))?;

        Ok(RiderProfile {
            rider,
            completed_rides,
            average_fare,
            recent_rides,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn update_rider(&self, user: User, update: RiderUpdate) -> Result<Rider, Error> {
        self.authorize(user.clone(), "book_ride", Platform::default())?;

        let name = update.name.trim();
        if name.is_empty() {
            return Err(invalid_input_error("name must not be empty"));
        }

        let mut tx = self.store.begin().await?;

        let mut rider = tx.rider_for_update(user.id).await?;
        rider.name = name.into();
        tx.update_rider(&rider).await?;

        tx.commit().await?;

        Ok(rider)
    }

    #[tracing::instrument(skip(self))]
    async fn add_funds(&self, user: User, amount: Decimal) -> Result<Rider, Error> {
        self.authorize(user.clone(), "book_ride", Platform::default())?;

        let balance = self.ledger.credit(user.id, amount).await?;

        tracing::info!(%balance, "wallet credited");

        self.store
            .find_rider(user.id)
            .await?
            .ok_or_else(|| not_found_error("rider not found"))
    }

    #[tracing::instrument(skip(self))]
    async fn check_funds(&self, user: User, amount: Decimal) -> Result<Affordability, Error> {
        self.ledger.check_and_reserve(user.id, amount).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;
    use crate::db::MemoryStore;
    use crate::engine::testing::{
        dispatch_config, engine, fare_details, place, rider_user, seed_driver, seed_rider,
    };
    use crate::entities::VehicleClass;
    use crate::error::ErrorKind;
    use crate::external::StraightLine;

    #[tokio::test]
    async fn wallet_top_up_and_profile() {
        let store = Arc::new(MemoryStore::new());
        let (engine, _) = engine(store.clone(), Arc::new(StraightLine), dispatch_config());
        let user = User::new(Uuid::new_v4(), &["rider"]);

        let rider = engine
            .create_rider(user.clone(), NewRider { name: "Lakshmi".into() })
            .await
            .unwrap();
        assert_eq!(rider.wallet_balance, dec!(0));

        let rider = engine.add_funds(user.clone(), dec!(250.50)).await.unwrap();
        assert_eq!(rider.wallet_balance, dec!(250.50));

        let err = engine.add_funds(user.clone(), dec!(-10)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);

        let affordability = engine.check_funds(user.clone(), dec!(300)).await.unwrap();
        assert!(!affordability.ok);
        assert_eq!(affordability.shortfall, dec!(49.50));

        let profile = engine.rider_profile(user.clone()).await.unwrap();
        assert_eq!(profile.rider.wallet_balance, dec!(250.50));
        assert_eq!(profile.completed_rides, 0);
        assert_eq!(profile.average_fare, dec!(0));
        assert!(profile.recent_rides.is_empty());

        let rider = engine
            .update_rider(user.clone(), RiderUpdate { name: " Lakshmi R ".into() })
            .await
            .unwrap();
        assert_eq!(rider.name, "Lakshmi R");
        assert_eq!(rider.wallet_balance, dec!(250.50));

        let err = engine
            .update_rider(user, RiderUpdate { name: "  ".into() })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn profile_averages_completed_fares() {
        let store = Arc::new(MemoryStore::new());
        let rider = seed_rider(&store, dec!(1000)).await;
        let driver = seed_driver(&store, VehicleClass::Sedan, 12.97, 77.59).await;
        let (engine, _) = engine(store.clone(), Arc::new(StraightLine), dispatch_config());

        for total in [dec!(100), dec!(150.25)] {
            let ride = engine
                .lifecycle
                .create(
                    rider.id,
                    VehicleClass::Sedan,
                    place(12.9716, 77.5946),
                    place(12.9352, 77.6245),
                    fare_details(total),
                )
                .await
                .unwrap();
            engine.lifecycle.accept(ride.id, driver.id).await.unwrap();
            engine.lifecycle.pick_up(ride.id, driver.id).await.unwrap();
            engine.lifecycle.complete(ride.id, driver.id).await.unwrap();
        }

        // a requested ride shows up as recent but not in the average
        engine
            .lifecycle
            .create(
                rider.id,
                VehicleClass::Sedan,
                place(12.9716, 77.5946),
                place(12.9352, 77.6245),
                fare_details(dec!(999)),
            )
            .await
            .unwrap();

        let profile = engine.rider_profile(rider_user(&rider)).await.unwrap();
        assert_eq!(profile.completed_rides, 2);
        assert_eq!(profile.average_fare, dec!(125.13));
        assert_eq!(profile.recent_rides.len(), 3);
        assert_eq!(profile.rider.wallet_balance, dec!(749.75));
    }

    #[tokio::test]
    async fn profile_requires_a_rider() {
        let store = Arc::new(MemoryStore::new());
        let (engine, _) = engine(store.clone(), Arc::new(StraightLine), dispatch_config());
        let user = User::new(Uuid::new_v4(), &["rider"]);

        let err = engine.rider_profile(user.clone()).await.unwrap_err();
        assert!(err.is_not_found_error());

        let driver = User::new(Uuid::new_v4(), &["driver"]);
        let err = engine
            .create_rider(driver, NewRider { name: "Rahul".into() })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
    }
}
