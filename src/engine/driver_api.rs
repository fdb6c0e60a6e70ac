use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::{DriverAPI, NewDriver, MAX_HISTORY_LIMIT},
    auth::{Platform, User},
    db::{Participant, PositionUpdate, RideFilter},
    entities::{Coordinates, Driver, Ride, RideStatus},
    error::{invalid_input_error, not_found_error, Error},
    notify::{Event, Topic},
};

#[async_trait]
impl DriverAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn create_driver(&self, user: User, new_driver: NewDriver) -> Result<Driver, Error> {
        self.authorize(user.clone(), "drive", Platform::default())?;

        let name = new_driver.name.trim();
        if name.is_empty() {
            return Err(invalid_input_error("name must not be empty"));
        }

        let driver = Driver::new(user.id, name.into(), new_driver.vehicle_class);

        self.store.insert_driver(&driver).await?;

        Ok(driver)
    }

    #[tracing::instrument(skip(self))]
    async fn find_driver(&self, user: User, id: Uuid) -> Result<Driver, Error> {
        self.authorize(user, "read", Platform::default())?;

        self.store
            .find_driver(id)
            .await?
            .ok_or_else(|| not_found_error("driver not found"))
    }

    #[tracing::instrument(skip(self))]
    async fn update_driver_location(
        &self,
        user: User,
        coordinates: Coordinates,
    ) -> Result<PositionUpdate, Error> {
        self.authorize(user.clone(), "drive", Platform::default())?;

        let outcome = self.geo.update_position(user.id, coordinates).await?;

        if outcome == PositionUpdate::Applied {
            let active_ride = self
                .store
                .find_driver(user.id)
                .await?
                .and_then(|driver| driver.active_ride());

            if let Some(ride_id) = active_ride {
                let ride = self.store.find_ride(ride_id).await?;

                if let Some(ride) = ride.filter(|ride| !ride.status.is_terminal()) {
                    self.emit(
                        Topic::Rider(ride.rider_id),
                        Event::DriverMoved {
                            ride_id,
                            driver_id: user.id,
                            position: coordinates,
                        },
                    );
                }
            }
        }

        Ok(outcome)
    }

    #[tracing::instrument(skip(self))]
    async fn toggle_driver_availability(&self, user: User) -> Result<Driver, Error> {
        self.authorize(user.clone(), "drive", Platform::default())?;

        let mut tx = self.store.begin().await?;

        let mut driver = tx.driver_for_update(user.id).await?;
        driver.toggle()?;
        tx.update_driver(&driver).await?;

        tx.commit().await?;

        tracing::info!(status = %driver.status.name(), "driver availability changed");

        Ok(driver)
    }

    #[tracing::instrument(skip(self))]
    async fn active_rides(&self, user: User) -> Result<Vec<Ride>, Error> {
        self.authorize(user.clone(), "drive", Platform::default())?;

        self.store
            .list_rides(&RideFilter {
                participant: Participant::Driver(user.id),
                statuses: vec![RideStatus::Accepted, RideStatus::PickedUp],
                limit: MAX_HISTORY_LIMIT,
                offset: 0,
            })
            .await
    }
}
