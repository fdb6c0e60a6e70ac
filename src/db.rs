//! Transactional store seam.
//!
//! The engine never mutates rides, drivers or wallets in memory. Every change
//! goes through a [`Tx`]: rows are locked with `*_for_update` in the fixed
//! order ride, driver, rider, mutated through entity methods, written back with
//! a version check on rides, and committed together. Dropping a `Tx` without
//! committing rolls it back.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::entities::{
    Coordinates, Driver, Pricing, RequestLog, Ride, RideStatus, Rider, VehicleClass,
};
use crate::error::Error;
use crate::geo::BoundingBox;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionUpdate {
    Applied,
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Participant {
    Rider(Uuid),
    Driver(Uuid),
}

#[derive(Clone, Debug)]
pub struct RideFilter {
    pub participant: Participant,
    /// Empty means any status.
    pub statuses: Vec<RideStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl RideFilter {
    fn matches(&self, ride: &Ride) -> bool {
        let participant = match self.participant {
            Participant::Rider(id) => ride.rider_id == id,
            Participant::Driver(id) => ride.driver_id == Some(id),
        };

        participant && (self.statuses.is_empty() || self.statuses.contains(&ride.status))
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Tx>, Error>;

    async fn insert_rider(&self, rider: &Rider) -> Result<(), Error>;
    async fn find_rider(&self, id: Uuid) -> Result<Option<Rider>, Error>;

    async fn insert_driver(&self, driver: &Driver) -> Result<(), Error>;
    async fn find_driver(&self, id: Uuid) -> Result<Option<Driver>, Error>;
    async fn update_driver_position(
        &self,
        id: Uuid,
        position: Coordinates,
        at: DateTime<Utc>,
    ) -> Result<PositionUpdate, Error>;
    async fn available_drivers_within(
        &self,
        vehicle_class: VehicleClass,
        bounds: &BoundingBox,
    ) -> Result<Vec<Driver>, Error>;

    async fn upsert_pricing(&self, pricing: &Pricing) -> Result<(), Error>;
    async fn find_pricing(&self, vehicle_class: VehicleClass) -> Result<Option<Pricing>, Error>;

    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error>;
    async fn find_ride(&self, id: Uuid) -> Result<Option<Ride>, Error>;
    /// Newest first.
    async fn list_rides(&self, filter: &RideFilter) -> Result<Vec<Ride>, Error>;
    async fn completed_trip_count(&self, rider_id: Uuid) -> Result<i64, Error>;
    /// Mean fare of the rider's completed rides to the cent, zero when there are none.
    async fn average_completed_fare(&self, rider_id: Uuid) -> Result<Decimal, Error>;

    async fn insert_request_log(&self, log: &RequestLog) -> Result<(), Error>;
}

#[async_trait]
pub trait Tx: Send {
    async fn ride_for_update(&mut self, id: Uuid) -> Result<Ride, Error>;
    async fn driver_for_update(&mut self, id: Uuid) -> Result<Driver, Error>;
    async fn rider_for_update(&mut self, id: Uuid) -> Result<Rider, Error>;

    /// Writes `ride` if the stored version still equals `ride.version` and
    /// returns the row as written (version bumped).
    async fn update_ride(&mut self, ride: &Ride) -> Result<Ride, Error>;
    /// Writes the driver's status; the position is owned by
    /// [`Store::update_driver_position`].
    async fn update_driver(&mut self, driver: &Driver) -> Result<(), Error>;
    async fn update_rider(&mut self, rider: &Rider) -> Result<(), Error>;

    async fn commit(self: Box<Self>) -> Result<(), Error>;
}
