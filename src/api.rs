use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::User;
use crate::db::PositionUpdate;
use crate::entities::{Coordinates, Driver, Place, Pricing, Ride, RideStatus, Rider, VehicleClass};
use crate::error::{invalid_input_error, Error};
use crate::ledger::Affordability;

pub const DEFAULT_HISTORY_LIMIT: i64 = 20;
pub const MAX_HISTORY_LIMIT: i64 = 100;
pub const RECENT_RIDES: i64 = 5;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BookingRequest {
    pub pickup: Place,
    pub dropoff: Place,
    pub vehicle_class: VehicleClass,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BookingTimings {
    pub parallel_reads_ms: i64,
    pub route_ms: i64,
    pub total_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub ride_id: Uuid,
    pub estimated_fare: Decimal,
    pub surge_multiplier: Decimal,
    pub distance_km: Decimal,
    pub duration_min: Decimal,
    pub candidate_count: usize,
    /// Distance and duration are the configured fallback, not a real route.
    pub degraded: bool,
    pub timings: BookingTimings,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub status: Option<RideStatus>,
    /// List rides the caller drove instead of rides the caller took.
    #[serde(default)]
    pub as_driver: bool,
}

impl HistoryQuery {
    /// Returns `(limit, offset)` with defaults applied.
    pub fn page(&self) -> Result<(i64, i64), Error> {
        let limit = self.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let offset = self.offset.unwrap_or(0);

        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(invalid_input_error(format!(
                "limit must be between 1 and {}",
                MAX_HISTORY_LIMIT
            )));
        }

        if offset < 0 {
            return Err(invalid_input_error("offset must not be negative"));
        }

        Ok((limit, offset))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewDriver {
    pub name: String,
    pub vehicle_class: VehicleClass,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewRider {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RiderUpdate {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RiderProfile {
    pub rider: Rider,
    pub completed_rides: i64,
    pub average_fare: Decimal,
    pub recent_rides: Vec<Ride>,
}

#[async_trait]
pub trait RideAPI {
    async fn book_ride(&self, user: User, request: BookingRequest) -> Result<Booking, Error>;

    async fn find_ride(&self, user: User, id: Uuid) -> Result<Ride, Error>;

    async fn accept_ride(&self, user: User, id: Uuid) -> Result<Ride, Error>;

    async fn mark_picked_up(&self, user: User, id: Uuid) -> Result<Ride, Error>;

    async fn complete_ride(&self, user: User, id: Uuid) -> Result<Ride, Error>;

    async fn cancel_ride(&self, user: User, id: Uuid, reason: String) -> Result<Ride, Error>;

    async fn ride_history(&self, user: User, query: HistoryQuery) -> Result<Vec<Ride>, Error>;
}

#[async_trait]
pub trait DriverAPI {
    async fn create_driver(&self, user: User, driver: NewDriver) -> Result<Driver, Error>;

    async fn find_driver(&self, user: User, id: Uuid) -> Result<Driver, Error>;

    async fn update_driver_location(
        &self,
        user: User,
        coordinates: Coordinates,
    ) -> Result<PositionUpdate, Error>;

    async fn toggle_driver_availability(&self, user: User) -> Result<Driver, Error>;

    async fn active_rides(&self, user: User) -> Result<Vec<Ride>, Error>;
}

#[async_trait]
pub trait RiderAPI {
    async fn create_rider(&self, user: User, rider: NewRider) -> Result<Rider, Error>;

    async fn rider_profile(&self, user: User) -> Result<RiderProfile, Error>;

    async fn update_rider(&self, user: User, update: RiderUpdate) -> Result<Rider, Error>;

    async fn add_funds(&self, user: User, amount: Decimal) -> Result<Rider, Error>;

    async fn check_funds(&self, user: User, amount: Decimal) -> Result<Affordability, Error>;
}

#[async_trait]
pub trait PricingAPI {
    async fn set_pricing(&self, user: User, pricing: Pricing) -> Result<Pricing, Error>;

    async fn find_pricing(&self, user: User, vehicle_class: VehicleClass)
        -> Result<Pricing, Error>;
}

pub trait API: RideAPI + DriverAPI + RiderAPI + PricingAPI {}

#[test]
fn history_page_defaults_and_bounds() {
    assert_eq!(HistoryQuery::default().page().unwrap(), (20, 0));

    let query = HistoryQuery {
        limit: Some(100),
        offset: Some(40),
        ..Default::default()
    };
    assert_eq!(query.page().unwrap(), (100, 40));

    let query = HistoryQuery {
        limit: Some(101),
        ..Default::default()
    };
    assert!(query.page().is_err());

    let query = HistoryQuery {
        offset: Some(-1),
        ..Default::default()
    };
    assert!(query.page().is_err());
}
