//! Fixtures shared by the engine tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::Engine;
use crate::auth::User;
use crate::config::DispatchConfig;
use crate::db::{MemoryStore, PositionUpdate, RideFilter, Store, Tx};
use crate::entities::{
    Coordinates, Driver, FareDetails, Place, Pricing, RequestLog, Ride, Rider, VehicleClass,
};
use crate::error::{database_error, upstream_error, Error};
use crate::external::{RouteEstimate, RouteOracle};
use crate::fare::SurgeSchedule;
use crate::geo::BoundingBox;
use crate::notify::ChannelHub;

pub fn place(lat: f64, lng: f64) -> Place {
    Place::new(Coordinates { lat, lng }, None)
}

pub fn fare_details(total_fare: Decimal) -> FareDetails {
    FareDetails {
        distance_km: Decimal::from(10),
        duration_min: Decimal::from(20),
        base_fare: Decimal::from(50),
        surge_multiplier: Decimal::ONE,
        total_fare,
        degraded: false,
    }
}

pub async fn seed_rider(store: &MemoryStore, balance: Decimal) -> Rider {
    let mut rider = Rider::new(Uuid::new_v4(), "rider".into());
    rider.wallet_balance = balance;

    store.insert_rider(&rider).await.unwrap();

    rider
}

/// Inserts an available driver at the given position.
pub async fn seed_driver(
    store: &MemoryStore,
    vehicle_class: VehicleClass,
    lat: f64,
    lng: f64,
) -> Driver {
    let mut driver = Driver::new(Uuid::new_v4(), "driver".into(), vehicle_class);
    driver.toggle().unwrap();

    store.insert_driver(&driver).await.unwrap();
    store
        .update_driver_position(driver.id, Coordinates { lat, lng }, Utc::now())
        .await
        .unwrap();

    driver
}

pub fn rider_user(rider: &Rider) -> User {
    User::new(rider.id, &["rider"])
}

pub fn driver_user(driver: &Driver) -> User {
    User::new(driver.id, &["driver"])
}

/// Config that never surges and answers quickly.
pub fn dispatch_config() -> DispatchConfig {
    DispatchConfig {
        read_timeout: Duration::from_millis(200),
        route_timeout: Duration::from_millis(200),
        surge: SurgeSchedule::flat(),
        ..DispatchConfig::default()
    }
}

pub fn engine(
    store: Arc<dyn Store>,
    oracle: Arc<dyn RouteOracle>,
    config: DispatchConfig,
) -> (Engine, Arc<ChannelHub>) {
    let hub = Arc::new(ChannelHub::new());
    let engine = Engine::new(store, oracle, hub.clone(), config).unwrap();

    (engine, hub)
}

pub struct FixedRoute(pub RouteEstimate);

#[async_trait]
impl RouteOracle for FixedRoute {
    async fn route(&self, _: Coordinates, _: Coordinates) -> Result<RouteEstimate, Error> {
        Ok(self.0)
    }
}

pub struct FailingRoute;

#[async_trait]
impl RouteOracle for FailingRoute {
    async fn route(&self, _: Coordinates, _: Coordinates) -> Result<RouteEstimate, Error> {
        Err(upstream_error("directions unavailable"))
    }
}

pub struct SlowRoute(pub Duration);

#[async_trait]
impl RouteOracle for SlowRoute {
    async fn route(&self, origin: Coordinates, _: Coordinates) -> Result<RouteEstimate, Error> {
        tokio::time::sleep(self.0).await;

        Ok(RouteEstimate {
            distance_km: origin.lat.abs(),
            duration_min: 1.0,
        })
    }
}

/// Which reads a [`FaultyStore`] breaks.
#[derive(Clone, Copy, Debug)]
pub enum Fault {
    /// Trip count and request log writes fail.
    Analytics,
    /// The pricing read fails.
    Pricing,
    /// The driver search stalls for the given time.
    SlowDrivers(Duration),
}

/// Delegates to a [`MemoryStore`] except for the reads named by its [`Fault`].
pub struct FaultyStore(pub MemoryStore, pub Fault);

#[async_trait]
impl Store for FaultyStore {
    async fn begin(&self) -> Result<Box<dyn Tx>, Error> {
        self.0.begin().await
    }

    async fn insert_rider(&self, rider: &Rider) -> Result<(), Error> {
        self.0.insert_rider(rider).await
    }

    async fn find_rider(&self, id: Uuid) -> Result<Option<Rider>, Error> {
        self.0.find_rider(id).await
    }

    async fn insert_driver(&self, driver: &Driver) -> Result<(), Error> {
        self.0.insert_driver(driver).await
    }

    async fn find_driver(&self, id: Uuid) -> Result<Option<Driver>, Error> {
        self.0.find_driver(id).await
    }

    async fn update_driver_position(
        &self,
        id: Uuid,
        position: Coordinates,
        at: DateTime<Utc>,
    ) -> Result<PositionUpdate, Error> {
        self.0.update_driver_position(id, position, at).await
    }

    async fn available_drivers_within(
        &self,
        vehicle_class: VehicleClass,
        bounds: &BoundingBox,
    ) -> Result<Vec<Driver>, Error> {
        if let Fault::SlowDrivers(delay) = self.1 {
            tokio::time::sleep(delay).await;
        }

        self.0.available_drivers_within(vehicle_class, bounds).await
    }

    async fn upsert_pricing(&self, pricing: &Pricing) -> Result<(), Error> {
        self.0.upsert_pricing(pricing).await
    }

    async fn find_pricing(&self, vehicle_class: VehicleClass) -> Result<Option<Pricing>, Error> {
        match self.1 {
            Fault::Pricing => Err(database_error("connection reset by peer")),
            _ => self.0.find_pricing(vehicle_class).await,
        }
    }

    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error> {
        self.0.insert_ride(ride).await
    }

    async fn find_ride(&self, id: Uuid) -> Result<Option<Ride>, Error> {
        self.0.find_ride(id).await
    }

    async fn list_rides(&self, filter: &RideFilter) -> Result<Vec<Ride>, Error> {
        self.0.list_rides(filter).await
    }

    async fn completed_trip_count(&self, rider_id: Uuid) -> Result<i64, Error> {
        match self.1 {
            Fault::Analytics => Err(upstream_error("analytics replica unavailable")),
            _ => self.0.completed_trip_count(rider_id).await,
        }
    }

    async fn average_completed_fare(&self, rider_id: Uuid) -> Result<Decimal, Error> {
        match self.1 {
            Fault::Analytics => Err(upstream_error("analytics replica unavailable")),
            _ => self.0.average_completed_fare(rider_id).await,
        }
    }

    async fn insert_request_log(&self, log: &RequestLog) -> Result<(), Error> {
        match self.1 {
            Fault::Analytics => Err(upstream_error("analytics replica unavailable")),
            _ => self.0.insert_request_log(log).await,
        }
    }
}
