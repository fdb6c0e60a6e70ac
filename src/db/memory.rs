use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{PositionUpdate, RideFilter, Store, Tx};
use crate::entities::{
    Coordinates, Driver, Pricing, RequestLog, Ride, RideStatus, Rider, VehicleClass,
};
use crate::error::{invalid_input_error, invalid_transition_error, not_found_error, Error};
use crate::geo::BoundingBox;

/// Committed rows plus one async mutex per row, standing in for row locks.
struct Table<T> {
    rows: RwLock<HashMap<Uuid, T>>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl<T: Clone> Table<T> {
    fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn get(&self, id: &Uuid) -> Option<T> {
        self.rows.read().await.get(id).cloned()
    }

    async fn insert(&self, id: Uuid, row: T, what: &str) -> Result<(), Error> {
        let mut rows = self.rows.write().await;

        if rows.contains_key(&id) {
            return Err(invalid_input_error(format!("{} already exists", what)));
        }

        rows.insert(id, row);
        Ok(())
    }

    async fn lock(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .await
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        lock.lock_owned().await
    }
}

struct Tables {
    riders: Table<Rider>,
    drivers: Table<Driver>,
    rides: Table<Ride>,
    pricing: RwLock<HashMap<VehicleClass, Pricing>>,
    request_logs: RwLock<Vec<RequestLog>>,
}

/// In-process implementation of [`Store`] with the same transactional
/// contract as [`super::PgStore`]. Used by the tests and for local runs.
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Tables>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Tables {
                riders: Table::new(),
                drivers: Table::new(),
                rides: Table::new(),
                pricing: RwLock::new(HashMap::new()),
                request_logs: RwLock::new(Vec::new()),
            }),
        }
    }

    pub async fn request_logs(&self) -> Vec<RequestLog> {
        self.tables.request_logs.read().await.clone()
    }

    pub async fn ride_count(&self) -> usize {
        self.tables.rides.rows.read().await.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Tx>, Error> {
        Ok(Box::new(MemoryTx {
            tables: self.tables.clone(),
            guards: HashMap::new(),
            rides: HashMap::new(),
            drivers: HashMap::new(),
            riders: HashMap::new(),
        }))
    }

    async fn insert_rider(&self, rider: &Rider) -> Result<(), Error> {
        self.tables
            .riders
            .insert(rider.id, rider.clone(), "rider")
            .await
    }

    async fn find_rider(&self, id: Uuid) -> Result<Option<Rider>, Error> {
        Ok(self.tables.riders.get(&id).await)
    }

    async fn insert_driver(&self, driver: &Driver) -> Result<(), Error> {
        self.tables
            .drivers
            .insert(driver.id, driver.clone(), "driver")
            .await
    }

    async fn find_driver(&self, id: Uuid) -> Result<Option<Driver>, Error> {
        Ok(self.tables.drivers.get(&id).await)
    }

    async fn update_driver_position(
        &self,
        id: Uuid,
        position: Coordinates,
        at: DateTime<Utc>,
    ) -> Result<PositionUpdate, Error> {
        let mut rows = self.tables.drivers.rows.write().await;
        let driver = rows
            .get_mut(&id)
            .ok_or_else(|| not_found_error("driver not found"))?;

        if matches!(driver.position_updated_at, Some(previous) if previous > at) {
            return Ok(PositionUpdate::Stale);
        }

        driver.position = Some(position);
        driver.position_updated_at = Some(at);

        Ok(PositionUpdate::Applied)
    }

    async fn available_drivers_within(
        &self,
        vehicle_class: VehicleClass,
        bounds: &BoundingBox,
    ) -> Result<Vec<Driver>, Error> {
        let rows = self.tables.drivers.rows.read().await;

        Ok(rows
            .values()
            .filter(|driver| driver.is_available() && driver.vehicle_class == vehicle_class)
            .filter(|driver| matches!(&driver.position, Some(p) if bounds.contains(p)))
            .cloned()
            .collect())
    }

    async fn upsert_pricing(&self, pricing: &Pricing) -> Result<(), Error> {
        self.tables
            .pricing
            .write()
            .await
            .insert(pricing.vehicle_class, pricing.clone());

        Ok(())
    }

    async fn find_pricing(&self, vehicle_class: VehicleClass) -> Result<Option<Pricing>, Error> {
        Ok(self.tables.pricing.read().await.get(&vehicle_class).cloned())
    }

    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error> {
        self.tables.rides.insert(ride.id, ride.clone(), "ride").await
    }

    async fn find_ride(&self, id: Uuid) -> Result<Option<Ride>, Error> {
        Ok(self.tables.rides.get(&id).await)
    }

    async fn list_rides(&self, filter: &RideFilter) -> Result<Vec<Ride>, Error> {
        let rows = self.tables.rides.rows.read().await;

        let mut rides: Vec<Ride> = rows
            .values()
            .filter(|ride| filter.matches(ride))
            .cloned()
            .collect();

        rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(rides
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn completed_trip_count(&self, rider_id: Uuid) -> Result<i64, Error> {
        let rows = self.tables.rides.rows.read().await;

        Ok(rows
            .values()
            .filter(|ride| ride.rider_id == rider_id && ride.status == RideStatus::Completed)
            .count() as i64)
    }

    async fn average_completed_fare(&self, rider_id: Uuid) -> Result<Decimal, Error> {
        let rows = self.tables.rides.rows.read().await;

        let fares: Vec<Decimal> = rows
            .values()
            .filter(|ride| ride.rider_id == rider_id && ride.status == RideStatus::Completed)
            .map(|ride| ride.fare.total_fare)
            .collect();

        if fares.is_empty() {
            return Ok(Decimal::ZERO);
        }

        let total: Decimal = fares.iter().sum();

        Ok((total / Decimal::from(fares.len()))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    async fn insert_request_log(&self, log: &RequestLog) -> Result<(), Error> {
        self.tables.request_logs.write().await.push(log.clone());
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Ride(Uuid),
    Driver(Uuid),
    Rider(Uuid),
}

struct MemoryTx {
    tables: Arc<Tables>,
    guards: HashMap<RowKey, OwnedMutexGuard<()>>,
    rides: HashMap<Uuid, Ride>,
    drivers: HashMap<Uuid, Driver>,
    riders: HashMap<Uuid, Rider>,
}

impl MemoryTx {
    async fn lock(&mut self, key: RowKey) {
        if self.guards.contains_key(&key) {
            return;
        }

        let guard = match key {
            RowKey::Ride(id) => self.tables.rides.lock(id).await,
            RowKey::Driver(id) => self.tables.drivers.lock(id).await,
            RowKey::Rider(id) => self.tables.riders.lock(id).await,
        };

        self.guards.insert(key, guard);
    }
}

#[async_trait]
impl Tx for MemoryTx {
    async fn ride_for_update(&mut self, id: Uuid) -> Result<Ride, Error> {
        self.lock(RowKey::Ride(id)).await;

        if let Some(ride) = self.rides.get(&id) {
            return Ok(ride.clone());
        }

        self.tables
            .rides
            .get(&id)
            .await
            .ok_or_else(|| not_found_error("ride not found"))
    }

    async fn driver_for_update(&mut self, id: Uuid) -> Result<Driver, Error> {
        self.lock(RowKey::Driver(id)).await;

        if let Some(driver) = self.drivers.get(&id) {
            return Ok(driver.clone());
        }

        self.tables
            .drivers
            .get(&id)
            .await
            .ok_or_else(|| not_found_error("driver not found"))
    }

    async fn rider_for_update(&mut self, id: Uuid) -> Result<Rider, Error> {
        self.lock(RowKey::Rider(id)).await;

        if let Some(rider) = self.riders.get(&id) {
            return Ok(rider.clone());
        }

        self.tables
            .riders
            .get(&id)
            .await
            .ok_or_else(|| not_found_error("rider not found"))
    }

    async fn update_ride(&mut self, ride: &Ride) -> Result<Ride, Error> {
        let current = self.ride_for_update(ride.id).await?;

        if current.version != ride.version {
            return Err(invalid_transition_error("ride was modified concurrently"));
        }

        let mut next = ride.clone();
        next.version += 1;

        self.rides.insert(next.id, next.clone());
        Ok(next)
    }

    async fn update_driver(&mut self, driver: &Driver) -> Result<(), Error> {
        self.driver_for_update(driver.id).await?;
        self.drivers.insert(driver.id, driver.clone());
        Ok(())
    }

    async fn update_rider(&mut self, rider: &Rider) -> Result<(), Error> {
        self.rider_for_update(rider.id).await?;
        self.riders.insert(rider.id, rider.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        let MemoryTx {
            tables,
            guards,
            rides,
            drivers,
            riders,
        } = *self;

        if !rides.is_empty() {
            let mut rows = tables.rides.rows.write().await;
            rows.extend(rides);
        }

        if !drivers.is_empty() {
            let mut rows = tables.drivers.rows.write().await;
            for (id, driver) in drivers {
                if let Some(row) = rows.get_mut(&id) {
                    row.status = driver.status;
                    row.rating = driver.rating;
                }
            }
        }

        if !riders.is_empty() {
            let mut rows = tables.riders.rows.write().await;
            rows.extend(riders);
        }

        drop(guards);
        Ok(())
    }
}
