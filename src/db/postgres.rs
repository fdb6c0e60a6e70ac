use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use geo_types::Geometry;
use geozero::wkb;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::Json,
    Executor, Pool, Postgres, Row, Transaction,
};
use uuid::Uuid;

use super::{Participant, PositionUpdate, RideFilter, Store, Tx};
use crate::entities::{
    Coordinates, Driver, Pricing, RequestLog, Ride, Rider, VehicleClass,
};
use crate::error::{
    invalid_input_error, invalid_transition_error, not_found_error, Error,
};
use crate::geo::BoundingBox;

const DRIVER_COLUMNS: &str =
    "data, ST_Y(location) AS lat, ST_X(location) AS lng, position_updated_at";

pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub async fn new(db_uri: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_uri)
            .await?;

        // TODO: move this to migrations
        pool.execute("CREATE EXTENSION IF NOT EXISTS postgis").await?;
        pool.execute("CREATE TABLE IF NOT EXISTS riders (id UUID PRIMARY KEY, data jsonb NOT NULL)")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS drivers (id UUID PRIMARY KEY, vehicle_class VARCHAR NOT NULL, is_available BOOLEAN NOT NULL, status VARCHAR NOT NULL, location geometry(Point, 4326), position_updated_at TIMESTAMPTZ, data jsonb NOT NULL)")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS drivers_location_idx ON drivers USING GIST (location)")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS rides (id UUID PRIMARY KEY, rider_id UUID NOT NULL, driver_id UUID, status VARCHAR NOT NULL, version INT8 NOT NULL, created_at TIMESTAMPTZ NOT NULL, data jsonb NOT NULL)")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS pricing (vehicle_class VARCHAR PRIMARY KEY, base_fare NUMERIC NOT NULL, per_km_rate NUMERIC NOT NULL, per_min_rate NUMERIC NOT NULL)")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS request_logs (id BIGSERIAL PRIMARY KEY, rider_id UUID NOT NULL, request_type VARCHAR NOT NULL, request_data jsonb NOT NULL, response_time_ms INT8 NOT NULL, created_at TIMESTAMPTZ NOT NULL)")
            .await?;

        Ok(Self { pool })
    }
}

fn insert_error(err: sqlx::Error, what: &str) -> Error {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return invalid_input_error(format!("{} already exists", what));
        }
    }

    err.into()
}

fn driver_from_row(row: &PgRow) -> Result<Driver, Error> {
    let Json(mut driver): Json<Driver> = row.try_get("data")?;

    let lat: Option<f64> = row.try_get("lat")?;
    let lng: Option<f64> = row.try_get("lng")?;

    driver.position = lat.zip(lng).map(|(lat, lng)| Coordinates { lat, lng });
    driver.position_updated_at = row.try_get("position_updated_at")?;

    Ok(driver)
}

fn pricing_from_row(row: &PgRow) -> Result<Pricing, Error> {
    let vehicle_class: String = row.try_get("vehicle_class")?;

    Ok(Pricing {
        vehicle_class: vehicle_class.parse()?,
        base_fare: row.try_get("base_fare")?,
        per_km_rate: row.try_get("per_km_rate")?,
        per_min_rate: row.try_get("per_min_rate")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn Tx>, Error> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    #[tracing::instrument(skip(self))]
    async fn insert_rider(&self, rider: &Rider) -> Result<(), Error> {
        self.pool
            .execute(
                sqlx::query("INSERT INTO riders (id, data) VALUES ($1, $2)")
                    .bind(&rider.id)
                    .bind(Json(rider)),
            )
            .await
            .map_err(|err| insert_error(err, "rider"))?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_rider(&self, id: Uuid) -> Result<Option<Rider>, Error> {
        let row = self
            .pool
            .fetch_optional(sqlx::query("SELECT data FROM riders WHERE id = $1").bind(&id))
            .await?;

        match row {
            Some(row) => {
                let Json(rider): Json<Rider> = row.try_get("data")?;
                Ok(Some(rider))
            }
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn insert_driver(&self, driver: &Driver) -> Result<(), Error> {
        self.pool
            .execute(
                sqlx::query(
                    "INSERT INTO drivers (id, vehicle_class, is_available, status, data) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(&driver.id)
                .bind(driver.vehicle_class.name())
                .bind(driver.is_available())
                .bind(driver.status.name())
                .bind(Json(driver)),
            )
            .await
            .map_err(|err| insert_error(err, "driver"))?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_driver(&self, id: Uuid) -> Result<Option<Driver>, Error> {
        let row = self
            .pool
            .fetch_optional(
                sqlx::query(&format!("SELECT {} FROM drivers WHERE id = $1", DRIVER_COLUMNS))
                    .bind(&id),
            )
            .await?;

        row.as_ref().map(driver_from_row).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn update_driver_position(
        &self,
        id: Uuid,
        position: Coordinates,
        at: DateTime<Utc>,
    ) -> Result<PositionUpdate, Error> {
        let location: Geometry<f64> = position.into();

        let result = self
            .pool
            .execute(
                sqlx::query(
                    "UPDATE drivers SET location = ST_SetSRID($2, 4326), position_updated_at = $3 WHERE id = $1 AND (position_updated_at IS NULL OR position_updated_at <= $3)",
                )
                .bind(&id)
                .bind(wkb::Encode(location))
                .bind(at),
            )
            .await?;

        if result.rows_affected() > 0 {
            return Ok(PositionUpdate::Applied);
        }

        let exists = self
            .pool
            .fetch_optional(sqlx::query("SELECT id FROM drivers WHERE id = $1").bind(&id))
            .await?
            .is_some();

        if exists {
            Ok(PositionUpdate::Stale)
        } else {
            Err(not_found_error("driver not found"))
        }
    }

    #[tracing::instrument(skip(self))]
    async fn available_drivers_within(
        &self,
        vehicle_class: VehicleClass,
        bounds: &BoundingBox,
    ) -> Result<Vec<Driver>, Error> {
        let rows = self
            .pool
            .fetch_all(
                sqlx::query(&format!(
                    "SELECT {} FROM drivers WHERE is_available AND vehicle_class = $1 AND location && ST_MakeEnvelope($2, $3, $4, $5, 4326)",
                    DRIVER_COLUMNS
                ))
                .bind(vehicle_class.name())
                .bind(bounds.min_lng)
                .bind(bounds.min_lat)
                .bind(bounds.max_lng)
                .bind(bounds.max_lat),
            )
            .await?;

        rows.iter().map(driver_from_row).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn upsert_pricing(&self, pricing: &Pricing) -> Result<(), Error> {
        self.pool
            .execute(
                sqlx::query(
                    "INSERT INTO pricing (vehicle_class, base_fare, per_km_rate, per_min_rate) VALUES ($1, $2, $3, $4) ON CONFLICT (vehicle_class) DO UPDATE SET base_fare = EXCLUDED.base_fare, per_km_rate = EXCLUDED.per_km_rate, per_min_rate = EXCLUDED.per_min_rate",
                )
                .bind(pricing.vehicle_class.name())
                .bind(pricing.base_fare)
                .bind(pricing.per_km_rate)
                .bind(pricing.per_min_rate),
            )
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_pricing(&self, vehicle_class: VehicleClass) -> Result<Option<Pricing>, Error> {
        let row = self
            .pool
            .fetch_optional(
                sqlx::query(
                    "SELECT vehicle_class, base_fare, per_km_rate, per_min_rate FROM pricing WHERE vehicle_class = $1",
                )
                .bind(vehicle_class.name()),
            )
            .await?;

        row.as_ref().map(pricing_from_row).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error> {
        self.pool
            .execute(
                sqlx::query(
                    "INSERT INTO rides (id, rider_id, driver_id, status, version, created_at, data) VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .bind(&ride.id)
                .bind(&ride.rider_id)
                .bind(&ride.driver_id)
                .bind(ride.status.name())
                .bind(ride.version)
                .bind(ride.created_at)
                .bind(Json(ride)),
            )
            .await
            .map_err(|err| insert_error(err, "ride"))?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_ride(&self, id: Uuid) -> Result<Option<Ride>, Error> {
        let row = self
            .pool
            .fetch_optional(sqlx::query("SELECT data FROM rides WHERE id = $1").bind(&id))
            .await?;

        match row {
            Some(row) => {
                let Json(ride): Json<Ride> = row.try_get("data")?;
                Ok(Some(ride))
            }
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn list_rides(&self, filter: &RideFilter) -> Result<Vec<Ride>, Error> {
        let (column, participant_id) = match filter.participant {
            Participant::Rider(id) => ("rider_id", id),
            Participant::Driver(id) => ("driver_id", id),
        };

        let statuses: Vec<String> = filter.statuses.iter().map(|s| s.name()).collect();

        let rows = self
            .pool
            .fetch_all(
                sqlx::query(&format!(
                    "SELECT data FROM rides WHERE {} = $1 AND (cardinality($2::VARCHAR[]) = 0 OR status = ANY($2)) ORDER BY created_at DESC LIMIT $3 OFFSET $4",
                    column
                ))
                .bind(&participant_id)
                .bind(statuses)
                .bind(filter.limit)
                .bind(filter.offset),
            )
            .await?;

        rows.iter()
            .map(|row| {
                let Json(ride): Json<Ride> = row.try_get("data")?;
                Ok(ride)
            })
            .collect()
    }

    #[tracing::instrument(skip(self))]
    async fn completed_trip_count(&self, rider_id: Uuid) -> Result<i64, Error> {
        let count: i64 = self
            .pool
            .fetch_one(
                sqlx::query(
                    "SELECT COUNT(*) AS count FROM rides WHERE rider_id = $1 AND status = 'completed'",
                )
                .bind(&rider_id),
            )
            .await?
            .try_get("count")?;

        Ok(count)
    }

    #[tracing::instrument(skip(self))]
    async fn average_completed_fare(&self, rider_id: Uuid) -> Result<Decimal, Error> {
        let average: Decimal = self
            .pool
            .fetch_one(
                sqlx::query(
                    "SELECT COALESCE(AVG((data->'fare'->>'total_fare')::NUMERIC), 0) AS average FROM rides WHERE rider_id = $1 AND status = 'completed'",
                )
                .bind(&rider_id),
            )
            .await?
            .try_get("average")?;

        Ok(average.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    #[tracing::instrument(skip(self, log))]
    async fn insert_request_log(&self, log: &RequestLog) -> Result<(), Error> {
        self.pool
            .execute(
                sqlx::query(
                    "INSERT INTO request_logs (rider_id, request_type, request_data, response_time_ms, created_at) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(&log.rider_id)
                .bind(&log.request_type)
                .bind(Json(&log.request_data))
                .bind(log.response_time_ms)
                .bind(log.created_at),
            )
            .await?;

        Ok(())
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Tx for PgTx {
    #[tracing::instrument(skip(self))]
    async fn ride_for_update(&mut self, id: Uuid) -> Result<Ride, Error> {
        let Json(ride): Json<Ride> = self
            .tx
            .fetch_optional(sqlx::query("SELECT data FROM rides WHERE id = $1 FOR UPDATE").bind(&id))
            .await?
            .ok_or_else(|| not_found_error("ride not found"))?
            .try_get("data")?;

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn driver_for_update(&mut self, id: Uuid) -> Result<Driver, Error> {
        let row = self
            .tx
            .fetch_optional(
                sqlx::query(&format!(
                    "SELECT {} FROM drivers WHERE id = $1 FOR UPDATE",
                    DRIVER_COLUMNS
                ))
                .bind(&id),
            )
            .await?
            .ok_or_else(|| not_found_error("driver not found"))?;

        driver_from_row(&row)
    }

    #[tracing::instrument(skip(self))]
    async fn rider_for_update(&mut self, id: Uuid) -> Result<Rider, Error> {
        let Json(rider): Json<Rider> = self
            .tx
            .fetch_optional(
                sqlx::query("SELECT data FROM riders WHERE id = $1 FOR UPDATE").bind(&id),
            )
            .await?
            .ok_or_else(|| not_found_error("rider not found"))?
            .try_get("data")?;

        Ok(rider)
    }

    #[tracing::instrument(skip(self, ride), fields(ride_id = %ride.id))]
    async fn update_ride(&mut self, ride: &Ride) -> Result<Ride, Error> {
        let mut next = ride.clone();
        next.version += 1;

        let result = self
            .tx
            .execute(
                sqlx::query(
                    "UPDATE rides SET driver_id = $2, status = $3, version = $4, data = $5 WHERE id = $1 AND version = $6",
                )
                .bind(&next.id)
                .bind(&next.driver_id)
                .bind(next.status.name())
                .bind(next.version)
                .bind(Json(&next))
                .bind(ride.version),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(invalid_transition_error("ride was modified concurrently"));
        }

        Ok(next)
    }

    #[tracing::instrument(skip(self, driver), fields(driver_id = %driver.id))]
    async fn update_driver(&mut self, driver: &Driver) -> Result<(), Error> {
        self.tx
            .execute(
                sqlx::query(
                    "UPDATE drivers SET is_available = $2, status = $3, data = jsonb_set(jsonb_set(data, '{status}', $4), '{rating}', $5) WHERE id = $1",
                )
                .bind(&driver.id)
                .bind(driver.is_available())
                .bind(driver.status.name())
                .bind(Json(&driver.status))
                .bind(Json(driver.rating)),
            )
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self, rider), fields(rider_id = %rider.id))]
    async fn update_rider(&mut self, rider: &Rider) -> Result<(), Error> {
        self.tx
            .execute(
                sqlx::query("UPDATE riders SET data = $2 WHERE id = $1")
                    .bind(&rider.id)
                    .bind(Json(rider)),
            )
            .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        self.tx.commit().await?;
        Ok(())
    }
}
