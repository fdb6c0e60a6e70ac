use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{PositionUpdate, Store};
use crate::entities::{Coordinates, VehicleClass};
use crate::error::{invalid_input_error, Error};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points in kilometres.
pub fn haversine_km(a: &Coordinates, b: &Coordinates) -> f64 {
    let (lat_a, lat_b) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Coarse lat/lng envelope handed to the store before the exact distance check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn around(origin: &Coordinates, radius_km: f64) -> Self {
        let lat_delta = (radius_km / EARTH_RADIUS_KM).to_degrees();
        let min_lat = (origin.lat - lat_delta).max(-90.0);
        let max_lat = (origin.lat + lat_delta).min(90.0);

        // near the poles or across the antimeridian the longitude span degenerates
        let widest = min_lat.abs().max(max_lat.abs());
        if widest >= 89.0 {
            return Self {
                min_lat,
                max_lat,
                min_lng: -180.0,
                max_lng: 180.0,
            };
        }

        let lng_delta = lat_delta / widest.to_radians().cos();
        let (min_lng, max_lng) = (origin.lng - lng_delta, origin.lng + lng_delta);

        if min_lng < -180.0 || max_lng > 180.0 {
            return Self {
                min_lat,
                max_lat,
                min_lng: -180.0,
                max_lng: 180.0,
            };
        }

        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    pub fn contains(&self, point: &Coordinates) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lng..=self.max_lng).contains(&point.lng)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub driver_id: Uuid,
    pub distance_km: f64,
}

/// Proximity search over driver positions held by the store.
///
/// Results are a snapshot: a driver may go unavailable between the query and
/// the offer, which the acceptance race resolves.
#[derive(Clone)]
pub struct GeoIndex {
    store: Arc<dyn Store>,
}

impl GeoIndex {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_candidates(
        &self,
        origin: Coordinates,
        vehicle_class: VehicleClass,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<Candidate>, Error> {
        origin.validate()?;

        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(invalid_input_error("search radius must be positive"));
        }

        let bounds = BoundingBox::around(&origin, radius_km);
        let drivers = self
            .store
            .available_drivers_within(vehicle_class, &bounds)
            .await?;

        let mut candidates: Vec<Candidate> = drivers
            .into_iter()
            .filter(|driver| driver.is_available() && driver.vehicle_class == vehicle_class)
            .filter_map(|driver| {
                let position = driver.position?;
                let distance_km = haversine_km(&origin, &position);

                (distance_km < radius_km).then(|| Candidate {
                    driver_id: driver.id,
                    distance_km,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.driver_id.cmp(&b.driver_id))
        });
        candidates.truncate(limit);

        tracing::debug!("found {} candidates", candidates.len());

        Ok(candidates)
    }

    /// Last write by wall-clock time wins; older writes are ignored.
    #[tracing::instrument(skip(self))]
    pub async fn update_position(
        &self,
        driver_id: Uuid,
        coordinates: Coordinates,
    ) -> Result<PositionUpdate, Error> {
        coordinates.validate()?;

        let outcome = self
            .store
            .update_driver_position(driver_id, coordinates, Utc::now())
            .await?;

        if outcome == PositionUpdate::Stale {
            tracing::info!("ignored stale position update");
        }

        Ok(outcome)
    }
}
