pub mod google_maps;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entities::Coordinates;
use crate::error::Error;
use crate::geo::haversine_km;

pub use google_maps::GoogleDirections;

/// Driving distance and duration between two points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub duration_min: f64,
}

#[async_trait]
pub trait RouteOracle: Send + Sync {
    async fn route(&self, origin: Coordinates, destination: Coordinates)
        -> Result<RouteEstimate, Error>;
}

const STRAIGHT_LINE_SPEED_KMH: f64 = 25.0;

/// Great-circle distance at a flat city speed. Used when no directions
/// provider is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct StraightLine;

#[async_trait]
impl RouteOracle for StraightLine {
    async fn route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<RouteEstimate, Error> {
        let distance_km = haversine_km(&origin, &destination);

        Ok(RouteEstimate {
            distance_km,
            duration_min: distance_km / STRAIGHT_LINE_SPEED_KMH * 60.0,
        })
    }
}

#[tokio::test]
async fn straight_line_uses_city_speed() {
    let origin = Coordinates { lat: 0.0, lng: 0.0 };
    let destination = Coordinates { lat: 1.0, lng: 0.0 };

    let estimate = StraightLine.route(origin, destination).await.unwrap();

    assert!((estimate.distance_km - 111.195).abs() < 0.01);
    assert!((estimate.duration_min - 266.87).abs() < 0.05);
}
