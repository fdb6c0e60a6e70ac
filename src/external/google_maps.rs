use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{RouteEstimate, RouteOracle};
use crate::{
    entities::Coordinates,
    error::{invalid_input_error, upstream_error, Error},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Value {
    value: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Leg {
    distance: Value,
    duration: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct DirectionsRoute {
    legs: Vec<Leg>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Response {
    status: String,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

impl Response {
    fn estimate(&self) -> Result<RouteEstimate, Error> {
        if self.status != "OK" {
            return Err(upstream_error(format!(
                "directions lookup returned {}",
                self.status
            )));
        }

        let leg = self
            .routes
            .first()
            .and_then(|route| route.legs.first())
            .ok_or_else(|| upstream_error("directions lookup returned no route"))?;

        Ok(RouteEstimate {
            distance_km: leg.distance.value / 1000.0,
            duration_min: leg.duration.value / 60.0,
        })
    }
}

/// Google Directions API client. `api_base` is a host name such as
/// `maps.googleapis.com`.
#[derive(Clone, Debug)]
pub struct GoogleDirections {
    client: reqwest::Client,
    api_base: String,
    key: String,
}

impl GoogleDirections {
    pub fn new(api_base: String, key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base,
            key,
        }
    }
}

#[async_trait]
impl RouteOracle for GoogleDirections {
    #[tracing::instrument(skip(self))]
    async fn route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<RouteEstimate, Error> {
        let url = format!("https://{}/maps/api/directions/json", self.api_base);
        let origin: String = origin.into();
        let destination: String = destination.into();

        let res = self
            .client
            .get(url)
            .query(&[("key", self.key.as_str())])
            .query(&[("origin", origin)])
            .query(&[("destination", destination)])
            .send()
            .await?;

        let status_code = res.status().as_u16();

        if (400..500).contains(&status_code) {
            return Err(invalid_input_error("directions lookup rejected the request"));
        } else if status_code != 200 {
            return Err(upstream_error(format!(
                "directions lookup failed with {}",
                status_code
            )));
        }

        let data: Response = res.json().await?;

        data.estimate()
    }
}

#[test]
fn first_leg_is_converted() {
    let data: Response = serde_json::from_value(serde_json::json!({
        "status": "OK",
        "routes": [{
            "legs": [{
                "distance": { "value": 12500.0, "text": "12.5 km" },
                "duration": { "value": 1800.0, "text": "30 mins" }
            }]
        }]
    }))
    .unwrap();

    assert_eq!(
        data.estimate().unwrap(),
        RouteEstimate {
            distance_km: 12.5,
            duration_min: 30.0,
        }
    );
}

#[test]
fn non_ok_status_is_upstream_failure() {
    let data: Response =
        serde_json::from_value(serde_json::json!({ "status": "ZERO_RESULTS" })).unwrap();

    assert!(data.estimate().unwrap_err().is_upstream_error());
}
