use geo_types::{Geometry, Point};
use serde::{Deserialize, Serialize};

use crate::error::{invalid_input_error, Error};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Result<Self, Error> {
        let coordinates = Self { lat, lng };
        coordinates.validate()?;

        Ok(coordinates)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(invalid_input_error(
                "latitude must be between -90 and 90",
            ));
        }

        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(invalid_input_error(
                "longitude must be between -180 and 180",
            ));
        }

        Ok(())
    }
}

impl From<Coordinates> for Geometry<f64> {
    fn from(coordinates: Coordinates) -> Self {
        Geometry::Point(Point::new(coordinates.lng, coordinates.lat))
    }
}

impl From<Coordinates> for String {
    fn from(coordinates: Coordinates) -> Self {
        format!("{},{}", coordinates.lat, coordinates.lng)
    }
}

/// A pickup or dropoff point as given by the rider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub coordinates: Coordinates,
    #[serde(default)]
    pub address: Option<String>,
}

impl Place {
    pub fn new(coordinates: Coordinates, address: Option<String>) -> Self {
        Self {
            coordinates,
            address,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.coordinates.validate()?;

        if let Some(address) = &self.address {
            if address.chars().count() > 200 {
                return Err(invalid_input_error("address must not exceed 200 characters"));
            }
        }

        Ok(())
    }
}

#[test]
fn coordinates_out_of_range_are_rejected() {
    assert!(Coordinates::new(91.0, 0.0).is_err());
    assert!(Coordinates::new(0.0, -180.5).is_err());
    assert!(Coordinates::new(f64::NAN, 0.0).is_err());
    assert!(Coordinates::new(-90.0, 180.0).is_ok());
}

#[test]
fn place_rejects_long_addresses() {
    let coordinates = Coordinates::new(12.97, 77.59).unwrap();

    assert!(Place::new(coordinates, Some("MG Road".into())).validate().is_ok());
    assert!(Place::new(coordinates, Some("x".repeat(201))).validate().is_err());
}
