use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::Coordinates;
use crate::error::{invalid_input_error, invalid_transition_error, Error};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    #[serde(alias = "hatchback")]
    Compact,
    Sedan,
    Suv,
}

impl VehicleClass {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Sedan => "sedan",
            Self::Suv => "suv",
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VehicleClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compact" | "hatchback" => Ok(Self::Compact),
            "sedan" => Ok(Self::Sedan),
            "suv" => Ok(Self::Suv),
            other => Err(invalid_input_error(format!(
                "vehicle class must be one of: compact, sedan, suv (got {})",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub vehicle_class: VehicleClass,
    pub rating: f64,
    pub position: Option<Coordinates>,
    pub position_updated_at: Option<DateTime<Utc>>,
    pub status: Status,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Status {
    Offline,
    Available,
    Assigned { ride_id: Uuid },
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Offline => "offline".into(),
            Self::Available => "available".into(),
            Self::Assigned { ride_id: _ } => "assigned".into(),
        }
    }
}

impl Driver {
    pub fn new(user_id: Uuid, name: String, vehicle_class: VehicleClass) -> Self {
        Self {
            id: user_id,
            name,
            vehicle_class,
            rating: 5.0,
            position: None,
            position_updated_at: None,
            status: Status::Offline,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.status, Status::Available)
    }

    pub fn active_ride(&self) -> Option<Uuid> {
        match self.status {
            Status::Assigned { ride_id } => Some(ride_id),
            _ => None,
        }
    }

    #[tracing::instrument(skip(self), fields(driver_id = %self.id))]
    pub fn assign(&mut self, ride_id: Uuid) -> Result<(), Error> {
        match self.status {
            Status::Available => {
                self.status = Status::Assigned { ride_id };
                Ok(())
            }
            _ => Err(invalid_transition_error("driver is not available")),
        }
    }

    /// Releases the driver from `ride_id`. A driver assigned elsewhere (or
    /// not assigned at all) is left untouched.
    #[tracing::instrument(skip(self), fields(driver_id = %self.id))]
    pub fn free(&mut self, ride_id: Uuid) -> bool {
        match self.status {
            Status::Assigned { ride_id: assigned } if assigned == ride_id => {
                self.status = Status::Available;
                true
            }
            _ => false,
        }
    }

    /// Flips between `offline` and `available`; a driver on a ride cannot toggle.
    #[tracing::instrument(skip(self), fields(driver_id = %self.id))]
    pub fn toggle(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Offline => {
                self.status = Status::Available;
                Ok(())
            }
            Status::Available => {
                self.status = Status::Offline;
                Ok(())
            }
            Status::Assigned { ride_id: _ } => Err(invalid_transition_error(
                "driver has an active ride and cannot change availability",
            )),
        }
    }
}

#[test]
fn driver_assignment_lifecycle() {
    let mut driver = Driver::new(Uuid::new_v4(), "Asha".into(), VehicleClass::Sedan);
    let ride_id = Uuid::new_v4();

    // new drivers start offline
    assert!(driver.assign(ride_id).is_err());

    driver.toggle().unwrap();
    assert!(driver.is_available());

    driver.assign(ride_id).unwrap();
    assert_eq!(driver.active_ride(), Some(ride_id));
    assert!(driver.toggle().is_err());
    assert!(driver.assign(Uuid::new_v4()).is_err());

    // freeing from some other ride is a no-op
    assert!(!driver.free(Uuid::new_v4()));
    assert!(!driver.is_available());

    assert!(driver.free(ride_id));
    assert!(driver.is_available());
}

#[test]
fn vehicle_class_parsing() {
    assert_eq!("hatchback".parse::<VehicleClass>().unwrap(), VehicleClass::Compact);
    assert_eq!("suv".parse::<VehicleClass>().unwrap(), VehicleClass::Suv);
    assert!("limousine".parse::<VehicleClass>().is_err());

    let class: VehicleClass = serde_json::from_str("\"hatchback\"").unwrap();
    assert_eq!(class, VehicleClass::Compact);
}
