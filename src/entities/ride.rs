use std::str::FromStr;

use chrono::{DateTime, Utc};
use oso::PolarClass;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Place, VehicleClass};
use crate::error::{
    already_accepted_error, invalid_input_error, invalid_transition_error, Error,
};

/// Fare inputs and result, fixed when the ride is created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FareDetails {
    pub distance_km: Decimal,
    pub duration_min: Decimal,
    pub base_fare: Decimal,
    pub surge_multiplier: Decimal,
    pub total_fare: Decimal,
    /// Set when distance and duration came from the configured fallback.
    pub degraded: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub vehicle_class: VehicleClass,
    pub pickup: Place,
    pub dropoff: Place,
    pub fare: FareDetails,
    pub status: Status,
    pub settlement: Settlement,
    pub cancellation: Option<Cancellation>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Requested,
    Accepted,
    PickedUp,
    Completed,
    Cancelled,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Requested => "requested".into(),
            Self::Accepted => "accepted".into(),
            Self::PickedUp => "picked_up".into(),
            Self::Completed => "completed".into(),
            Self::Cancelled => "cancelled".into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(Self::Requested),
            "accepted" => Ok(Self::Accepted),
            "picked_up" => Ok(Self::PickedUp),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(invalid_input_error(format!("unknown ride status {}", other))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Settlement {
    Pending,
    Settled,
    /// The ride completed but the wallet could not cover the fare.
    Discrepancy { shortfall: Decimal },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    pub actor_id: Uuid,
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

impl PolarClass for Ride {
    fn get_polar_class_builder() -> oso::ClassBuilder<Ride> {
        oso::Class::builder()
            .name("Ride")
            .add_attribute_getter("rider_id", |recv: &Ride| recv.rider_id.to_string())
            .add_attribute_getter("driver_id", |recv: &Ride| {
                recv.driver_id
                    .map(|id| id.to_string())
                    .unwrap_or_default()
            })
            .add_attribute_getter("status", |recv: &Ride| recv.status.name())
    }

    fn get_polar_class() -> oso::Class {
        let builder = Ride::get_polar_class_builder();
        builder.build()
    }
}

impl Ride {
    pub fn new(
        rider_id: Uuid,
        vehicle_class: VehicleClass,
        pickup: Place,
        dropoff: Place,
        fare: FareDetails,
    ) -> Result<Self, Error> {
        pickup.validate()?;
        dropoff.validate()?;

        if fare.total_fare.is_sign_negative() {
            return Err(invalid_input_error("fare must not be negative"));
        }

        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            rider_id,
            driver_id: None,
            vehicle_class,
            pickup,
            dropoff,
            fare,
            status: Status::Requested,
            settlement: Settlement::Pending,
            cancellation: None,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    #[tracing::instrument(skip(self), fields(ride_id = %self.id))]
    pub fn accept(&mut self, driver_id: Uuid) -> Result<(), Error> {
        match self.status {
            Status::Requested if self.driver_id.is_none() => {
                self.driver_id = Some(driver_id);
                self.status = Status::Accepted;
                self.updated_at = Utc::now();
                Ok(())
            }
            Status::Cancelled => Err(invalid_transition_error("ride was cancelled")),
            _ => Err(already_accepted_error()),
        }
    }

    #[tracing::instrument(skip(self), fields(ride_id = %self.id))]
    pub fn pick_up(&mut self, driver_id: Uuid) -> Result<(), Error> {
        match self.status {
            Status::Accepted if self.driver_id == Some(driver_id) => {
                self.status = Status::PickedUp;
                self.updated_at = Utc::now();
                Ok(())
            }
            Status::Accepted => Err(invalid_transition_error(
                "ride is assigned to a different driver",
            )),
            status => Err(invalid_transition_error(format!(
                "cannot pick up a ride that is {}",
                status.name()
            ))),
        }
    }

    /// Returns the amount owed by the rider.
    #[tracing::instrument(skip(self), fields(ride_id = %self.id))]
    pub fn complete(&mut self, driver_id: Uuid) -> Result<Decimal, Error> {
        match self.status {
            Status::PickedUp if self.driver_id == Some(driver_id) => {
                self.status = Status::Completed;
                self.updated_at = Utc::now();
                Ok(self.fare.total_fare)
            }
            Status::PickedUp => Err(invalid_transition_error(
                "ride is assigned to a different driver",
            )),
            status => Err(invalid_transition_error(format!(
                "cannot complete a ride that is {}",
                status.name()
            ))),
        }
    }

    /// Returns the driver that has to be released, if one was assigned.
    #[tracing::instrument(skip(self), fields(ride_id = %self.id))]
    pub fn cancel(&mut self, actor_id: Uuid, reason: String) -> Result<Option<Uuid>, Error> {
        match self.status {
            Status::Requested | Status::Accepted => {
                let now = Utc::now();

                self.status = Status::Cancelled;
                self.cancellation = Some(Cancellation {
                    actor_id,
                    reason,
                    cancelled_at: now,
                });
                self.updated_at = now;

                Ok(self.driver_id)
            }
            status => Err(invalid_transition_error(format!(
                "cannot cancel a ride that is {}",
                status.name()
            ))),
        }
    }

    pub fn settle(&mut self, settlement: Settlement) {
        self.settlement = settlement;
    }
}
