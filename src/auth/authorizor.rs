use oso::{Oso, PolarClass};

use crate::auth::{Platform, User};
use crate::entities::Ride;
use crate::error::Error;

pub fn new() -> Result<Oso, Error> {
    let mut o = Oso::new();

    o.register_class(Platform::get_polar_class())?;
    o.register_class(User::get_polar_class())?;
    o.register_class(Ride::get_polar_class())?;

    o.load_str(include_str!("rules.polar"))?;

    Ok(o)
}

#[cfg(test)]
fn sample_ride(rider_id: uuid::Uuid) -> Ride {
    use crate::entities::{Coordinates, FareDetails, Place, VehicleClass};
    use rust_decimal::Decimal;

    let place = Place::new(Coordinates { lat: 0.0, lng: 0.0 }, None);
    let fare = FareDetails {
        distance_km: Decimal::ONE,
        duration_min: Decimal::ONE,
        base_fare: Decimal::ONE,
        surge_multiplier: Decimal::ONE,
        total_fare: Decimal::ONE,
        degraded: false,
    };

    Ride::new(rider_id, VehicleClass::Sedan, place.clone(), place, fare).unwrap()
}

#[test]
fn platform_role_test() {
    use uuid::Uuid;

    let authorizor = new().unwrap();

    let rider = User::new(Uuid::new_v4(), &["rider"]);
    let driver = User::new(Uuid::new_v4(), &["driver"]);
    let system = User::new_system_user();

    let result = authorizor.is_allowed(rider.clone(), "book_ride", Platform::default());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(driver.clone(), "book_ride", Platform::default());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(driver.clone(), "drive", Platform::default());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(rider.clone(), "drive", Platform::default());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(rider.clone(), "manage", Platform::default());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(system.clone(), "manage", Platform::default());
    assert_eq!(result.unwrap(), true);
}

#[test]
fn ride_party_test() {
    use uuid::Uuid;

    let authorizor = new().unwrap();

    let rider = User::new(Uuid::new_v4(), &["rider"]);
    let driver = User::new(Uuid::new_v4(), &["driver"]);
    let stranger = User::new(Uuid::new_v4(), &["rider", "driver"]);
    let system = User::new_system_user();

    let mut ride = sample_ride(rider.id);

    // before a driver is assigned

    let result = authorizor.is_allowed(rider.clone(), "read", ride.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(rider.clone(), "cancel", ride.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(driver.clone(), "read", ride.clone());
    assert_eq!(result.unwrap(), false);

    ride.accept(driver.id).unwrap();

    // after a driver is assigned

    let result = authorizor.is_allowed(driver.clone(), "read", ride.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(driver.clone(), "cancel", ride.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(stranger.clone(), "read", ride.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(stranger.clone(), "cancel", ride.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(system.clone(), "cancel", ride.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(rider.clone(), "delete", ride.clone());
    assert_eq!(result.unwrap(), false);
}
