mod driver;
mod location;
mod offer;
mod pricing;
mod request_log;
mod ride;
mod rider;

pub use driver::{Driver, Status as DriverStatus, VehicleClass};
pub use location::{Coordinates, Place};
pub use offer::Offer;
pub use pricing::Pricing;
pub use request_log::RequestLog;
pub use ride::{Cancellation, FareDetails, Ride, Settlement, Status as RideStatus};
pub use rider::Rider;
