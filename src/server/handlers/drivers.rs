use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::NewDriver;
use crate::auth::User;
use crate::db::PositionUpdate;
use crate::entities::{Coordinates, Driver, Ride};
use crate::error::Error;
use crate::server::DynAPI;

#[derive(Serialize, Deserialize)]
pub struct UpdateLocationParams {
    coordinates: Coordinates,
}

#[derive(Serialize, Deserialize)]
pub struct UpdateLocationResponse {
    applied: bool,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<NewDriver>,
) -> Result<Json<Driver>, Error> {
    let driver = api.create_driver(user, params).await?;

    Ok(driver.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, Error> {
    let driver = api.find_driver(user, id).await?;

    Ok(driver.into())
}

pub async fn update_location(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<UpdateLocationParams>,
) -> Result<Json<UpdateLocationResponse>, Error> {
    let outcome = api.update_driver_location(user, params.coordinates).await?;

    Ok(UpdateLocationResponse {
        applied: outcome == PositionUpdate::Applied,
    }
    .into())
}

pub async fn toggle_availability(
    Extension(api): Extension<DynAPI>,
    user: User,
) -> Result<Json<Driver>, Error> {
    let driver = api.toggle_driver_availability(user).await?;

    Ok(driver.into())
}

pub async fn active_rides(
    Extension(api): Extension<DynAPI>,
    user: User,
) -> Result<Json<Vec<Ride>>, Error> {
    let rides = api.active_rides(user).await?;

    Ok(rides.into())
}
