use axum::extract::{Extension, Json, Path, Query};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{Booking, BookingRequest, HistoryQuery};
use crate::auth::User;
use crate::entities::Ride;
use crate::error::Error;
use crate::server::DynAPI;

#[derive(Serialize, Deserialize)]
pub struct CancelParams {
    #[serde(default)]
    reason: String,
}

pub async fn book(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<BookingRequest>,
) -> Result<Json<Booking>, Error> {
    let booking = api.book_ride(user, params).await?;

    Ok(booking.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, Error> {
    let ride = api.find_ride(user, id).await?;

    Ok(ride.into())
}

pub async fn history(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Ride>>, Error> {
    let rides = api.ride_history(user, query).await?;

    Ok(rides.into())
}

pub async fn accept(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, Error> {
    let ride = api.accept_ride(user, id).await?;

    Ok(ride.into())
}

pub async fn pick_up(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, Error> {
    let ride = api.mark_picked_up(user, id).await?;

    Ok(ride.into())
}

pub async fn complete(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, Error> {
    let ride = api.complete_ride(user, id).await?;

    Ok(ride.into())
}

pub async fn cancel(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<CancelParams>,
) -> Result<Json<Ride>, Error> {
    let ride = api.cancel_ride(user, id, params.reason).await?;

    Ok(ride.into())
}
