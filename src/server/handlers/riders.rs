use axum::extract::{Extension, Json, Query};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::{NewRider, RiderProfile, RiderUpdate};
use crate::auth::User;
use crate::entities::Rider;
use crate::error::Error;
use crate::ledger::Affordability;
use crate::server::DynAPI;

#[derive(Serialize, Deserialize)]
pub struct AmountParams {
    amount: Decimal,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<NewRider>,
) -> Result<Json<Rider>, Error> {
    let rider = api.create_rider(user, params).await?;

    Ok(rider.into())
}

pub async fn profile(
    Extension(api): Extension<DynAPI>,
    user: User,
) -> Result<Json<RiderProfile>, Error> {
    let profile = api.rider_profile(user).await?;

    Ok(profile.into())
}

pub async fn update(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<RiderUpdate>,
) -> Result<Json<Rider>, Error> {
    let rider = api.update_rider(user, params).await?;

    Ok(rider.into())
}

pub async fn add_funds(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<AmountParams>,
) -> Result<Json<Rider>, Error> {
    let rider = api.add_funds(user, params.amount).await?;

    Ok(rider.into())
}

pub async fn check_funds(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(params): Query<AmountParams>,
) -> Result<Json<Affordability>, Error> {
    let affordability = api.check_funds(user, params.amount).await?;

    Ok(affordability.into())
}
