use axum::extract::{Extension, Json, Path};

use crate::auth::User;
use crate::entities::{Pricing, VehicleClass};
use crate::error::Error;
use crate::server::DynAPI;

pub async fn set(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<Pricing>,
) -> Result<Json<Pricing>, Error> {
    let pricing = api.set_pricing(user, params).await?;

    Ok(pricing.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(vehicle_class): Path<VehicleClass>,
) -> Result<Json<Pricing>, Error> {
    let pricing = api.find_pricing(user, vehicle_class).await?;

    Ok(pricing.into())
}
