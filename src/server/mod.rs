mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, patch, post, put},
    Router,
};

use crate::api::API;
use crate::error::{upstream_error, Error};
use crate::server::handlers::{drivers, pricing, riders, rides};

pub type DynAPI = Arc<dyn API + Send + Sync>;

pub fn router(api: DynAPI) -> Router {
    Router::new()
        .route("/rides", post(rides::book).get(rides::history))
        .route("/rides/:id", get(rides::find))
        .route("/rides/:id/accept", patch(rides::accept))
        .route("/rides/:id/pickup", patch(rides::pick_up))
        .route("/rides/:id/complete", patch(rides::complete))
        .route("/rides/:id/cancel", patch(rides::cancel))
        .route("/drivers", post(drivers::create))
        .route("/driver/location", patch(drivers::update_location))
        .route("/driver/availability", patch(drivers::toggle_availability))
        .route("/driver/rides", get(drivers::active_rides))
        .route("/drivers/:id", get(drivers::find))
        .route("/riders", post(riders::create))
        .route("/rider", get(riders::profile).put(riders::update))
        .route("/rider/funds", post(riders::add_funds))
        .route("/rider/funds/check", get(riders::check_funds))
        .route("/pricing", put(pricing::set))
        .route("/pricing/:vehicle_class", get(pricing::find))
        .layer(Extension(api))
}

pub async fn serve<T: API + Sync + Send + 'static>(api: T, addr: SocketAddr) -> Result<(), Error> {
    let app = router(Arc::new(api) as DynAPI);

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|err| {
            tracing::error!("server error: {:?}", err);
            upstream_error("server stopped unexpectedly")
        })
}
