mod dispatch;
mod driver_api;
mod lifecycle;
mod offers;
mod pricing_api;
mod ride_api;
mod rider_api;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use oso::Oso;
use uuid::Uuid;

pub use lifecycle::{Completion, Lifecycle};
pub use offers::OfferBook;

use crate::{
    api::API,
    auth::authorizor,
    config::DispatchConfig,
    db::Store,
    error::{unauthorized_error, Error},
    external::RouteOracle,
    geo::GeoIndex,
    ledger::Ledger,
    notify::{Event, Notifier, Topic},
};

pub struct Engine {
    store: Arc<dyn Store>,
    geo: GeoIndex,
    ledger: Ledger,
    lifecycle: Lifecycle,
    oracle: Arc<dyn RouteOracle>,
    notifier: Arc<dyn Notifier>,
    offers: OfferBook,
    authorizor: Oso,
    config: DispatchConfig,
}

impl Engine {
    #[tracing::instrument(name = "Engine::new", skip_all)]
    pub fn new(
        store: Arc<dyn Store>,
        oracle: Arc<dyn RouteOracle>,
        notifier: Arc<dyn Notifier>,
        config: DispatchConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            geo: GeoIndex::new(store.clone()),
            ledger: Ledger::new(store.clone()),
            lifecycle: Lifecycle::new(store.clone()),
            store,
            oracle,
            notifier,
            offers: OfferBook::new(),
            authorizor: authorizor::new()?,
            config,
        })
    }
}

impl Engine {
    pub fn authorize<Actor, Action, Resource>(
        &self,
        actor: Actor,
        action: Action,
        resource: Resource,
    ) -> Result<(), Error>
    where
        Actor: oso::ToPolar,
        Action: oso::ToPolar,
        Resource: oso::ToPolar,
    {
        if self.authorizor.is_allowed(actor, action, resource)? {
            return Ok(());
        }

        Err(unauthorized_error())
    }

    /// Publishes from a detached task; delivery failures are only logged.
    fn emit(&self, topic: Topic, event: Event) {
        let notifier = self.notifier.clone();

        tokio::spawn(async move {
            if let Err(err) = notifier.publish(topic, event).await {
                tracing::warn!(%topic, "failed to publish event: {}", err);
            }
        });
    }

    /// Tells every candidate except `winner` that the offer is gone.
    async fn withdraw_offer(&self, ride_id: Uuid, winner: Option<Uuid>) {
        if let Some(offer) = self.offers.resolve(ride_id).await {
            for driver_id in offer.driver_ids().filter(|id| Some(*id) != winner) {
                self.emit(Topic::Driver(driver_id), Event::OfferWithdrawn { ride_id });
            }
        }
    }
}

impl API for Engine {}
