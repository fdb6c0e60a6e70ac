use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::entities::Offer;

/// Outstanding offers keyed by ride. Lives only as long as the process; a
/// lost offer never affects a ride, which is owned by the store.
#[derive(Clone, Default)]
pub struct OfferBook {
    offers: Arc<Mutex<HashMap<Uuid, Offer>>>,
}

impl OfferBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, offer: Offer) {
        self.offers.lock().await.insert(offer.ride_id, offer);
    }

    pub async fn get(&self, ride_id: Uuid) -> Option<Offer> {
        self.offers.lock().await.get(&ride_id).cloned()
    }

    /// Removes the offer once the ride is accepted or cancelled.
    pub async fn resolve(&self, ride_id: Uuid) -> Option<Offer> {
        self.offers.lock().await.remove(&ride_id)
    }

    /// Removes and returns the offer only if it has expired by `now`.
    pub async fn take_expired(&self, ride_id: Uuid, now: DateTime<Utc>) -> Option<Offer> {
        let mut offers = self.offers.lock().await;

        match offers.get(&ride_id) {
            Some(offer) if offer.is_expired(now) => offers.remove(&ride_id),
            _ => None,
        }
    }

    pub async fn len(&self) -> usize {
        self.offers.lock().await.len()
    }
}
