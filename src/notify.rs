use std::collections::HashMap;
use std::fmt;

use async_channel::{Receiver, Sender, TrySendError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::entities::{Coordinates, Settlement};
use crate::error::Error;

const QUEUE_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    Rider(Uuid),
    Driver(Uuid),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rider(id) => write!(f, "rider_{}", id),
            Self::Driver(id) => write!(f, "driver_{}", id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    RideOffered {
        ride_id: Uuid,
        pickup: Coordinates,
        dropoff: Coordinates,
        estimated_fare: Decimal,
        distance_km: f64,
    },
    OfferWithdrawn {
        ride_id: Uuid,
    },
    OfferExpired {
        ride_id: Uuid,
    },
    RideAccepted {
        ride_id: Uuid,
        driver_id: Uuid,
    },
    RidePickedUp {
        ride_id: Uuid,
    },
    RideCompleted {
        ride_id: Uuid,
        fare: Decimal,
        settlement: Settlement,
    },
    RideCancelled {
        ride_id: Uuid,
        reason: String,
    },
    DriverMoved {
        ride_id: Uuid,
        driver_id: Uuid,
        position: Coordinates,
    },
}

/// Push channel to riders and drivers. Delivery is at-most-once.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, topic: Topic, event: Event) -> Result<(), Error>;
}

/// In-process fan-out from topics to subscriber queues. Events for a topic
/// nobody subscribed to are dropped.
#[derive(Default)]
pub struct ChannelHub {
    subscribers: RwLock<HashMap<Topic, Vec<Sender<Event>>>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, topic: Topic) -> Receiver<Event> {
        let (tx, rx) = async_channel::bounded(QUEUE_CAPACITY);

        self.subscribers
            .write()
            .await
            .entry(topic)
            .or_default()
            .push(tx);

        rx
    }
}

#[async_trait]
impl Notifier for ChannelHub {
    #[tracing::instrument(skip(self, event), fields(topic = %topic))]
    async fn publish(&self, topic: Topic, event: Event) -> Result<(), Error> {
        let mut subscribers = self.subscribers.write().await;

        let Some(queues) = subscribers.get_mut(&topic) else {
            tracing::debug!("no subscribers");
            return Ok(());
        };

        queues.retain(|queue| match queue.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("subscriber queue full, dropping event");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });

        if queues.is_empty() {
            subscribers.remove(&topic);
        }

        Ok(())
    }
}
