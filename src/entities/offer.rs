use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Candidate;

/// The in-flight broadcast of a requested ride. Never persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Offer {
    pub ride_id: Uuid,
    pub candidates: Vec<Candidate>,
    pub expires_at: DateTime<Utc>,
}

impl Offer {
    pub fn new(ride_id: Uuid, candidates: Vec<Candidate>, ttl: Duration) -> Self {
        Self {
            ride_id,
            candidates,
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn driver_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.candidates.iter().map(|candidate| candidate.driver_id)
    }
}
