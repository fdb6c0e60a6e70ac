use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Analytics record written after a booking; losing one never affects a ride.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestLog {
    pub rider_id: Uuid,
    pub request_type: String,
    pub request_data: serde_json::Value,
    pub response_time_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl RequestLog {
    pub fn new(
        rider_id: Uuid,
        request_type: impl Into<String>,
        request_data: serde_json::Value,
        response_time_ms: i64,
    ) -> Self {
        Self {
            rider_id,
            request_type: request_type.into(),
            request_data,
            response_time_ms,
            created_at: Utc::now(),
        }
    }
}
