use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::{Booking, BookingRequest, HistoryQuery, RideAPI},
    auth::{Platform, User},
    db::{Participant, RideFilter},
    entities::Ride,
    error::{invalid_input_error, not_found_error, Error},
    notify::{Event, Topic},
};

const MAX_REASON_LEN: usize = 200;

#[async_trait]
impl RideAPI for Engine {
    async fn book_ride(&self, user: User, request: BookingRequest) -> Result<Booking, Error> {
        self.book(user, request).await
    }

    #[tracing::instrument(skip(self))]
    async fn find_ride(&self, user: User, id: Uuid) -> Result<Ride, Error> {
        let ride = self
            .store
            .find_ride(id)
            .await?
            .ok_or_else(|| not_found_error("ride not found"))?;

        self.authorize(user, "read", ride.clone())?;

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn accept_ride(&self, user: User, id: Uuid) -> Result<Ride, Error> {
        self.authorize(user.clone(), "drive", Platform::default())?;

        let ride = self.lifecycle.accept(id, user.id).await?;

        self.withdraw_offer(id, Some(user.id)).await;
        self.emit(
            Topic::Rider(ride.rider_id),
            Event::RideAccepted {
                ride_id: id,
                driver_id: user.id,
            },
        );

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn mark_picked_up(&self, user: User, id: Uuid) -> Result<Ride, Error> {
        self.authorize(user.clone(), "drive", Platform::default())?;

        let ride = self.lifecycle.pick_up(id, user.id).await?;

        self.emit(Topic::Rider(ride.rider_id), Event::RidePickedUp { ride_id: id });

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn complete_ride(&self, user: User, id: Uuid) -> Result<Ride, Error> {
        self.authorize(user.clone(), "drive", Platform::default())?;

        let completion = self.lifecycle.complete(id, user.id).await?;
        let ride = completion.ride;

        self.emit(
            Topic::Rider(ride.rider_id),
            Event::RideCompleted {
                ride_id: id,
                fare: ride.fare.total_fare,
                settlement: ride.settlement.clone(),
            },
        );

        match completion.settlement_error {
            Some(err) => Err(err),
            None => Ok(ride),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_ride(&self, user: User, id: Uuid, reason: String) -> Result<Ride, Error> {
        let reason = reason.trim().to_string();
        if reason.chars().count() > MAX_REASON_LEN {
            return Err(invalid_input_error(format!(
                "reason must be at most {} characters",
                MAX_REASON_LEN
            )));
        }

        let ride = self
            .lifecycle
            .cancel(id, user.id, reason.clone(), |ride| {
                self.authorize(user.clone(), "cancel", ride.clone())
            })
            .await?;

        self.withdraw_offer(id, None).await;

        let event = Event::RideCancelled { ride_id: id, reason };

        if ride.rider_id != user.id {
            self.emit(Topic::Rider(ride.rider_id), event.clone());
        }

        if let Some(driver_id) = ride.driver_id.filter(|driver_id| *driver_id != user.id) {
            self.emit(Topic::Driver(driver_id), event);
        }

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn ride_history(&self, user: User, query: HistoryQuery) -> Result<Vec<Ride>, Error> {
        let (limit, offset) = query.page()?;

        let participant = if query.as_driver {
            Participant::Driver(user.id)
        } else {
            Participant::Rider(user.id)
        };

        let filter = RideFilter {
            participant,
            statuses: query.status.into_iter().collect(),
            limit,
            offset,
        };

        self.store.list_rides(&filter).await
    }
}
