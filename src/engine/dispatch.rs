use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{Timelike, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use super::Engine;
use crate::{
    api::{Booking, BookingRequest, BookingTimings},
    auth::{Platform, User},
    entities::{FareDetails, Offer, RequestLog, RideStatus},
    error::{
        insufficient_funds_error, no_drivers_available_error, upstream_error, Error, ErrorKind,
    },
    external::RouteEstimate,
    fare::fare,
    geo::Candidate,
    ledger::Affordability,
    notify::{Event, Topic},
};

async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| upstream_error(format!("{} read timed out", what)))?
}

/// Keeps `NotFound` for the caller, anything else is the dependency failing.
fn read_failure(what: &'static str) -> impl Fn(Error) -> Error {
    move |err| match err.kind {
        ErrorKind::NotFound | ErrorKind::UpstreamUnavailable => err,
        _ => {
            tracing::error!("{} read failed: {}", what, err);
            upstream_error(format!("{} unavailable", what))
        }
    }
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or_default()
        .round_dp(2)
}

fn millis(since: Instant) -> i64 {
    since.elapsed().as_millis() as i64
}

impl Engine {
    #[tracing::instrument(skip(self, user), fields(rider_id = %user.id))]
    pub(super) async fn book(&self, user: User, request: BookingRequest) -> Result<Booking, Error> {
        let started = Instant::now();

        self.authorize(user.clone(), "book_ride", Platform::default())?;

        request.pickup.validate()?;
        request.dropoff.validate()?;

        let rider_id = user.id;
        let origin = request.pickup.coordinates;
        let destination = request.dropoff.coordinates;
        let config = &self.config;

        let (balance, trip_count, pricing, candidates) = futures::join!(
            bounded(config.read_timeout, "wallet", self.ledger.balance(rider_id)),
            bounded(
                config.read_timeout,
                "trip count",
                self.store.completed_trip_count(rider_id)
            ),
            bounded(
                config.read_timeout,
                "pricing",
                self.store.find_pricing(request.vehicle_class)
            ),
            bounded(
                config.read_timeout,
                "candidates",
                self.geo.find_candidates(
                    origin,
                    request.vehicle_class,
                    config.search_radius_km,
                    config.candidate_limit,
                )
            ),
        );

        let parallel_reads_ms = millis(started);

        let balance = balance.map_err(read_failure("wallet"))?;
        let pricing = pricing
            .map_err(read_failure("pricing"))?
            .unwrap_or_else(|| config.default_pricing.for_class(request.vehicle_class));
        let candidates = candidates.map_err(read_failure("candidates"))?;
        let trip_count = trip_count.unwrap_or_else(|err| {
            tracing::warn!("trip count unavailable: {}", err);
            0
        });

        let route_started = Instant::now();
        let fallback = RouteEstimate {
            distance_km: config.fallback_distance_km,
            duration_min: config.fallback_duration_min,
        };

        let (estimate, degraded) =
            match tokio::time::timeout(config.route_timeout, self.oracle.route(origin, destination))
                .await
            {
                Ok(Ok(estimate))
                    if estimate.distance_km.is_finite()
                        && estimate.duration_min.is_finite()
                        && estimate.distance_km >= 0.0
                        && estimate.duration_min >= 0.0 =>
                {
                    (estimate, false)
                }
                Ok(Ok(estimate)) => {
                    tracing::warn!(?estimate, "route oracle returned an unusable estimate");
                    (fallback, true)
                }
                Ok(Err(err)) => {
                    tracing::warn!("route oracle failed, using fallback: {}", err);
                    (fallback, true)
                }
                Err(_) => {
                    tracing::warn!("route oracle timed out, using fallback");
                    (fallback, true)
                }
            };

        let route_ms = millis(route_started);

        if candidates.is_empty() {
            tracing::info!("no drivers available");
            return Err(no_drivers_available_error());
        }

        let local_hour =
            (Utc::now() + chrono::Duration::hours(config.utc_offset_hours as i64)).hour();
        let surge_multiplier = config.surge.multiplier(local_hour);

        let distance_km = to_decimal(estimate.distance_km);
        let duration_min = to_decimal(estimate.duration_min);
        let total_fare = fare(distance_km, duration_min, &pricing, surge_multiplier);

        let affordability = Affordability::evaluate(balance, total_fare);
        if !affordability.ok {
            return Err(insufficient_funds_error(
                affordability.balance,
                affordability.shortfall,
            ));
        }

        let ride = self
            .lifecycle
            .create(
                rider_id,
                request.vehicle_class,
                request.pickup.clone(),
                request.dropoff.clone(),
                FareDetails {
                    distance_km,
                    duration_min,
                    base_fare: pricing.base_fare,
                    surge_multiplier,
                    total_fare,
                    degraded,
                },
            )
            .await?;

        let total_ms = millis(started);

        self.log_request(
            RequestLog::new(
                rider_id,
                "ride_booking",
                json!({
                    "ride_id": ride.id,
                    "pickup": request.pickup,
                    "dropoff": request.dropoff,
                    "vehicle_class": request.vehicle_class,
                    "candidate_count": candidates.len(),
                    "completed_trips": trip_count,
                    "estimated_fare": total_fare,
                    "degraded": degraded,
                }),
                total_ms,
            ),
        );

        self.broadcast_offer(ride.id, rider_id, &candidates, &request, total_fare)
            .await;

        Ok(Booking {
            ride_id: ride.id,
            estimated_fare: total_fare,
            surge_multiplier,
            distance_km,
            duration_min,
            candidate_count: candidates.len(),
            degraded,
            timings: BookingTimings {
                parallel_reads_ms,
                route_ms,
                total_ms,
            },
        })
    }

    fn log_request(&self, log: RequestLog) {
        let store = self.store.clone();

        tokio::spawn(async move {
            if let Err(err) = store.insert_request_log(&log).await {
                tracing::warn!("failed to write request log: {}", err);
            }
        });
    }

    async fn broadcast_offer(
        &self,
        ride_id: Uuid,
        rider_id: Uuid,
        candidates: &[Candidate],
        request: &BookingRequest,
        estimated_fare: Decimal,
    ) {
        let ttl = self.config.offer_ttl;

        self.offers
            .register(Offer::new(
                ride_id,
                candidates.to_vec(),
                chrono::Duration::milliseconds(ttl.as_millis() as i64),
            ))
            .await;

        for candidate in candidates {
            self.emit(
                Topic::Driver(candidate.driver_id),
                Event::RideOffered {
                    ride_id,
                    pickup: request.pickup.coordinates,
                    dropoff: request.dropoff.coordinates,
                    estimated_fare,
                    distance_km: candidate.distance_km,
                },
            );
        }

        let offers = self.offers.clone();
        let store = self.store.clone();
        let notifier = self.notifier.clone();

        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;

            let Some(offer) = offers.take_expired(ride_id, Utc::now()).await else {
                return;
            };

            match store.find_ride(ride_id).await {
                Ok(Some(ride)) if ride.status == RideStatus::Requested => {
                    tracing::info!(%ride_id, "offer expired without an accepting driver");

                    let mut deliveries = vec![(Topic::Rider(rider_id), Event::OfferExpired { ride_id })];
                    deliveries.extend(
                        offer
                            .driver_ids()
                            .map(|id| (Topic::Driver(id), Event::OfferWithdrawn { ride_id })),
                    );

                    for (topic, event) in deliveries {
                        if let Err(err) = notifier.publish(topic, event).await {
                            tracing::warn!(%topic, "failed to publish event: {}", err);
                        }
                    }
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(%ride_id, "offer expiry check failed: {}", err),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::api::RideAPI;
    use crate::db::{MemoryStore, Store};
    use crate::engine::testing::{
        dispatch_config, engine, place, rider_user, seed_driver, seed_rider, Fault, FaultyStore,
        FailingRoute, FixedRoute, SlowRoute,
    };
    use crate::entities::{Pricing, Settlement, VehicleClass};

    const TEN_KM: RouteEstimate = RouteEstimate {
        distance_km: 10.0,
        duration_min: 20.0,
    };

    fn sedan_request() -> BookingRequest {
        BookingRequest {
            pickup: place(12.9716, 77.5946),
            dropoff: place(12.9352, 77.6245),
            vehicle_class: VehicleClass::Sedan,
        }
    }

    async fn recv(rx: &async_channel::Receiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event not delivered")
            .unwrap()
    }

    #[tokio::test]
    async fn booking_creates_ride_and_offers_it() {
        let store = Arc::new(MemoryStore::new());
        let rider = seed_rider(&store, dec!(500)).await;
        let near = seed_driver(&store, VehicleClass::Sedan, 12.9726, 77.5946).await;
        let far = seed_driver(&store, VehicleClass::Sedan, 12.9916, 77.5946).await;
        let _suv = seed_driver(&store, VehicleClass::Suv, 12.9720, 77.5946).await;

        let (engine, hub) = engine(store.clone(), Arc::new(FixedRoute(TEN_KM)), dispatch_config());

        let near_rx = hub.subscribe(Topic::Driver(near.id)).await;
        let far_rx = hub.subscribe(Topic::Driver(far.id)).await;

        let booking = engine
            .book_ride(rider_user(&rider), sedan_request())
            .await
            .unwrap();

        assert_eq!(booking.estimated_fare, dec!(210));
        assert_eq!(booking.surge_multiplier, dec!(1));
        assert_eq!(booking.distance_km, dec!(10));
        assert_eq!(booking.candidate_count, 2);
        assert!(!booking.degraded);
        assert!(booking.timings.total_ms >= booking.timings.parallel_reads_ms);

        let ride = store.find_ride(booking.ride_id).await.unwrap().unwrap();
        assert_eq!(ride.status, RideStatus::Requested);
        assert_eq!(ride.fare.total_fare, dec!(210));
        assert_eq!(ride.settlement, Settlement::Pending);

        for rx in [&near_rx, &far_rx] {
            match recv(rx).await {
                Event::RideOffered { ride_id, .. } => assert_eq!(ride_id, booking.ride_id),
                other => panic!("unexpected event {:?}", other),
            }
        }

        assert!(engine.offers.get(booking.ride_id).await.is_some());

        // the wallet is only checked, never debited at booking time
        let stored = store.find_rider(rider.id).await.unwrap().unwrap();
        assert_eq!(stored.wallet_balance, dec!(500));
    }

    #[tokio::test]
    async fn configured_pricing_is_used() {
        let store = Arc::new(MemoryStore::new());
        let rider = seed_rider(&store, dec!(500)).await;
        seed_driver(&store, VehicleClass::Sedan, 12.9726, 77.5946).await;
        store
            .upsert_pricing(&Pricing {
                vehicle_class: VehicleClass::Sedan,
                base_fare: dec!(40),
                per_km_rate: dec!(10),
                per_min_rate: dec!(1.5),
            })
            .await
            .unwrap();

        let (engine, _) = engine(store.clone(), Arc::new(FixedRoute(TEN_KM)), dispatch_config());

        let booking = engine
            .book_ride(rider_user(&rider), sedan_request())
            .await
            .unwrap();

        assert_eq!(booking.estimated_fare, dec!(170));
    }

    #[tokio::test]
    async fn surge_multiplies_the_fare() {
        let store = Arc::new(MemoryStore::new());
        let rider = seed_rider(&store, dec!(500)).await;
        seed_driver(&store, VehicleClass::Sedan, 12.9726, 77.5946).await;

        let mut config = dispatch_config();
        config.surge.peak = vec![crate::fare::HourRange { start: 0, end: 23 }];
        config.surge.peak_multiplier = dec!(1.5);

        let (engine, _) = engine(store.clone(), Arc::new(FixedRoute(TEN_KM)), config);

        let booking = engine
            .book_ride(rider_user(&rider), sedan_request())
            .await
            .unwrap();

        assert_eq!(booking.surge_multiplier, dec!(1.5));
        assert_eq!(booking.estimated_fare, dec!(315));
    }

    #[tokio::test]
    async fn no_drivers_means_no_ride() {
        let store = Arc::new(MemoryStore::new());
        let rider = seed_rider(&store, dec!(500)).await;
        seed_driver(&store, VehicleClass::Suv, 12.9726, 77.5946).await;

        let (engine, _) = engine(store.clone(), Arc::new(FixedRoute(TEN_KM)), dispatch_config());

        let err = engine
            .book_ride(rider_user(&rider), sedan_request())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::NoDriversAvailable);
        assert_eq!(store.ride_count().await, 0);
    }

    #[tokio::test]
    async fn short_wallet_reports_the_shortfall() {
        let store = Arc::new(MemoryStore::new());
        let rider = seed_rider(&store, dec!(100)).await;
        seed_driver(&store, VehicleClass::Sedan, 12.9726, 77.5946).await;

        let (engine, _) = engine(store.clone(), Arc::new(FixedRoute(TEN_KM)), dispatch_config());

        let err = engine
            .book_ride(rider_user(&rider), sedan_request())
            .await
            .unwrap_err();

        assert_eq!(err.shortfall(), Some((dec!(100), dec!(110))));
        assert_eq!(store.ride_count().await, 0);
    }

    #[tokio::test]
    async fn failing_oracle_degrades_to_fallback() {
        let store = Arc::new(MemoryStore::new());
        let rider = seed_rider(&store, dec!(500)).await;
        seed_driver(&store, VehicleClass::Sedan, 12.9726, 77.5946).await;

        let (engine, _) = engine(store.clone(), Arc::new(FailingRoute), dispatch_config());

        let booking = engine
            .book_ride(rider_user(&rider), sedan_request())
            .await
            .unwrap();

        // 50 + 5 km * 12 + 15 min * 2
        assert!(booking.degraded);
        assert_eq!(booking.distance_km, dec!(5));
        assert_eq!(booking.estimated_fare, dec!(140));

        let ride = store.find_ride(booking.ride_id).await.unwrap().unwrap();
        assert!(ride.fare.degraded);
    }

    #[tokio::test]
    async fn slow_oracle_times_out_to_fallback() {
        let store = Arc::new(MemoryStore::new());
        let rider = seed_rider(&store, dec!(500)).await;
        seed_driver(&store, VehicleClass::Sedan, 12.9726, 77.5946).await;

        let mut config = dispatch_config();
        config.route_timeout = Duration::from_millis(20);

        let (engine, _) = engine(
            store.clone(),
            Arc::new(SlowRoute(Duration::from_secs(5))),
            config,
        );

        let booking = engine
            .book_ride(rider_user(&rider), sedan_request())
            .await
            .unwrap();

        assert!(booking.degraded);
        assert_eq!(booking.duration_min, dec!(15));
    }

    #[tokio::test]
    async fn analytics_failures_do_not_block_booking() {
        let memory = MemoryStore::new();
        let rider = seed_rider(&memory, dec!(500)).await;
        seed_driver(&memory, VehicleClass::Sedan, 12.9726, 77.5946).await;

        let (engine, _) = engine(
            Arc::new(FaultyStore(memory.clone(), Fault::Analytics)),
            Arc::new(FixedRoute(TEN_KM)),
            dispatch_config(),
        );

        let booking = engine
            .book_ride(rider_user(&rider), sedan_request())
            .await
            .unwrap();

        assert!(memory.find_ride(booking.ride_id).await.unwrap().is_some());
        assert!(memory.request_logs().await.is_empty());
    }

    #[tokio::test]
    async fn failed_pricing_read_aborts_booking() {
        let memory = MemoryStore::new();
        let rider = seed_rider(&memory, dec!(500)).await;
        seed_driver(&memory, VehicleClass::Sedan, 12.9726, 77.5946).await;

        let (engine, _) = engine(
            Arc::new(FaultyStore(memory.clone(), Fault::Pricing)),
            Arc::new(FixedRoute(TEN_KM)),
            dispatch_config(),
        );

        let err = engine
            .book_ride(rider_user(&rider), sedan_request())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::UpstreamUnavailable);
        assert_eq!(memory.ride_count().await, 0);
    }

    #[tokio::test]
    async fn stalled_driver_search_aborts_booking() {
        let memory = MemoryStore::new();
        let rider = seed_rider(&memory, dec!(500)).await;
        seed_driver(&memory, VehicleClass::Sedan, 12.9726, 77.5946).await;

        let (engine, _) = engine(
            Arc::new(FaultyStore(
                memory.clone(),
                Fault::SlowDrivers(Duration::from_secs(5)),
            )),
            Arc::new(FixedRoute(TEN_KM)),
            dispatch_config(),
        );

        let started = Instant::now();
        let err = engine
            .book_ride(rider_user(&rider), sedan_request())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::UpstreamUnavailable);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(memory.ride_count().await, 0);
    }

    #[tokio::test]
    async fn request_is_logged_for_analytics() {
        let store = Arc::new(MemoryStore::new());
        let rider = seed_rider(&store, dec!(500)).await;
        seed_driver(&store, VehicleClass::Sedan, 12.9726, 77.5946).await;

        let (engine, _) = engine(store.clone(), Arc::new(FixedRoute(TEN_KM)), dispatch_config());

        let booking = engine
            .book_ride(rider_user(&rider), sedan_request())
            .await
            .unwrap();

        let mut logs = Vec::new();
        for _ in 0..50 {
            logs = store.request_logs().await;
            if !logs.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].rider_id, rider.id);
        assert_eq!(logs[0].request_type, "ride_booking");
        assert_eq!(
            logs[0].request_data["ride_id"],
            json!(booking.ride_id)
        );
    }

    #[tokio::test]
    async fn unknown_rider_and_bad_input_are_rejected_early() {
        let store = Arc::new(MemoryStore::new());
        seed_driver(&store, VehicleClass::Sedan, 12.9726, 77.5946).await;

        let (engine, _) = engine(store.clone(), Arc::new(FixedRoute(TEN_KM)), dispatch_config());

        let stranger = User::new(Uuid::new_v4(), &["rider"]);
        let err = engine
            .book_ride(stranger.clone(), sedan_request())
            .await
            .unwrap_err();
        assert!(err.is_not_found_error());

        let mut request = sedan_request();
        request.pickup = place(91.0, 0.0);
        let err = engine.book_ride(stranger, request).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);

        let driver_only = User::new(Uuid::new_v4(), &["driver"]);
        let err = engine
            .book_ride(driver_only, sedan_request())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn unaccepted_offer_expires() {
        let store = Arc::new(MemoryStore::new());
        let rider = seed_rider(&store, dec!(500)).await;
        let driver = seed_driver(&store, VehicleClass::Sedan, 12.9726, 77.5946).await;

        let mut config = dispatch_config();
        config.offer_ttl = Duration::from_millis(50);

        let (engine, hub) = engine(store.clone(), Arc::new(FixedRoute(TEN_KM)), config);
        let rider_rx = hub.subscribe(Topic::Rider(rider.id)).await;
        let driver_rx = hub.subscribe(Topic::Driver(driver.id)).await;

        let booking = engine
            .book_ride(rider_user(&rider), sedan_request())
            .await
            .unwrap();

        assert_eq!(
            recv(&rider_rx).await,
            Event::OfferExpired {
                ride_id: booking.ride_id
            }
        );

        assert!(matches!(recv(&driver_rx).await, Event::RideOffered { .. }));
        assert_eq!(
            recv(&driver_rx).await,
            Event::OfferWithdrawn {
                ride_id: booking.ride_id
            }
        );

        // the ride stays requested
        let ride = store.find_ride(booking.ride_id).await.unwrap().unwrap();
        assert_eq!(ride.status, RideStatus::Requested);
    }
}
