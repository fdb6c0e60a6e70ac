use super::Engine;

use async_trait::async_trait;

use crate::{
    api::PricingAPI,
    auth::{Platform, User},
    entities::{Pricing, VehicleClass},
    error::Error,
};

#[async_trait]
impl PricingAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn set_pricing(&self, user: User, pricing: Pricing) -> Result<Pricing, Error> {
        self.authorize(user, "manage", Platform::default())?;

        pricing.validate()?;

        self.store.upsert_pricing(&pricing).await?;

        Ok(pricing)
    }

    /// Falls back to the configured default rates when the class has no row.
    #[tracing::instrument(skip(self))]
    async fn find_pricing(
        &self,
        user: User,
        vehicle_class: VehicleClass,
    ) -> Result<Pricing, Error> {
        self.authorize(user, "read", Platform::default())?;

        let pricing = self.store.find_pricing(vehicle_class).await?;

        Ok(pricing.unwrap_or_else(|| self.config.default_pricing.for_class(vehicle_class)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;
    use crate::db::MemoryStore;
    use crate::engine::testing::{dispatch_config, engine};
    use crate::error::ErrorKind;
    use crate::external::StraightLine;

    #[tokio::test]
    async fn only_system_sets_pricing() {
        let (engine, _) = engine(
            Arc::new(MemoryStore::new()),
            Arc::new(StraightLine),
            dispatch_config(),
        );

        let suv = Pricing {
            vehicle_class: VehicleClass::Suv,
            base_fare: dec!(80),
            per_km_rate: dec!(18),
            per_min_rate: dec!(3),
        };

        let rider = User::new(Uuid::new_v4(), &["rider"]);
        let err = engine.set_pricing(rider.clone(), suv.clone()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);

        // defaults until a row exists
        let pricing = engine.find_pricing(rider.clone(), VehicleClass::Suv).await.unwrap();
        assert_eq!(pricing.base_fare, dec!(50));

        engine
            .set_pricing(User::new_system_user(), suv.clone())
            .await
            .unwrap();

        let pricing = engine.find_pricing(rider, VehicleClass::Suv).await.unwrap();
        assert_eq!(pricing, suv);

        let negative = Pricing {
            per_km_rate: dec!(-1),
            ..suv
        };
        let err = engine
            .set_pricing(User::new_system_user(), negative)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }
}
