use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::entities::{Pricing, VehicleClass};
use crate::error::{invalid_input_error, Error};
use crate::fare::{HourRange, SurgeSchedule};

/// Rates used when the pricing table has no row for a vehicle class.
#[derive(Clone, Debug, PartialEq)]
pub struct DefaultPricing {
    pub base_fare: Decimal,
    pub per_km_rate: Decimal,
    pub per_min_rate: Decimal,
}

impl Default for DefaultPricing {
    fn default() -> Self {
        Self {
            base_fare: Decimal::from(50),
            per_km_rate: Decimal::from(12),
            per_min_rate: Decimal::from(2),
        }
    }
}

impl DefaultPricing {
    pub fn for_class(&self, vehicle_class: VehicleClass) -> Pricing {
        Pricing {
            vehicle_class,
            base_fare: self.base_fare,
            per_km_rate: self.per_km_rate,
            per_min_rate: self.per_min_rate,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub search_radius_km: f64,
    pub candidate_limit: usize,
    pub read_timeout: Duration,
    pub route_timeout: Duration,
    pub fallback_distance_km: f64,
    pub fallback_duration_min: f64,
    pub offer_ttl: Duration,
    pub surge: SurgeSchedule,
    /// Offset from UTC of the service area, used to pick the surge band.
    pub utc_offset_hours: i32,
    pub default_pricing: DefaultPricing,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            search_radius_km: 10.0,
            candidate_limit: 5,
            read_timeout: Duration::from_millis(2000),
            route_timeout: Duration::from_millis(3000),
            fallback_distance_km: 5.0,
            fallback_duration_min: 15.0,
            offer_ttl: Duration::from_secs(30),
            surge: SurgeSchedule::default(),
            utc_offset_hours: 0,
            default_pricing: DefaultPricing::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GoogleMapsConfig {
    pub api_base: String,
    pub key: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub listen_addr: SocketAddr,
    /// Without it routes are estimated from straight-line distance.
    pub google_maps: Option<GoogleMapsConfig>,
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();

        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let database_url = parsed("DATABASE_URL")
            .ok_or_else(|| invalid_input_error("DATABASE_URL must be set"))?;

        let defaults = DispatchConfig::default();

        let surge = SurgeSchedule {
            peak: match parsed("SURGE_PEAK_HOURS") {
                Some(value) => HourRange::parse_list(&value)?,
                None => defaults.surge.peak.clone(),
            },
            night: match parsed("SURGE_NIGHT_HOURS") {
                Some(value) => HourRange::parse_list(&value)?,
                None => defaults.surge.night.clone(),
            },
            peak_multiplier: var(
                &lookup,
                "SURGE_PEAK_MULTIPLIER",
                defaults.surge.peak_multiplier,
            )?,
            night_multiplier: var(
                &lookup,
                "SURGE_NIGHT_MULTIPLIER",
                defaults.surge.night_multiplier,
            )?,
        };

        let default_pricing = DefaultPricing {
            base_fare: var(&lookup, "DEFAULT_BASE_FARE", defaults.default_pricing.base_fare)?,
            per_km_rate: var(
                &lookup,
                "DEFAULT_PER_KM_RATE",
                defaults.default_pricing.per_km_rate,
            )?,
            per_min_rate: var(
                &lookup,
                "DEFAULT_PER_MIN_RATE",
                defaults.default_pricing.per_min_rate,
            )?,
        };

        let dispatch = DispatchConfig {
            search_radius_km: var(&lookup, "SEARCH_RADIUS_KM", defaults.search_radius_km)?,
            candidate_limit: var(&lookup, "CANDIDATE_LIMIT", defaults.candidate_limit)?,
            read_timeout: Duration::from_millis(var(&lookup, "READ_TIMEOUT_MS", 2000)?),
            route_timeout: Duration::from_millis(var(&lookup, "ROUTE_TIMEOUT_MS", 3000)?),
            fallback_distance_km: var(
                &lookup,
                "FALLBACK_DISTANCE_KM",
                defaults.fallback_distance_km,
            )?,
            fallback_duration_min: var(
                &lookup,
                "FALLBACK_DURATION_MIN",
                defaults.fallback_duration_min,
            )?,
            offer_ttl: Duration::from_secs(var(&lookup, "OFFER_TTL_SECS", 30)?),
            surge,
            utc_offset_hours: var(&lookup, "SURGE_UTC_OFFSET_HOURS", 0)?,
            default_pricing,
        };

        if dispatch.search_radius_km <= 0.0 || dispatch.candidate_limit == 0 {
            return Err(invalid_input_error(
                "SEARCH_RADIUS_KM and CANDIDATE_LIMIT must be positive",
            ));
        }

        if !(-12..=14).contains(&dispatch.utc_offset_hours) {
            return Err(invalid_input_error(
                "SURGE_UTC_OFFSET_HOURS must be between -12 and 14",
            ));
        }

        let google_maps = match (
            parsed("GOOGLE_MAPS_API_BASE"),
            parsed("GOOGLE_MAPS_API_KEY"),
        ) {
            (Some(api_base), Some(key)) => Some(GoogleMapsConfig { api_base, key }),
            _ => None,
        };

        Ok(Self {
            database_url,
            database_max_connections: var(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            listen_addr: var(
                &lookup,
                "LISTEN_ADDR",
                SocketAddr::from(([127, 0, 0, 1], 3000)),
            )?,
            google_maps,
            dispatch,
        })
    }
}

fn var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, Error>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name).filter(|value| !value.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| invalid_input_error(format!("{} has an invalid value", name))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, Error> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("DATABASE_URL", "postgresql://localhost/fareway")]).unwrap();

        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.listen_addr.port(), 3000);
        assert!(config.google_maps.is_none());

        let dispatch = config.dispatch;
        assert_eq!(dispatch.search_radius_km, 10.0);
        assert_eq!(dispatch.candidate_limit, 5);
        assert_eq!(dispatch.offer_ttl, Duration::from_secs(30));
        assert_eq!(dispatch.surge, SurgeSchedule::default());
        assert_eq!(dispatch.default_pricing.base_fare, dec!(50));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("DATABASE_URL", "postgresql://localhost/fareway"),
            ("SEARCH_RADIUS_KM", "4.5"),
            ("READ_TIMEOUT_MS", "250"),
            ("SURGE_PEAK_HOURS", "8-9"),
            ("SURGE_NIGHT_HOURS", ""),
            ("SURGE_PEAK_MULTIPLIER", "2.0"),
            ("GOOGLE_MAPS_API_BASE", "maps.googleapis.com"),
            ("GOOGLE_MAPS_API_KEY", "secret"),
        ])
        .unwrap();

        assert_eq!(config.dispatch.search_radius_km, 4.5);
        assert_eq!(config.dispatch.read_timeout, Duration::from_millis(250));
        assert_eq!(config.dispatch.surge.peak, vec![HourRange { start: 8, end: 9 }]);
        assert_eq!(config.dispatch.surge.peak_multiplier, dec!(2.0));
        assert!(config.google_maps.is_some());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(load(&[]).is_err());

        let err = load(&[
            ("DATABASE_URL", "postgresql://localhost/fareway"),
            ("CANDIDATE_LIMIT", "many"),
        ])
        .unwrap_err();
        assert!(err.message.contains("CANDIDATE_LIMIT"));

        assert!(load(&[
            ("DATABASE_URL", "postgresql://localhost/fareway"),
            ("SURGE_UTC_OFFSET_HOURS", "20"),
        ])
        .is_err());
    }
}
