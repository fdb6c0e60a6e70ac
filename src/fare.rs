use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::entities::Pricing;
use crate::error::{invalid_input_error, Error};

/// `(base + distance * per_km + duration * per_min) * surge`, rounded to
/// cents with midpoints away from zero.
pub fn fare(
    distance_km: Decimal,
    duration_min: Decimal,
    pricing: &Pricing,
    surge_multiplier: Decimal,
) -> Decimal {
    let subtotal =
        pricing.base_fare + distance_km * pricing.per_km_rate + duration_min * pricing.per_min_rate;

    (subtotal * surge_multiplier).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Inclusive range of hours of the day. `start > end` wraps past midnight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourRange {
    pub start: u32,
    pub end: u32,
}

impl HourRange {
    pub fn new(start: u32, end: u32) -> Result<Self, Error> {
        if start > 23 || end > 23 {
            return Err(invalid_input_error("hours must be between 0 and 23"));
        }

        Ok(Self { start, end })
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            (self.start..=self.end).contains(&hour)
        } else {
            hour >= self.start || hour <= self.end
        }
    }

    /// Parses a comma separated list such as `7-10,17-20`. An empty string is
    /// an empty list.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, Error> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for HourRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || invalid_input_error(format!("invalid hour range {}", s));

        let (start, end) = s.split_once('-').ok_or_else(invalid)?;
        let start = start.trim().parse().map_err(|_| invalid())?;
        let end = end.trim().parse().map_err(|_| invalid())?;

        Self::new(start, end)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurgeSchedule {
    pub peak: Vec<HourRange>,
    pub night: Vec<HourRange>,
    pub peak_multiplier: Decimal,
    pub night_multiplier: Decimal,
}

impl Default for SurgeSchedule {
    fn default() -> Self {
        Self {
            peak: vec![HourRange { start: 7, end: 10 }, HourRange { start: 17, end: 20 }],
            night: vec![HourRange { start: 22, end: 6 }],
            peak_multiplier: Decimal::new(15, 1),
            night_multiplier: Decimal::new(12, 1),
        }
    }
}

impl SurgeSchedule {
    /// A schedule that never surges.
    pub fn flat() -> Self {
        Self {
            peak: vec![],
            night: vec![],
            peak_multiplier: Decimal::ONE,
            night_multiplier: Decimal::ONE,
        }
    }

    pub fn multiplier(&self, hour: u32) -> Decimal {
        if self.peak.iter().any(|range| range.contains(hour)) {
            self.peak_multiplier
        } else if self.night.iter().any(|range| range.contains(hour)) {
            self.night_multiplier
        } else {
            Decimal::ONE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::VehicleClass;
    use rust_decimal_macros::dec;

    fn sedan(base_fare: Decimal) -> Pricing {
        Pricing {
            vehicle_class: VehicleClass::Sedan,
            base_fare,
            per_km_rate: dec!(12),
            per_min_rate: dec!(2),
        }
    }

    #[test]
    fn fare_without_surge() {
        assert_eq!(fare(dec!(10), dec!(20), &sedan(dec!(50)), dec!(1)), dec!(210));
    }

    #[test]
    fn fare_with_peak_surge() {
        let surge = SurgeSchedule::default().multiplier(8);
        assert_eq!(surge, dec!(1.5));

        assert_eq!(fare(dec!(10), dec!(20), &sedan(dec!(50)), surge), dec!(315));
    }

    #[test]
    fn fare_rounds_half_away_from_zero() {
        assert_eq!(
            fare(dec!(10), dec!(20), &sedan(dec!(50.005)), dec!(1)),
            dec!(210.01)
        );
        assert_eq!(
            fare(dec!(10), dec!(20), &sedan(dec!(50.004)), dec!(1)),
            dec!(210.00)
        );
    }

    #[test]
    fn surge_band_edges() {
        let schedule = SurgeSchedule::default();

        assert_eq!(schedule.multiplier(6), dec!(1.2));
        assert_eq!(schedule.multiplier(7), dec!(1.5));
        assert_eq!(schedule.multiplier(10), dec!(1.5));
        assert_eq!(schedule.multiplier(11), dec!(1));
        assert_eq!(schedule.multiplier(16), dec!(1));
        assert_eq!(schedule.multiplier(20), dec!(1.5));
        assert_eq!(schedule.multiplier(21), dec!(1));
        assert_eq!(schedule.multiplier(22), dec!(1.2));
        assert_eq!(schedule.multiplier(0), dec!(1.2));

        assert_eq!(SurgeSchedule::flat().multiplier(8), dec!(1));
    }

    #[test]
    fn hour_ranges_parse() {
        let ranges = HourRange::parse_list("7-10, 17-20").unwrap();
        assert_eq!(
            ranges,
            vec![HourRange { start: 7, end: 10 }, HourRange { start: 17, end: 20 }]
        );

        assert!(HourRange::parse_list("").unwrap().is_empty());
        assert!("25-3".parse::<HourRange>().is_err());
        assert!("seven".parse::<HourRange>().is_err());
    }
}
