// Option scoring: aggregate metrics and the weighted score (lower is better)

use crate::models::Itinerary;
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("Non-finite value for {field}: {value}")]
    NonFiniteInput { field: &'static str, value: f64 },

    #[error("Negative value for {field}: {value}")]
    NegativeInput { field: &'static str, value: f64 },

    #[error("Invalid weight for {field}: {value} (weights must be finite and non-negative)")]
    InvalidWeight { field: &'static str, value: f64 },
}

// Weights for the flight-only formula
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub cost: f64,
    pub arrival_spread: f64,
    pub travel_time: f64,
    pub connections: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            cost: 1.0,
            arrival_spread: 5.0,
            travel_time: 2.0,
            connections: 500.0,
        }
    }
}

// Weights for the formula that also prices hotel, transfers and operational risk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtendedWeights {
    pub flight_cost: f64,
    pub hotel_cost: f64,
    pub transfer_cost: f64,
    pub arrival_spread: f64,
    pub travel_time: f64,
    pub connections: f64,
    pub late_arrival_risk: f64,
    pub operational_complexity: f64,
}

impl Default for ExtendedWeights {
    fn default() -> Self {
        Self {
            flight_cost: 1.0,
            hotel_cost: 0.8,
            transfer_cost: 0.5,
            arrival_spread: 5.0,
            travel_time: 2.0,
            connections: 500.0,
            late_arrival_risk: 200.0,
            operational_complexity: 300.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub baseline: ScoreWeights,
    pub extended: ExtendedWeights,
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ScoringError> {
        let b = &self.baseline;
        let e = &self.extended;
        let weights = [
            ("baseline.cost", b.cost),
            ("baseline.arrival_spread", b.arrival_spread),
            ("baseline.travel_time", b.travel_time),
            ("baseline.connections", b.connections),
            ("extended.flight_cost", e.flight_cost),
            ("extended.hotel_cost", e.hotel_cost),
            ("extended.transfer_cost", e.transfer_cost),
            ("extended.arrival_spread", e.arrival_spread),
            ("extended.travel_time", e.travel_time),
            ("extended.connections", e.connections),
            ("extended.late_arrival_risk", e.late_arrival_risk),
            ("extended.operational_complexity", e.operational_complexity),
        ];
        for (field, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(ScoringError::InvalidWeight { field, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BaselineMetrics {
    pub total_cost: f64,
    pub arrival_spread_minutes: f64,
    pub avg_travel_time_minutes: f64,
    pub connections_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExtendedInputs {
    pub flight_cost: f64,
    pub hotel_cost: f64,
    pub transfer_cost: f64,
    pub arrival_spread_minutes: f64,
    pub avg_travel_time_minutes: f64,
    pub connections_rate: f64,
    pub late_arrival_risk: f64,
    pub operational_complexity_score: f64,
}

// Metrics are costs, durations and rates: finite and never below zero
fn finite(field: &'static str, value: f64) -> Result<f64, ScoringError> {
    if !value.is_finite() {
        Err(ScoringError::NonFiniteInput { field, value })
    } else if value < 0.0 {
        Err(ScoringError::NegativeInput { field, value })
    } else {
        Ok(value)
    }
}

/// Pure scoring functions over a validated weight vector.
///
/// With non-negative weights the score never decreases when any single
/// input grows. Weights are validated once at construction.
#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Result<Self, ScoringError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn score_baseline(&self, metrics: &BaselineMetrics) -> Result<f64, ScoringError> {
        let w = &self.config.baseline;
        Ok(finite("total_cost", metrics.total_cost)? * w.cost
            + finite("arrival_spread_minutes", metrics.arrival_spread_minutes)? * w.arrival_spread
            + finite("avg_travel_time_minutes", metrics.avg_travel_time_minutes)? * w.travel_time
            + finite("connections_rate", metrics.connections_rate)? * w.connections)
    }

    pub fn score_extended(&self, inputs: &ExtendedInputs) -> Result<f64, ScoringError> {
        let w = &self.config.extended;
        Ok(finite("flight_cost", inputs.flight_cost)? * w.flight_cost
            + finite("hotel_cost", inputs.hotel_cost)? * w.hotel_cost
            + finite("transfer_cost", inputs.transfer_cost)? * w.transfer_cost
            + finite("arrival_spread_minutes", inputs.arrival_spread_minutes)? * w.arrival_spread
            + finite("avg_travel_time_minutes", inputs.avg_travel_time_minutes)? * w.travel_time
            + finite("connections_rate", inputs.connections_rate)? * w.connections
            + finite("late_arrival_risk", inputs.late_arrival_risk)? * w.late_arrival_risk
            + finite(
                "operational_complexity_score",
                inputs.operational_complexity_score,
            )? * w.operational_complexity)
    }
}

// Flight-side aggregates for one option, computed after the pricing fan-out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightMetrics {
    pub total_cost: f64,
    pub avg_travel_time_minutes: f64,
    pub arrival_spread_minutes: f64,
    pub connections_rate: f64,
    pub late_arrival_risk: f64,
    pub arrival_histogram: [u32; 24],
    pub co2_kg: f64,
}

impl FlightMetrics {
    pub fn baseline(&self) -> BaselineMetrics {
        BaselineMetrics {
            total_cost: self.total_cost,
            arrival_spread_minutes: self.arrival_spread_minutes,
            avg_travel_time_minutes: self.avg_travel_time_minutes,
            connections_rate: self.connections_rate,
        }
    }
}

// Share of itineraries with at least one stop
pub fn connections_rate(itineraries: &[&Itinerary]) -> f64 {
    if itineraries.is_empty() {
        return 0.0;
    }
    let connecting = itineraries.iter().filter(|i| i.has_connection()).count();
    connecting as f64 / itineraries.len() as f64
}

pub fn arrival_spread_minutes(itineraries: &[&Itinerary]) -> f64 {
    let earliest = itineraries.iter().map(|i| i.arrival).min();
    let latest = itineraries.iter().map(|i| i.arrival).max();
    match (earliest, latest) {
        (Some(earliest), Some(latest)) => (latest - earliest).num_seconds() as f64 / 60.0,
        _ => 0.0,
    }
}

// Share of attendees landing at or after `late_hour` local destination time
pub fn late_arrival_risk(itineraries: &[&Itinerary], late_hour: u32) -> f64 {
    if itineraries.is_empty() {
        return 0.0;
    }
    let late = itineraries
        .iter()
        .filter(|i| i.arrival.hour() >= late_hour)
        .count();
    late as f64 / itineraries.len() as f64
}

pub fn arrival_histogram(itineraries: &[&Itinerary]) -> [u32; 24] {
    let mut buckets = [0u32; 24];
    for itinerary in itineraries {
        buckets[itinerary.arrival.hour() as usize] += 1;
    }
    buckets
}

// Round-trip estimate: flight hours both ways, scaled by cabin class
pub fn co2_estimate_kg(itineraries: &[&Itinerary], kg_per_flight_hour: f64) -> f64 {
    itineraries
        .iter()
        .map(|i| {
            let hours = i.travel_minutes as f64 / 60.0;
            hours * 2.0 * kg_per_flight_hour * i.travel_class.emissions_multiplier()
        })
        .sum()
}

pub fn aggregate(itineraries: &[&Itinerary], late_hour: u32, kg_per_flight_hour: f64) -> FlightMetrics {
    let count = itineraries.len();
    let total_cost: f64 = itineraries.iter().map(|i| i.price).sum();
    let total_travel: u64 = itineraries.iter().map(|i| i.travel_minutes as u64).sum();
    let avg_travel_time_minutes = if count > 0 {
        total_travel as f64 / count as f64
    } else {
        0.0
    };

    FlightMetrics {
        total_cost,
        avg_travel_time_minutes,
        arrival_spread_minutes: arrival_spread_minutes(itineraries),
        connections_rate: connections_rate(itineraries),
        late_arrival_risk: late_arrival_risk(itineraries, late_hour),
        arrival_histogram: arrival_histogram(itineraries),
        co2_kg: co2_estimate_kg(itineraries, kg_per_flight_hour),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QuoteSource, TravelClass};
    use chrono::{NaiveDate, NaiveTime};
    use test_case::test_case;

    fn sample_inputs() -> ExtendedInputs {
        ExtendedInputs {
            flight_cost: 10000.0,
            hotel_cost: 5000.0,
            transfer_cost: 1000.0,
            arrival_spread_minutes: 120.0,
            avg_travel_time_minutes: 600.0,
            connections_rate: 0.3,
            late_arrival_risk: 0.2,
            operational_complexity_score: 50.0,
        }
    }

    fn itinerary(arrive: &str, stops: u32, minutes: u32, price: f64) -> Itinerary {
        let depart_date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        Itinerary {
            origin: "JFK".into(),
            destination: "LIS".into(),
            depart_date,
            return_date: NaiveDate::from_ymd_opt(2025, 6, 4).unwrap(),
            airline: "TP".into(),
            travel_class: TravelClass::Economy,
            stops,
            depart_time: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            arrival: depart_date.and_time(NaiveTime::parse_from_str(arrive, "%H:%M").unwrap()),
            return_depart_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            travel_minutes: minutes,
            price,
            segments: vec![],
            booking_link: None,
            source: QuoteSource::Mock,
        }
    }

    #[test]
    fn test_baseline_known_value() {
        let engine = ScoringEngine::default();
        let score = engine
            .score_baseline(&BaselineMetrics {
                total_cost: 10000.0,
                arrival_spread_minutes: 120.0,
                avg_travel_time_minutes: 600.0,
                connections_rate: 0.3,
            })
            .unwrap();
        assert_eq!(score, 11950.0);
    }

    #[test]
    fn test_extended_known_value() {
        let engine = ScoringEngine::default();
        // 10000 + 4000 + 500 + 600 + 1200 + 150 + 40 + 15000
        assert_eq!(engine.score_extended(&sample_inputs()).unwrap(), 31490.0);
    }

    #[test]
    fn test_extended_hotel_weight() {
        let engine = ScoringEngine::default();
        let mut low = sample_inputs();
        low.hotel_cost = 3000.0;
        let high = sample_inputs();

        let delta = engine.score_extended(&high).unwrap() - engine.score_extended(&low).unwrap();
        assert!((delta - 1600.0).abs() < 1e-9, "delta was {}", delta);
    }

    #[test]
    fn test_extended_late_arrival_penalty() {
        let engine = ScoringEngine::default();
        let mut low_risk = sample_inputs();
        low_risk.late_arrival_risk = 0.1;
        let mut high_risk = sample_inputs();
        high_risk.late_arrival_risk = 0.8;

        let delta =
            engine.score_extended(&high_risk).unwrap() - engine.score_extended(&low_risk).unwrap();
        assert!((delta - 140.0).abs() < 1e-9, "delta was {}", delta);
    }

    #[test_case(0; "cost")]
    #[test_case(1; "arrival spread")]
    #[test_case(2; "travel time")]
    #[test_case(3; "connections rate")]
    fn test_baseline_strictly_increasing(field: usize) {
        let engine = ScoringEngine::default();
        let base = [2500.0, 45.0, 300.0, 0.25];
        let mut previous = f64::NEG_INFINITY;
        for step in 0..5 {
            let mut values = base;
            values[field] += step as f64 * 0.5;
            let score = engine
                .score_baseline(&BaselineMetrics {
                    total_cost: values[0],
                    arrival_spread_minutes: values[1],
                    avg_travel_time_minutes: values[2],
                    connections_rate: values[3],
                })
                .unwrap();
            assert!(score > previous, "field {} step {}", field, step);
            previous = score;
        }
    }

    #[test]
    fn test_non_finite_inputs_rejected() {
        let engine = ScoringEngine::default();
        let result = engine.score_baseline(&BaselineMetrics {
            total_cost: f64::NAN,
            ..Default::default()
        });
        assert!(matches!(
            result,
            Err(ScoringError::NonFiniteInput { field: "total_cost", .. })
        ));

        let mut inputs = sample_inputs();
        inputs.operational_complexity_score = f64::INFINITY;
        assert!(matches!(
            engine.score_extended(&inputs),
            Err(ScoringError::NonFiniteInput {
                field: "operational_complexity_score",
                ..
            })
        ));
    }

    #[test]
    fn test_negative_inputs_rejected() {
        let engine = ScoringEngine::default();
        let mut inputs = sample_inputs();
        inputs.hotel_cost = -500.0;
        assert_eq!(
            engine.score_extended(&inputs),
            Err(ScoringError::NegativeInput {
                field: "hotel_cost",
                value: -500.0
            })
        );

        let result = engine.score_baseline(&BaselineMetrics {
            connections_rate: -0.1,
            ..Default::default()
        });
        assert!(matches!(
            result,
            Err(ScoringError::NegativeInput { field: "connections_rate", .. })
        ));

        // Zero is a valid measurement
        assert_eq!(engine.score_baseline(&BaselineMetrics::default()), Ok(0.0));
    }

    #[test_case(0; "flight cost")]
    #[test_case(1; "hotel cost")]
    #[test_case(2; "transfer cost")]
    #[test_case(3; "arrival spread")]
    #[test_case(4; "travel time")]
    #[test_case(5; "connections rate")]
    #[test_case(6; "late arrival risk")]
    #[test_case(7; "operational complexity")]
    fn test_extended_strictly_increasing(field: usize) {
        let engine = ScoringEngine::default();
        let mut previous = f64::NEG_INFINITY;
        for step in 0..5 {
            let mut inputs = sample_inputs();
            let bump = step as f64 * 0.05;
            let slot = match field {
                0 => &mut inputs.flight_cost,
                1 => &mut inputs.hotel_cost,
                2 => &mut inputs.transfer_cost,
                3 => &mut inputs.arrival_spread_minutes,
                4 => &mut inputs.avg_travel_time_minutes,
                5 => &mut inputs.connections_rate,
                6 => &mut inputs.late_arrival_risk,
                _ => &mut inputs.operational_complexity_score,
            };
            *slot += bump;
            let score = engine.score_extended(&inputs).unwrap();
            assert!(score > previous, "field {} step {}", field, step);
            previous = score;
        }
    }

    #[test]
    fn test_custom_weights_are_applied() {
        let config = ScoringConfig {
            baseline: ScoreWeights {
                cost: 2.0,
                arrival_spread: 0.0,
                travel_time: 0.0,
                connections: 0.0,
            },
            ..Default::default()
        };
        let engine = ScoringEngine::new(config).unwrap();
        let score = engine
            .score_baseline(&BaselineMetrics {
                total_cost: 100.0,
                arrival_spread_minutes: 999.0,
                avg_travel_time_minutes: 999.0,
                connections_rate: 1.0,
            })
            .unwrap();
        assert_eq!(score, 200.0);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut config = ScoringConfig::default();
        config.extended.hotel_cost = -0.8;
        assert!(matches!(
            ScoringEngine::new(config),
            Err(ScoringError::InvalidWeight { field: "extended.hotel_cost", .. })
        ));
    }

    #[test]
    fn test_aggregate_metrics() {
        let a = itinerary("09:30", 0, 300, 400.0);
        let b = itinerary("11:30", 1, 500, 600.0);
        let c = itinerary("18:00", 2, 400, 500.0);
        let d = itinerary("20:15", 0, 200, 300.0);
        let itineraries = vec![&a, &b, &c, &d];

        let metrics = aggregate(&itineraries, 18, 90.0);
        assert_eq!(metrics.total_cost, 1800.0);
        assert_eq!(metrics.avg_travel_time_minutes, 350.0);
        assert_eq!(metrics.arrival_spread_minutes, 645.0);
        assert_eq!(metrics.connections_rate, 0.5);
        // 18:00 counts as late
        assert_eq!(metrics.late_arrival_risk, 0.5);
        assert_eq!(metrics.arrival_histogram[9], 1);
        assert_eq!(metrics.arrival_histogram[18], 1);
        assert_eq!(metrics.arrival_histogram.iter().sum::<u32>(), 4);
        // 1400 flight minutes, both directions, 90 kg/h
        assert!((metrics.co2_kg - 1400.0 / 60.0 * 2.0 * 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_attendee_has_no_spread() {
        let a = itinerary("14:00", 0, 300, 400.0);
        assert_eq!(arrival_spread_minutes(&[&a]), 0.0);
        assert_eq!(arrival_spread_minutes(&[]), 0.0);
        assert_eq!(connections_rate(&[]), 0.0);
    }
}
