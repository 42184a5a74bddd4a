// Ground transfers: cluster arrivals into waves and assign vehicles per wave
// This approximates batching only; no routing between stops is attempted.

use crate::models::{TransferMode, TransferOption};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    #[error("Mismatched inputs: {arrivals} arrivals but {ids} attendee ids")]
    LengthMismatch { arrivals: usize, ids: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub wave_window_minutes: u32,
    // Minimum wave size that gets a group vehicle
    pub van_threshold: u32,
    pub vehicle_weight: f64,
    pub wave_weight: f64,
    pub mode_weight: f64,
    pub utilisation_weight: f64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            wave_window_minutes: 30,
            van_threshold: 3,
            vehicle_weight: 10.0,
            wave_weight: 5.0,
            mode_weight: 3.0,
            utilisation_weight: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferWave {
    pub wave_start: NaiveDateTime,
    pub wave_end: NaiveDateTime,
    pub attendee_ids: Vec<String>,
}

impl TransferWave {
    pub fn size(&self) -> u32 {
        self.attendee_ids.len() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferLeg {
    pub wave: TransferWave,
    pub mode: TransferMode,
    pub option_id: String,
    pub vehicle_count: u32,
    pub cost: f64,
    // Occupied seats over provisioned seats
    pub capacity_utilization: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferPlan {
    pub airport_code: String,
    pub hotel_id: String,
    pub legs: Vec<TransferLeg>,
    pub total_cost: f64,
    pub total_vehicles: u32,
    pub operational_complexity_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TransferBatcher {
    config: TransferConfig,
}

impl TransferBatcher {
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Greedy fixed-window clustering.
    ///
    /// A wave opens at the first unclustered arrival and closes
    /// `window_minutes` later; the window does not slide as members join.
    /// Arrivals sharing a timestamp are ordered by attendee id.
    pub fn compute_waves(
        &self,
        arrivals: &[NaiveDateTime],
        ids: &[String],
        window_minutes: u32,
    ) -> Result<Vec<TransferWave>, TransferError> {
        if arrivals.len() != ids.len() {
            return Err(TransferError::LengthMismatch {
                arrivals: arrivals.len(),
                ids: ids.len(),
            });
        }

        let mut pairs: Vec<(NaiveDateTime, &String)> = arrivals.iter().copied().zip(ids).collect();
        pairs.sort();

        let window = Duration::minutes(window_minutes as i64);
        let mut waves: Vec<TransferWave> = Vec::new();
        for (arrival, id) in pairs {
            match waves.last_mut() {
                Some(current) if arrival <= current.wave_end => {
                    current.attendee_ids.push(id.clone());
                }
                _ => waves.push(TransferWave {
                    wave_start: arrival,
                    wave_end: arrival + window,
                    attendee_ids: vec![id.clone()],
                }),
            }
        }
        Ok(waves)
    }

    // First option matching the wanted kind, else the first option at all
    fn pick_option(options: &[TransferOption], group: bool) -> Option<&TransferOption> {
        options
            .iter()
            .find(|o| o.mode.is_group() == group)
            .or_else(|| options.first())
    }

    /// Assign every wave to a vehicle mode. Returns `None` when no transfer
    /// option serves this airport and hotel.
    pub fn plan(
        &self,
        airport_code: &str,
        hotel_id: &str,
        waves: &[TransferWave],
        options: &[TransferOption],
    ) -> Option<TransferPlan> {
        let group_option = Self::pick_option(options, true)?;
        let individual_option = Self::pick_option(options, false)?;

        let legs: Vec<TransferLeg> = waves
            .iter()
            .map(|wave| {
                let size = wave.size();
                if size >= self.config.van_threshold {
                    let capacity = group_option.capacity.max(1);
                    let vehicles = size.div_ceil(capacity);
                    TransferLeg {
                        wave: wave.clone(),
                        mode: group_option.mode,
                        option_id: group_option.id.clone(),
                        vehicle_count: vehicles,
                        cost: vehicles as f64 * group_option.cost_per_trip,
                        capacity_utilization: size as f64 / (vehicles * capacity) as f64,
                    }
                } else {
                    TransferLeg {
                        wave: wave.clone(),
                        mode: individual_option.mode,
                        option_id: individual_option.id.clone(),
                        vehicle_count: size,
                        cost: size as f64 * individual_option.cost_per_trip,
                        capacity_utilization: 1.0,
                    }
                }
            })
            .collect();

        let total_cost = legs.iter().map(|leg| leg.cost).sum();
        let total_vehicles = legs.iter().map(|leg| leg.vehicle_count).sum();
        let operational_complexity_score = self.complexity_score(&legs);

        Some(TransferPlan {
            airport_code: airport_code.to_string(),
            hotel_id: hotel_id.to_string(),
            legs,
            total_cost,
            total_vehicles,
            operational_complexity_score,
        })
    }

    // Fewer vehicles, fewer waves, one mode and full vehicles all lower the score
    pub fn complexity_score(&self, legs: &[TransferLeg]) -> f64 {
        let vehicles: u32 = legs.iter().map(|leg| leg.vehicle_count).sum();
        let modes: BTreeSet<TransferMode> = legs.iter().map(|leg| leg.mode).collect();
        let avg_utilisation = if legs.is_empty() {
            1.0
        } else {
            legs.iter().map(|leg| leg.capacity_utilization).sum::<f64>() / legs.len() as f64
        };

        vehicles as f64 * self.config.vehicle_weight
            + legs.len() as f64 * self.config.wave_weight
            + modes.len() as f64 * self.config.mode_weight
            + (1.0 - avg_utilisation) * self.config.utilisation_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, transfer_option};

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("a{}", i)).collect()
    }

    fn offsets(minutes: &[i64]) -> Vec<NaiveDateTime> {
        let base = at("2025-06-01 14:00");
        minutes.iter().map(|m| base + Duration::minutes(*m)).collect()
    }

    #[test]
    fn test_waves_fixed_window() {
        let batcher = TransferBatcher::default();
        let waves = batcher
            .compute_waves(&offsets(&[0, 10, 20, 45, 50]), &ids(5), 30)
            .unwrap();

        let sizes: Vec<u32> = waves.iter().map(|w| w.size()).collect();
        assert_eq!(sizes, vec![3, 2]);
        assert_eq!(waves[1].wave_start, at("2025-06-01 14:45"));
        assert_eq!(waves[1].wave_end, at("2025-06-01 15:15"));
    }

    #[test]
    fn test_window_does_not_slide() {
        let batcher = TransferBatcher::default();
        // 25 and 50 are each within 30 of the previous arrival, but 50 is past 0+30
        let waves = batcher
            .compute_waves(&offsets(&[50, 0, 25]), &ids(3), 30)
            .unwrap();
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0].attendee_ids, vec!["a1", "a2"]);
        assert_eq!(waves[1].attendee_ids, vec!["a0"]);
    }

    #[test]
    fn test_boundary_arrival_joins_wave() {
        let batcher = TransferBatcher::default();
        let waves = batcher.compute_waves(&offsets(&[0, 30]), &ids(2), 30).unwrap();
        assert_eq!(waves.len(), 1);
    }

    #[test]
    fn test_waves_input_validation() {
        let batcher = TransferBatcher::default();
        assert!(batcher.compute_waves(&[], &[], 30).unwrap().is_empty());
        assert_eq!(
            batcher.compute_waves(&offsets(&[0]), &ids(2), 30),
            Err(TransferError::LengthMismatch { arrivals: 1, ids: 2 })
        );
    }

    #[test]
    fn test_plan_assigns_modes_by_wave_size() {
        let batcher = TransferBatcher::default();
        let waves = batcher
            .compute_waves(&offsets(&[0, 5, 10, 12, 15, 20, 25, 90, 200]), &ids(9), 30)
            .unwrap();
        let options = vec![
            transfer_option("van", TransferMode::Van, 6, 120.0),
            transfer_option("ride", TransferMode::Rideshare, 4, 45.0),
        ];

        let plan = batcher.plan("LIS", "h1", &waves, &options).unwrap();
        assert_eq!(plan.legs.len(), 3);

        // Seven arrivals in the first wave need two six-seat vans
        let first = &plan.legs[0];
        assert_eq!(first.mode, TransferMode::Van);
        assert_eq!(first.vehicle_count, 2);
        assert_eq!(first.cost, 240.0);
        assert!((first.capacity_utilization - 7.0 / 12.0).abs() < 1e-12);

        for leg in &plan.legs[1..] {
            assert_eq!(leg.mode, TransferMode::Rideshare);
            assert_eq!(leg.vehicle_count, 1);
            assert_eq!(leg.capacity_utilization, 1.0);
        }

        let leg_sum: f64 = plan.legs.iter().map(|l| l.cost).sum();
        assert_eq!(plan.total_cost, leg_sum);
        assert_eq!(plan.total_cost, 240.0 + 90.0);
        assert_eq!(plan.total_vehicles, 4);

        // 4*10 + 3*5 + 2*3 + (1 - (7/12 + 1 + 1)/3) * 20
        let expected = 40.0 + 15.0 + 6.0 + (1.0 - (7.0 / 12.0 + 2.0) / 3.0) * 20.0;
        assert!((plan.operational_complexity_score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_plan_falls_back_to_only_option() {
        let batcher = TransferBatcher::default();
        let waves = batcher.compute_waves(&offsets(&[0, 120]), &ids(2), 30).unwrap();
        let options = vec![transfer_option("shuttle", TransferMode::Shuttle, 10, 30.0)];

        let plan = batcher.plan("LIS", "h1", &waves, &options).unwrap();
        assert!(plan.legs.iter().all(|l| l.mode == TransferMode::Shuttle));
        assert_eq!(plan.total_vehicles, 2);
        assert_eq!(plan.total_cost, 60.0);
    }

    #[test]
    fn test_plan_without_options() {
        let batcher = TransferBatcher::default();
        let waves = batcher.compute_waves(&offsets(&[0]), &ids(1), 30).unwrap();
        assert!(batcher.plan("LIS", "h1", &waves, &[]).is_none());
    }

    #[test]
    fn test_empty_plan_complexity() {
        let batcher = TransferBatcher::default();
        assert_eq!(batcher.complexity_score(&[]), 0.0);
    }
}
