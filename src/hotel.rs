// Hotel allocation: room-night demand curve and hotel choice for one option

use crate::models::Hotel;
use chrono::{Days, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocationError {
    #[error("Mismatched inputs: {arrivals} arrivals but {departures} departures")]
    LengthMismatch { arrivals: usize, departures: usize },

    #[error("Event of {duration_days} days starting {start} runs past the calendar")]
    DateOutOfRange { start: NaiveDate, duration_days: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotelConfig {
    // Nightly rate assumed when the chosen hotel publishes none
    pub fallback_nightly_rate: f64,
    pub missing_rate_penalty: f64,
    pub rate_weight: f64,
    pub distance_weight: f64,
    pub capacity_weight: f64,
    pub approved_only: bool,
}

impl Default for HotelConfig {
    fn default() -> Self {
        Self {
            fallback_nightly_rate: 150.0,
            missing_rate_penalty: 10_000.0,
            rate_weight: 100.0,
            distance_weight: 10.0,
            capacity_weight: 5.0,
            approved_only: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoomNightAnalysis {
    pub event_start: Option<NaiveDate>,
    // One entry per event night, starting at `event_start`
    pub required_rooms_per_night: Vec<u32>,
    pub peak_occupancy: u32,
    pub nights_with_peak: u32,
    pub shoulder_nights: u32,
    pub total_room_nights: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelAssignment {
    pub hotel_id: String,
    pub hotel_name: String,
    pub destination: String,
    pub nightly_rate: f64,
    pub total_cost: f64,
    pub room_nights: u32,
    pub extra_nights: u32,
    pub room_night_analysis: RoomNightAnalysis,
}

#[derive(Debug, Clone, Default)]
pub struct HotelAllocator {
    config: HotelConfig,
}

impl HotelAllocator {
    pub fn new(config: HotelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HotelConfig {
        &self.config
    }

    /// Night-by-night room demand for one option.
    ///
    /// The event occupies `[earliest arrival date, + duration_days)`. Each
    /// attendee holds a room for the part of their stay inside that window.
    /// Nights outside it are counted per attendee as shoulder nights, so two
    /// people arriving a day early add two shoulder nights even though they
    /// share the same calendar night. That is a cost figure, not occupancy.
    pub fn compute_room_nights(
        &self,
        arrivals: &[NaiveDateTime],
        departures: &[NaiveDateTime],
        duration_days: u32,
    ) -> Result<RoomNightAnalysis, AllocationError> {
        if arrivals.len() != departures.len() {
            return Err(AllocationError::LengthMismatch {
                arrivals: arrivals.len(),
                departures: departures.len(),
            });
        }
        let Some(event_start) = arrivals.iter().map(|a| a.date()).min() else {
            return Ok(RoomNightAnalysis::default());
        };
        let event_end = event_start
            .checked_add_days(Days::new(u64::from(duration_days)))
            .ok_or(AllocationError::DateOutOfRange {
                start: event_start,
                duration_days,
            })?;

        let mut rooms_per_night: HashMap<NaiveDate, u32> = HashMap::new();
        let mut shoulder_nights: u32 = 0;

        for (arrival, departure) in arrivals.iter().zip(departures) {
            let (arrival, departure) = (arrival.date(), departure.date());

            let mut night = arrival.max(event_start);
            let check_out = departure.min(event_end);
            while night < check_out {
                *rooms_per_night.entry(night).or_insert(0) += 1;
                night += Duration::days(1);
            }

            if arrival < event_start {
                shoulder_nights += (event_start - arrival).num_days() as u32;
            }
            if departure > event_end {
                shoulder_nights += (departure - event_end).num_days() as u32;
            }
        }

        let required_rooms_per_night: Vec<u32> = (0..duration_days as i64)
            .map(|offset| {
                let night = event_start + Duration::days(offset);
                rooms_per_night.get(&night).copied().unwrap_or(0)
            })
            .collect();
        let peak_occupancy = required_rooms_per_night.iter().copied().max().unwrap_or(0);
        let nights_with_peak = required_rooms_per_night
            .iter()
            .filter(|&&rooms| rooms == peak_occupancy)
            .count() as u32;
        let total_room_nights = required_rooms_per_night.iter().sum::<u32>() + shoulder_nights;

        Ok(RoomNightAnalysis {
            event_start: Some(event_start),
            required_rooms_per_night,
            peak_occupancy,
            nights_with_peak,
            shoulder_nights,
            total_room_nights,
        })
    }

    // Lower is better; None when the hotel cannot hold the peak
    fn hotel_score(&self, hotel: &Hotel, peak_occupancy: u32) -> Option<f64> {
        if let Some(capacity) = hotel.capacity {
            if capacity < peak_occupancy {
                return None;
            }
        }

        let mut score = match hotel.nightly_rate {
            Some(rate) => rate * self.config.rate_weight,
            None => self.config.missing_rate_penalty,
        };
        if let Some(distance) = hotel.distance_to_venue_km {
            score += distance * self.config.distance_weight;
        }
        if let Some(capacity) = hotel.capacity {
            score += capacity.abs_diff(peak_occupancy) as f64 * self.config.capacity_weight;
        }
        Some(score)
    }

    /// Choose the best-scoring hotel that can hold the peak night.
    /// Hotels with unknown capacity are not filtered out. Earlier
    /// candidates win ties.
    pub fn select_hotel(
        &self,
        destination: &str,
        analysis: &RoomNightAnalysis,
        candidates: &[Hotel],
    ) -> Option<HotelAssignment> {
        let mut best: Option<(&Hotel, f64)> = None;
        for hotel in candidates {
            let Some(score) = self.hotel_score(hotel, analysis.peak_occupancy) else {
                continue;
            };
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, best_score)) if best_score <= score => {}
                _ => best = Some((hotel, score)),
            }
        }
        let (hotel, _) = best?;

        let extra_nights = analysis.shoulder_nights;
        let event_nights = analysis.total_room_nights.saturating_sub(extra_nights);
        Some(HotelAssignment {
            hotel_id: hotel.id.clone(),
            hotel_name: hotel.name.clone(),
            destination: destination.to_string(),
            nightly_rate: hotel.nightly_rate.unwrap_or(self.config.fallback_nightly_rate),
            total_cost: self.calculate_hotel_cost(hotel.nightly_rate, event_nights, extra_nights),
            room_nights: analysis.total_room_nights,
            extra_nights,
            room_night_analysis: analysis.clone(),
        })
    }

    // Shoulder nights are billed at the same rate as event nights
    pub fn calculate_hotel_cost(&self, nightly_rate: Option<f64>, room_nights: u32, extra_nights: u32) -> f64 {
        let rate = nightly_rate.unwrap_or(self.config.fallback_nightly_rate);
        rate * (room_nights + extra_nights) as f64
    }
}
