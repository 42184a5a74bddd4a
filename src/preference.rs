// Learned per-attendee soft preferences
// Scores are advisory: they rank itineraries for one attendee and never
// exclude any of them.

use crate::models::Itinerary;
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const EMA_ALPHA: f64 = 0.1;
const EARLY_DEPARTURE_HOUR: u32 = 10;
const MAX_PREFERRED_HUBS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl ArrivalWindow {
    // Two hours either side of `hour`, clamped to the day
    pub fn around(hour: u32) -> Self {
        Self {
            start_hour: hour.saturating_sub(2),
            end_hour: (hour + 2).min(23),
        }
    }

    pub fn contains(&self, hour: u32) -> bool {
        (self.start_hour..=self.end_hour).contains(&hour)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceProfile {
    pub attendee_id: String,
    // Both in [0, 1]; 0.5 means no signal yet
    pub prefers_early_flights: f64,
    pub avoids_connections: f64,
    pub preferred_hubs: Vec<String>,
    pub typical_arrival_window: Option<ArrivalWindow>,
    pub reliability: f64,
}

impl PreferenceProfile {
    pub fn new(attendee_id: &str) -> Self {
        Self {
            attendee_id: attendee_id.to_string(),
            prefers_early_flights: 0.5,
            avoids_connections: 0.5,
            preferred_hubs: Vec::new(),
            typical_arrival_window: None,
            reliability: 1.0,
        }
    }

    /// Fold one booked itinerary into the profile.
    pub fn update_from_booking(&mut self, booked: &Itinerary) {
        let early = indicator(booked.depart_time.hour() < EARLY_DEPARTURE_HOUR);
        let direct = indicator(booked.stops == 0);
        self.prefers_early_flights = ema(self.prefers_early_flights, early);
        self.avoids_connections = ema(self.avoids_connections, direct);

        self.typical_arrival_window = Some(ArrivalWindow::around(booked.arrival.hour()));

        if !self.preferred_hubs.contains(&booked.destination) {
            self.preferred_hubs.push(booked.destination.clone());
            if self.preferred_hubs.len() > MAX_PREFERRED_HUBS {
                let excess = self.preferred_hubs.len() - MAX_PREFERRED_HUBS;
                self.preferred_hubs.drain(..excess);
            }
        }
    }

    /// Alignment with the profile in [0, 1]; higher is better.
    pub fn soft_score(&self, itinerary: &Itinerary) -> f64 {
        let early = indicator(itinerary.depart_time.hour() < EARLY_DEPARTURE_HOUR);
        let direct = indicator(itinerary.stops == 0);

        let mut score = (1.0 - (early - self.prefers_early_flights).abs()) * 0.3;
        score += (1.0 - (direct - self.avoids_connections).abs()) * 0.3;
        if self.preferred_hubs.contains(&itinerary.destination) {
            score += 0.2;
        }
        if let Some(window) = self.typical_arrival_window {
            if window.contains(itinerary.arrival.hour()) {
                score += 0.2;
            }
        }
        score
    }
}

fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

fn ema(previous: f64, observation: f64) -> f64 {
    (1.0 - EMA_ALPHA) * previous + EMA_ALPHA * observation
}

// Best match first; equal scores keep input order
pub fn rank_by_preference<'a>(
    profile: &PreferenceProfile,
    itineraries: &'a [Itinerary],
) -> Vec<(&'a Itinerary, f64)> {
    let mut scored: Vec<(&Itinerary, f64)> = itineraries
        .iter()
        .map(|itinerary| (itinerary, profile.soft_score(itinerary)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored
}
