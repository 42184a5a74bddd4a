// Fixtures shared by the unit tests

use crate::models::{
    Attendee, DateWindow, EventPlan, Hotel, Itinerary, QuoteSource, TransferMode, TransferOption,
    TravelClass, TravelConstraints,
};
use crate::pricing::{PricingError, PricingPort};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
}

pub fn at(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").unwrap()
}

// Direct economy itinerary arriving on 2025-06-01 at `arrival`
pub fn itinerary_to(origin: &str, destination: &str, arrival: &str) -> Itinerary {
    Itinerary {
        origin: origin.to_string(),
        destination: destination.to_string(),
        depart_date: date("2025-06-01"),
        return_date: date("2025-06-04"),
        airline: "TP".to_string(),
        travel_class: TravelClass::Economy,
        stops: 0,
        depart_time: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        arrival: at(&format!("2025-06-01 {}", arrival)),
        return_depart_time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
        travel_minutes: 300,
        price: 500.0,
        segments: Vec::new(),
        booking_link: None,
        source: QuoteSource::Mock,
    }
}

pub fn hotel(id: &str, rate: Option<f64>, distance: Option<f64>, capacity: Option<u32>) -> Hotel {
    Hotel {
        id: id.to_string(),
        name: format!("Hotel {}", id),
        airport_code: "LIS".to_string(),
        approved: true,
        nightly_rate: rate,
        distance_to_venue_km: distance,
        capacity,
    }
}

pub fn transfer_option(id: &str, mode: TransferMode, capacity: u32, cost: f64) -> TransferOption {
    TransferOption {
        id: id.to_string(),
        airport_code: "LIS".to_string(),
        hotel_id: None,
        mode,
        capacity,
        cost_per_trip: cost,
        duration_minutes: 40,
    }
}

pub fn attendees(airports: &[&str]) -> Vec<Attendee> {
    airports
        .iter()
        .enumerate()
        .map(|(i, airport)| Attendee::new(&format!("att-{}", i), &format!("E{:03}", i), airport))
        .collect()
}

pub fn event(destinations: &[&str], windows: &[(&str, &str)], airports: &[&str]) -> EventPlan {
    EventPlan {
        name: "offsite".to_string(),
        candidate_destinations: destinations.iter().map(|d| d.to_string()).collect(),
        date_windows: windows
            .iter()
            .map(|(start, end)| DateWindow::parse(start, end).unwrap())
            .collect(),
        duration_days: 3,
        attendees: attendees(airports),
    }
}

// Always unavailable
#[derive(Default)]
pub struct FailingPricing {
    pub calls: AtomicUsize,
}

#[async_trait]
impl PricingPort for FailingPricing {
    async fn get_best_itinerary(
        &self,
        origin: &str,
        destination: &str,
        _depart_date: NaiveDate,
        _return_date: NaiveDate,
        _constraints: &TravelConstraints,
    ) -> Result<Itinerary, PricingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PricingError::Unavailable(format!(
            "no fares for {}-{}",
            origin, destination
        )))
    }
}

// Delegates to a mock provider except for the listed destinations
pub struct SelectivePricing {
    pub failing_destinations: HashSet<String>,
    pub inner: crate::pricing::MockPricingProvider,
}

impl SelectivePricing {
    pub fn failing(destinations: &[&str]) -> Self {
        Self {
            failing_destinations: destinations.iter().map(|d| d.to_string()).collect(),
            inner: crate::pricing::MockPricingProvider::default(),
        }
    }
}

#[async_trait]
impl PricingPort for SelectivePricing {
    async fn get_best_itinerary(
        &self,
        origin: &str,
        destination: &str,
        depart_date: NaiveDate,
        return_date: NaiveDate,
        constraints: &TravelConstraints,
    ) -> Result<Itinerary, PricingError> {
        if self.failing_destinations.contains(destination) {
            return Err(PricingError::Unavailable(format!("{} is not served", destination)));
        }
        self.inner
            .quote(origin, destination, depart_date, return_date, constraints)
    }
}
