// Domain records shared by the pricing, allocation and simulation layers

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum InputError {
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Date window ends ({end}) before it starts ({start})")]
    InvertedWindow { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelClass {
    #[default]
    Economy,
    PremiumEconomy,
    Business,
    First,
}

impl TravelClass {
    // Fare multiplier relative to economy
    pub fn price_multiplier(self) -> f64 {
        match self {
            TravelClass::Economy => 1.0,
            TravelClass::PremiumEconomy => 1.5,
            TravelClass::Business => 3.0,
            TravelClass::First => 5.0,
        }
    }

    // Seat-area share used for per-passenger emissions
    pub fn emissions_multiplier(self) -> f64 {
        match self {
            TravelClass::Economy => 1.0,
            TravelClass::PremiumEconomy => 1.6,
            TravelClass::Business => 2.9,
            TravelClass::First => 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    pub id: String,
    pub employee_id: String,
    pub home_airport: String,
    #[serde(default)]
    pub travel_class: TravelClass,
    #[serde(default)]
    pub preferred_airlines: Vec<String>,
    #[serde(default)]
    pub preferred_airports: Vec<String>,
    #[serde(default)]
    pub time_constraints: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl Attendee {
    pub fn new(id: &str, employee_id: &str, home_airport: &str) -> Self {
        Self {
            id: id.to_string(),
            employee_id: employee_id.to_string(),
            home_airport: home_airport.to_uppercase(),
            travel_class: TravelClass::Economy,
            preferred_airlines: Vec::new(),
            preferred_airports: Vec::new(),
            time_constraints: BTreeMap::new(),
            timezone: None,
        }
    }

    pub fn with_travel_class(mut self, travel_class: TravelClass) -> Self {
        self.travel_class = travel_class;
        self
    }

    pub fn constraints(&self) -> TravelConstraints {
        TravelConstraints {
            travel_class: self.travel_class,
            preferred_airlines: self.preferred_airlines.clone(),
            time_constraints: self.time_constraints.clone(),
        }
        .canonical()
    }
}

// Constraint bundle handed to the pricing port for one attendee
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TravelConstraints {
    pub travel_class: TravelClass,
    pub preferred_airlines: Vec<String>,
    pub time_constraints: BTreeMap<String, serde_json::Value>,
}

impl TravelConstraints {
    /// Sorted, de-duplicated, upper-cased airline list. Two bundles that
    /// differ only in airline order canonicalise to the same value.
    pub fn canonical(mut self) -> Self {
        for airline in self.preferred_airlines.iter_mut() {
            *airline = airline.trim().to_uppercase();
        }
        self.preferred_airlines.retain(|a| !a.is_empty());
        self.preferred_airlines.sort();
        self.preferred_airlines.dedup();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, InputError> {
        if end < start {
            return Err(InputError::InvertedWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, InputError> {
        let parse = |value: &str| {
            NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
                .map_err(|_| InputError::InvalidDate(value.to_string()))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    // None when either bound would leave the calendar range
    pub fn shifted(&self, days: i64) -> Option<Self> {
        let offset = Duration::try_days(days)?;
        Some(Self {
            start: self.start.checked_add_signed(offset)?,
            end: self.end.checked_add_signed(offset)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightSegment {
    pub from: String,
    pub to: String,
    pub carrier: String,
    pub depart: NaiveDateTime,
    pub arrive: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSource {
    Live,
    Mock,
    // Mock quote substituted after the configured provider failed
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    pub origin: String,
    pub destination: String,
    pub depart_date: NaiveDate,
    pub return_date: NaiveDate,
    pub airline: String,
    pub travel_class: TravelClass,
    pub stops: u32,
    pub depart_time: NaiveTime,
    // Outbound arrival: departure plus travel time, on the origin's clock.
    // No timezone conversion is applied, so late-arrival buckets use this value.
    pub arrival: NaiveDateTime,
    pub return_depart_time: NaiveTime,
    pub travel_minutes: u32,
    pub price: f64,
    pub segments: Vec<FlightSegment>,
    pub booking_link: Option<String>,
    pub source: QuoteSource,
}

impl Itinerary {
    // When the attendee leaves the destination on the return leg
    pub fn departure_from_destination(&self) -> NaiveDateTime {
        self.return_date.and_time(self.return_depart_time)
    }

    pub fn has_connection(&self) -> bool {
        self.stops > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendeeItinerary {
    pub attendee_id: String,
    pub employee_id: String,
    pub itinerary: Itinerary,
}

// Everything the organiser supplies for one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPlan {
    pub name: String,
    pub candidate_destinations: Vec<String>,
    pub date_windows: Vec<DateWindow>,
    pub duration_days: u32,
    pub attendees: Vec<Attendee>,
}

impl EventPlan {
    // Destination x window pairs in evaluation order
    pub fn combinations(&self) -> Vec<(String, DateWindow)> {
        self.candidate_destinations
            .iter()
            .flat_map(|destination| {
                self.date_windows
                    .iter()
                    .map(move |window| (destination.clone(), *window))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotel {
    pub id: String,
    pub name: String,
    pub airport_code: String,
    pub approved: bool,
    pub nightly_rate: Option<f64>,
    pub distance_to_venue_km: Option<f64>,
    pub capacity: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    Van,
    Shuttle,
    Rideshare,
    Taxi,
}

impl TransferMode {
    pub fn is_group(self) -> bool {
        matches!(self, TransferMode::Van | TransferMode::Shuttle)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOption {
    pub id: String,
    pub airport_code: String,
    // None applies to every hotel served from the airport
    pub hotel_id: Option<String>,
    pub mode: TransferMode,
    pub capacity: u32,
    pub cost_per_trip: f64,
    pub duration_minutes: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_window_parse_and_shift() {
        let window = DateWindow::parse("2025-06-01", "2025-06-08").unwrap();
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());

        let shifted = window.shifted(-1).unwrap();
        assert_eq!(shifted.start, NaiveDate::from_ymd_opt(2025, 5, 31).unwrap());
        assert_eq!(shifted.end, NaiveDate::from_ymd_opt(2025, 6, 7).unwrap());

        let last = DateWindow::new(NaiveDate::MAX, NaiveDate::MAX).unwrap();
        assert_eq!(last.shifted(1), None);
        assert_eq!(window.shifted(i64::MAX), None);
    }

    #[test]
    fn test_date_window_rejects_bad_input() {
        assert_eq!(
            DateWindow::parse("2025-13-01", "2025-06-08"),
            Err(InputError::InvalidDate("2025-13-01".to_string()))
        );
        assert!(matches!(
            DateWindow::parse("2025-06-08", "2025-06-01"),
            Err(InputError::InvertedWindow { .. })
        ));
    }

    #[test]
    fn test_constraints_are_canonical() {
        let mut attendee = Attendee::new("a1", "E1", "lhr");
        attendee.preferred_airlines = vec!["lh".into(), "BA".into(), "LH".into()];
        let constraints = attendee.constraints();

        assert_eq!(attendee.home_airport, "LHR");
        assert_eq!(constraints.preferred_airlines, vec!["BA", "LH"]);
    }

    #[test]
    fn test_attendee_from_json_defaults_optional_fields() {
        let attendee: Attendee = serde_json::from_str(
            r#"{"id": "a1", "employee_id": "E1", "home_airport": "LIS",
                "travel_class": "business", "timezone": "Europe/Lisbon"}"#,
        )
        .unwrap();
        assert_eq!(attendee.timezone.as_deref(), Some("Europe/Lisbon"));
        assert_eq!(
            attendee,
            Attendee {
                timezone: Some("Europe/Lisbon".to_string()),
                ..Attendee::new("a1", "E1", "LIS").with_travel_class(TravelClass::Business)
            }
        );
        assert_eq!(attendee.constraints().travel_class, TravelClass::Business);
    }

    #[test]
    fn test_combinations_follow_destination_then_window_order() {
        let w1 = DateWindow::parse("2025-06-01", "2025-06-05").unwrap();
        let w2 = DateWindow::parse("2025-07-01", "2025-07-05").unwrap();
        let plan = EventPlan {
            name: "offsite".into(),
            candidate_destinations: vec!["LIS".into(), "MUC".into()],
            date_windows: vec![w1, w2],
            duration_days: 3,
            attendees: vec![],
        };

        let combos = plan.combinations();
        assert_eq!(
            combos,
            vec![
                ("LIS".to_string(), w1),
                ("LIS".to_string(), w2),
                ("MUC".to_string(), w1),
                ("MUC".to_string(), w2),
            ]
        );
    }
}
