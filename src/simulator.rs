// Option evaluation: price every attendee for one (destination, window),
// aggregate, optionally allocate hotel and transfers, then score.

use crate::catalog::{CatalogError, HotelCatalog, TransferCatalog};
use crate::hotel::{AllocationError, HotelAllocator, HotelAssignment};
use crate::models::{Attendee, AttendeeItinerary, DateWindow, EventPlan};
use crate::pricing::{PricingError, PricingPort};
use crate::scoring::{self, ExtendedInputs, FlightMetrics, ScoringEngine, ScoringError};
use crate::transfer::{TransferBatcher, TransferError, TransferPlan};
use chrono::Days;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Pricing failed for attendee {attendee_id}: {source}")]
    Pricing {
        attendee_id: String,
        #[source]
        source: PricingError,
    },

    #[error("Invalid option input: {0}")]
    InvalidInput(String),

    #[error("Catalog lookup failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Scoring failed: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Hotel allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    #[error("Transfer planning failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("All {attempted} options failed, first cause: {first}")]
    AllOptionsFailed {
        attempted: usize,
        first: Box<SimulationError>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    // In-flight pricing calls per option
    pub max_concurrent_quotes: usize,
    // Options evaluated at once by `simulate_event`
    pub max_concurrent_options: usize,
    pub late_arrival_hour: u32,
    pub co2_kg_per_flight_hour: f64,
    pub extended_metrics: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_quotes: 8,
            max_concurrent_options: 4,
            late_arrival_hour: 18,
            co2_kg_per_flight_hour: 90.0,
            extended_metrics: true,
        }
    }
}

// Why an option was scored on flight metrics only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationUnavailable {
    NoHotel,
    NoTransfer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedMetrics {
    pub hotel_cost: f64,
    pub transfer_cost: f64,
    pub operational_complexity_score: f64,
    pub co2_kg: f64,
    pub late_arrival_risk: f64,
    pub arrival_histogram: [u32; 24],
    pub hotel_assignment: HotelAssignment,
    pub transfer_plan: TransferPlan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionResult {
    pub destination: String,
    pub window: DateWindow,
    // Flight cost across all attendees
    pub total_cost: f64,
    pub avg_travel_time_minutes: f64,
    pub arrival_spread_minutes: f64,
    pub connections_rate: f64,
    pub score: f64,
    pub attendee_itineraries: Vec<AttendeeItinerary>,
    pub extended: Option<ExtendedMetrics>,
    pub downgrade: Option<AllocationUnavailable>,
}

impl OptionResult {
    // Flights plus hotel and transfers when they were allocated
    pub fn all_in_cost(&self) -> f64 {
        match &self.extended {
            Some(extended) => self.total_cost + extended.hotel_cost + extended.transfer_cost,
            None => self.total_cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionFailure {
    pub destination: String,
    pub window: DateWindow,
    pub error: SimulationError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub event_name: String,
    pub results: Vec<OptionResult>,
    // Indices into `results`, best first
    pub ranked_options: Vec<usize>,
    // Options that could not be evaluated; excluded from ranking
    pub failures: Vec<OptionFailure>,
}

impl SimulationResult {
    pub fn empty(event_name: &str) -> Self {
        Self {
            event_name: event_name.to_string(),
            results: Vec::new(),
            ranked_options: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn best(&self) -> Option<&OptionResult> {
        self.ranked_options.first().map(|&i| &self.results[i])
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Result indices ordered by ascending score. The sort is stable, so equal
/// scores keep combination order.
pub fn rank_options(results: &[OptionResult]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..results.len()).collect();
    order.sort_by(|&a, &b| results[a].score.total_cmp(&results[b].score));
    order
}

struct Catalogs {
    hotels: Arc<dyn HotelCatalog>,
    transfers: Arc<dyn TransferCatalog>,
}

/// Evaluates options against an injected pricing port.
///
/// Hotel and transfer allocation only run when catalogs are attached and
/// `extended_metrics` is on; otherwise every option is scored with the
/// baseline formula.
pub struct Simulator {
    pricing: Arc<dyn PricingPort>,
    engine: ScoringEngine,
    allocator: HotelAllocator,
    batcher: TransferBatcher,
    catalogs: Option<Catalogs>,
    config: SimulatorConfig,
}

impl Simulator {
    pub fn new(pricing: Arc<dyn PricingPort>) -> Self {
        Self {
            pricing,
            engine: ScoringEngine::default(),
            allocator: HotelAllocator::default(),
            batcher: TransferBatcher::default(),
            catalogs: None,
            config: SimulatorConfig::default(),
        }
    }

    pub fn with_engine(mut self, engine: ScoringEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_allocator(mut self, allocator: HotelAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn with_batcher(mut self, batcher: TransferBatcher) -> Self {
        self.batcher = batcher;
        self
    }

    pub fn with_catalogs(
        mut self,
        hotels: Arc<dyn HotelCatalog>,
        transfers: Arc<dyn TransferCatalog>,
    ) -> Self {
        self.catalogs = Some(Catalogs { hotels, transfers });
        self
    }

    pub fn with_config(mut self, config: SimulatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    /// Price and score one (destination, window) option.
    ///
    /// Quotes are requested concurrently but collected in attendee order.
    /// Any pricing failure fails the whole option.
    pub async fn evaluate(
        &self,
        destination: &str,
        window: &DateWindow,
        attendees: &[Attendee],
        duration_days: u32,
    ) -> Result<OptionResult, SimulationError> {
        let depart_date = window.start;
        let return_date = window
            .start
            .checked_add_days(Days::new(u64::from(duration_days)))
            .ok_or_else(|| {
                SimulationError::InvalidInput(format!(
                    "{} days after {} is out of the calendar range",
                    duration_days, window.start
                ))
            })?;
        let pricing = &self.pricing;

        let quotes: Vec<Result<AttendeeItinerary, SimulationError>> =
            stream::iter(attendees.iter().map(|attendee| async move {
                let constraints = attendee.constraints();
                pricing
                    .get_best_itinerary(
                        &attendee.home_airport,
                        destination,
                        depart_date,
                        return_date,
                        &constraints,
                    )
                    .await
                    .map(|itinerary| AttendeeItinerary {
                        attendee_id: attendee.id.clone(),
                        employee_id: attendee.employee_id.clone(),
                        itinerary,
                    })
                    .map_err(|source| SimulationError::Pricing {
                        attendee_id: attendee.id.clone(),
                        source,
                    })
            }))
            .buffered(self.config.max_concurrent_quotes.max(1))
            .collect()
            .await;
        let attendee_itineraries = quotes.into_iter().collect::<Result<Vec<_>, _>>()?;

        let itineraries: Vec<_> = attendee_itineraries.iter().map(|a| &a.itinerary).collect();
        let flight = scoring::aggregate(
            &itineraries,
            self.config.late_arrival_hour,
            self.config.co2_kg_per_flight_hour,
        );

        let (extended, downgrade) = match &self.catalogs {
            Some(catalogs) if self.config.extended_metrics && !attendee_itineraries.is_empty() => {
                match self
                    .allocate(catalogs, destination, &attendee_itineraries, duration_days, &flight)
                    .await?
                {
                    Ok(extended) => (Some(extended), None),
                    Err(reason) => {
                        debug!(destination, ?reason, "allocation unavailable, using baseline metrics");
                        (None, Some(reason))
                    }
                }
            }
            _ => (None, None),
        };

        let score = match &extended {
            Some(extended) => self.engine.score_extended(&ExtendedInputs {
                flight_cost: flight.total_cost,
                hotel_cost: extended.hotel_cost,
                transfer_cost: extended.transfer_cost,
                arrival_spread_minutes: flight.arrival_spread_minutes,
                avg_travel_time_minutes: flight.avg_travel_time_minutes,
                connections_rate: flight.connections_rate,
                late_arrival_risk: flight.late_arrival_risk,
                operational_complexity_score: extended.operational_complexity_score,
            })?,
            None => self.engine.score_baseline(&flight.baseline())?,
        };

        debug!(
            destination,
            start = %window.start,
            attendees = attendee_itineraries.len(),
            score,
            "option evaluated"
        );

        Ok(OptionResult {
            destination: destination.to_string(),
            window: *window,
            total_cost: flight.total_cost,
            avg_travel_time_minutes: flight.avg_travel_time_minutes,
            arrival_spread_minutes: flight.arrival_spread_minutes,
            connections_rate: flight.connections_rate,
            score,
            attendee_itineraries,
            extended,
            downgrade,
        })
    }

    // Hotel first: transfer legs run between the airport and the chosen hotel
    async fn allocate(
        &self,
        catalogs: &Catalogs,
        destination: &str,
        attendee_itineraries: &[AttendeeItinerary],
        duration_days: u32,
        flight: &FlightMetrics,
    ) -> Result<Result<ExtendedMetrics, AllocationUnavailable>, SimulationError> {
        let arrivals: Vec<_> = attendee_itineraries
            .iter()
            .map(|a| a.itinerary.arrival)
            .collect();
        let departures: Vec<_> = attendee_itineraries
            .iter()
            .map(|a| a.itinerary.departure_from_destination())
            .collect();
        let ids: Vec<String> = attendee_itineraries
            .iter()
            .map(|a| a.attendee_id.clone())
            .collect();

        let hotels = catalogs
            .hotels
            .hotels_for_airport(destination, self.allocator.config().approved_only)
            .await?;
        let analysis = self
            .allocator
            .compute_room_nights(&arrivals, &departures, duration_days)?;
        let Some(assignment) = self.allocator.select_hotel(destination, &analysis, &hotels) else {
            return Ok(Err(AllocationUnavailable::NoHotel));
        };

        let options = catalogs
            .transfers
            .transfer_options(destination, &assignment.hotel_id)
            .await?;
        let waves = self.batcher.compute_waves(
            &arrivals,
            &ids,
            self.batcher.config().wave_window_minutes,
        )?;
        let Some(plan) = self
            .batcher
            .plan(destination, &assignment.hotel_id, &waves, &options)
        else {
            return Ok(Err(AllocationUnavailable::NoTransfer));
        };

        Ok(Ok(ExtendedMetrics {
            hotel_cost: assignment.total_cost,
            transfer_cost: plan.total_cost,
            operational_complexity_score: plan.operational_complexity_score,
            co2_kg: flight.co2_kg,
            late_arrival_risk: flight.late_arrival_risk,
            arrival_histogram: flight.arrival_histogram,
            hotel_assignment: assignment,
            transfer_plan: plan,
        }))
    }

    /// Evaluate every destination x window combination of `event`.
    ///
    /// Failed options are collected in `failures` and left out of the
    /// ranking. Only when every option fails is an error returned.
    pub async fn simulate_event(&self, event: &EventPlan) -> Result<SimulationResult, SimulationError> {
        if event.attendees.is_empty() {
            debug!(event = %event.name, "no attendees, nothing to simulate");
            return Ok(SimulationResult::empty(&event.name));
        }
        let combinations = event.combinations();
        if combinations.is_empty() {
            debug!(event = %event.name, "no destination/window combinations");
            return Ok(SimulationResult::empty(&event.name));
        }
        let attempted = combinations.len();

        let outcomes: Vec<_> = stream::iter(combinations.into_iter().map(
            |(destination, window)| async move {
                let outcome = self
                    .evaluate(&destination, &window, &event.attendees, event.duration_days)
                    .await;
                (destination, window, outcome)
            },
        ))
        .buffered(self.config.max_concurrent_options.max(1))
        .collect()
        .await;

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for (destination, window, outcome) in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(error) => {
                    warn!(
                        event = %event.name,
                        destination = %destination,
                        start = %window.start,
                        %error,
                        "option could not be evaluated"
                    );
                    failures.push(OptionFailure {
                        destination,
                        window,
                        error,
                    });
                }
            }
        }

        if results.is_empty() {
            if let Some(first) = failures.first() {
                return Err(SimulationError::AllOptionsFailed {
                    attempted,
                    first: Box::new(first.error.clone()),
                });
            }
        }

        let ranked_options = rank_options(&results);
        Ok(SimulationResult {
            event_name: event.name.clone(),
            results,
            ranked_options,
            failures,
        })
    }

    /// Entry point for callers outside the engine. Deterministic for the
    /// same pricing and catalog state.
    pub async fn simulate(&self, event: &EventPlan) -> Result<SimulationResult, SimulationError> {
        let started = Instant::now();
        let result = self.simulate_event(event).await?;
        info!(
            event = %event.name,
            options = result.results.len(),
            failed = result.failures.len(),
            best = result.best().map(|b| b.destination.as_str()).unwrap_or("-"),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "simulation finished"
        );
        Ok(result)
    }
}
