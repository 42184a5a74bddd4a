// Group travel option optimiser: prices, scores and ranks candidate
// (destination, date window) options for a fixed attendee group

pub mod cache;
pub mod catalog;
pub mod config;
pub mod hotel;
pub mod live_pricing;
pub mod models;
pub mod preference;
pub mod pricing;
pub mod scoring;
pub mod simulator;
pub mod telemetry;
pub mod transfer;
pub mod whatif;

#[cfg(test)]
mod test_support;

// Re-export key types for convenience
pub use cache::{CacheConfig, CacheKey, CacheStatsReport, ItineraryCache, JsonFileStore};
pub use catalog::{CatalogError, HotelCatalog, InMemoryCatalog, TransferCatalog};
pub use config::{ConfigError, OptimiserConfig};
pub use hotel::{HotelAllocator, HotelAssignment, RoomNightAnalysis};
pub use models::{
    Attendee, AttendeeItinerary, DateWindow, EventPlan, Hotel, Itinerary, TransferMode,
    TransferOption, TravelClass, TravelConstraints,
};
pub use preference::{rank_by_preference, PreferenceProfile};
pub use pricing::{build_pricing, MockPricingProvider, PricingConfig, PricingError, PricingPort};
pub use scoring::{ScoringConfig, ScoringEngine, ScoringError};
pub use simulator::{
    rank_options, AllocationUnavailable, OptionResult, SimulationError, SimulationResult,
    Simulator, SimulatorConfig,
};
pub use transfer::{TransferBatcher, TransferPlan, TransferWave};
pub use whatif::{WhatIfError, WhatIfExplorer, WhatIfProposal, WhatIfResult, WhatIfVariation};
