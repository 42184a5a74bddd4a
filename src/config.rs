// Top-level configuration for composing the optimiser

use crate::cache::{CacheConfig, ItineraryCache};
use crate::hotel::{HotelAllocator, HotelConfig};
use crate::pricing::{build_pricing, PricingConfig};
use crate::scoring::{ScoringConfig, ScoringEngine};
use crate::simulator::{Simulator, SimulatorConfig};
use crate::transfer::{TransferBatcher, TransferConfig};
use crate::whatif::WhatIfConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Every tunable of the engine in one document. Missing sections and
/// fields take their defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimiserConfig {
    pub scoring: ScoringConfig,
    pub hotel: HotelConfig,
    pub transfer: TransferConfig,
    pub simulator: SimulatorConfig,
    pub cache: CacheConfig,
    pub pricing: PricingConfig,
    pub whatif: WhatIfConfig,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be finite and non-negative, got {}", value)))
    }
}

impl OptimiserConfig {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json).context("parsing optimiser config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("loading config from {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scoring
            .validate()
            .map_err(|e| invalid("scoring", e.to_string()))?;

        non_negative("hotel.fallback_nightly_rate", self.hotel.fallback_nightly_rate)?;
        non_negative("hotel.missing_rate_penalty", self.hotel.missing_rate_penalty)?;
        non_negative("hotel.rate_weight", self.hotel.rate_weight)?;
        non_negative("hotel.distance_weight", self.hotel.distance_weight)?;
        non_negative("hotel.capacity_weight", self.hotel.capacity_weight)?;

        if self.transfer.wave_window_minutes == 0 {
            return Err(invalid("transfer.wave_window_minutes", "must be positive"));
        }
        if self.transfer.van_threshold == 0 {
            return Err(invalid("transfer.van_threshold", "must be positive"));
        }
        non_negative("transfer.vehicle_weight", self.transfer.vehicle_weight)?;
        non_negative("transfer.wave_weight", self.transfer.wave_weight)?;
        non_negative("transfer.mode_weight", self.transfer.mode_weight)?;
        non_negative("transfer.utilisation_weight", self.transfer.utilisation_weight)?;

        if self.simulator.max_concurrent_quotes == 0 || self.simulator.max_concurrent_options == 0 {
            return Err(invalid("simulator", "concurrency bounds must be positive"));
        }
        if self.simulator.late_arrival_hour > 23 {
            return Err(invalid("simulator.late_arrival_hour", "must be within 0..=23"));
        }
        non_negative("simulator.co2_kg_per_flight_hour", self.simulator.co2_kg_per_flight_hour)?;

        if self.cache.capacity == 0 {
            return Err(invalid("cache.capacity", "must be positive"));
        }
        if self.pricing.timeout_ms == 0 {
            return Err(invalid("pricing.timeout_ms", "must be positive"));
        }
        Ok(())
    }

    /// Wire a simulator from this configuration: cached pricing stack,
    /// scoring weights, hotel and transfer settings. Catalogs are attached
    /// by the caller.
    pub fn build_simulator(&self) -> anyhow::Result<Simulator> {
        self.validate()?;
        let cache = ItineraryCache::from_config(&self.cache).context("opening itinerary cache")?;
        let pricing = build_pricing(&self.pricing, Some(Arc::new(cache)))
            .context("building pricing provider")?;
        let engine = ScoringEngine::new(self.scoring)?;

        Ok(Simulator::new(pricing)
            .with_engine(engine)
            .with_allocator(HotelAllocator::new(self.hotel.clone()))
            .with_batcher(TransferBatcher::new(self.transfer.clone()))
            .with_config(self.simulator.clone()))
    }
}
