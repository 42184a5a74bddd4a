// Read-only hotel and transfer lookups consumed by the simulator

use crate::models::{Hotel, TransferOption};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid catalog data: {0}")]
    InvalidData(String),
}

#[async_trait]
pub trait HotelCatalog: Send + Sync + 'static {
    async fn hotels_for_airport(
        &self,
        airport_code: &str,
        approved_only: bool,
    ) -> Result<Vec<Hotel>, CatalogError>;
}

#[async_trait]
pub trait TransferCatalog: Send + Sync + 'static {
    /// Options serving `hotel_id` from `airport_code`. Options without a
    /// hotel apply to every hotel at that airport.
    async fn transfer_options(
        &self,
        airport_code: &str,
        hotel_id: &str,
    ) -> Result<Vec<TransferOption>, CatalogError>;
}

// Seed document accepted by `InMemoryCatalog::from_json`
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub hotels: Vec<Hotel>,
    #[serde(default)]
    pub transfer_options: Vec<TransferOption>,
}

/// Catalog held in memory, keyed by upper-cased airport code.
///
/// Insertion order is kept per airport so lookups are deterministic.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    hotels: DashMap<String, Vec<Hotel>>,
    transfers: DashMap<String, Vec<TransferOption>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: CatalogSeed) -> Self {
        let catalog = Self::new();
        for hotel in seed.hotels {
            catalog.add_hotel(hotel);
        }
        for option in seed.transfer_options {
            catalog.add_transfer_option(option);
        }
        catalog
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let seed: CatalogSeed =
            serde_json::from_str(json).map_err(|e| CatalogError::InvalidData(e.to_string()))?;
        Ok(Self::from_seed(seed))
    }

    pub fn add_hotel(&self, hotel: Hotel) {
        self.hotels
            .entry(hotel.airport_code.to_uppercase())
            .or_default()
            .push(hotel);
    }

    pub fn add_transfer_option(&self, option: TransferOption) {
        self.transfers
            .entry(option.airport_code.to_uppercase())
            .or_default()
            .push(option);
    }

    pub fn hotel_count(&self) -> usize {
        self.hotels.iter().map(|entry| entry.value().len()).sum()
    }
}

#[async_trait]
impl HotelCatalog for InMemoryCatalog {
    async fn hotels_for_airport(
        &self,
        airport_code: &str,
        approved_only: bool,
    ) -> Result<Vec<Hotel>, CatalogError> {
        let Some(hotels) = self.hotels.get(&airport_code.to_uppercase()) else {
            return Ok(Vec::new());
        };
        Ok(hotels
            .iter()
            .filter(|h| !approved_only || h.approved)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TransferCatalog for InMemoryCatalog {
    async fn transfer_options(
        &self,
        airport_code: &str,
        hotel_id: &str,
    ) -> Result<Vec<TransferOption>, CatalogError> {
        let Some(options) = self.transfers.get(&airport_code.to_uppercase()) else {
            return Ok(Vec::new());
        };
        Ok(options
            .iter()
            .filter(|o| o.hotel_id.as_deref().map_or(true, |id| id == hotel_id))
            .cloned()
            .collect())
    }
}
