// Pricing port: the single I/O boundary of an option evaluation
// Providers are chosen once at composition time (`build_pricing`) and injected
// into the simulator as `Arc<dyn PricingPort>`.

use crate::cache::{CacheKey, ItineraryCache};
use crate::live_pricing::{HttpPricingConfig, HttpPricingProvider};
use crate::models::{FlightSegment, Itinerary, QuoteSource, TravelConstraints};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    #[error("Pricing unavailable: {0}")]
    Unavailable(String),

    #[error("Pricing request timed out after {0}ms")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Invalid pricing request: {0}")]
    InvalidRequest(String),
}

// Anything that can quote one round trip for one attendee
#[async_trait]
pub trait PricingPort: Send + Sync + 'static {
    async fn get_best_itinerary(
        &self,
        origin: &str,
        destination: &str,
        depart_date: NaiveDate,
        return_date: NaiveDate,
        constraints: &TravelConstraints,
    ) -> Result<Itinerary, PricingError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Mock,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub provider: ProviderKind,
    pub volatile: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    // Substitute (logged) mock quotes when the live provider fails
    pub fallback_to_mock: bool,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Mock,
            volatile: false,
            base_url: "http://localhost:8080".to_string(),
            api_key: None,
            timeout_ms: 10_000,
            fallback_to_mock: false,
        }
    }
}

pub(crate) fn validate_request(
    origin: &str,
    destination: &str,
    depart_date: NaiveDate,
    return_date: NaiveDate,
) -> Result<(), PricingError> {
    for code in [origin, destination] {
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PricingError::InvalidRequest(format!(
                "'{}' is not a 3-letter airport code",
                code
            )));
        }
    }
    if return_date < depart_date {
        return Err(PricingError::InvalidRequest(format!(
            "return {} precedes departure {}",
            return_date, depart_date
        )));
    }
    Ok(())
}

const AIRLINES: [&str; 12] = [
    "AA", "UA", "DL", "BA", "LH", "AF", "KL", "LX", "VS", "EK", "QF", "SQ",
];
const CONNECTION_HUBS: [&str; 6] = ["FRA", "LHR", "CDG", "AMS", "DXB", "IST"];
const QUARTER_HOURS: [u32; 4] = [0, 15, 30, 45];

/// Deterministic fake provider.
///
/// The random stream is seeded from the route, the dates and every
/// constraint except cabin class. Class is applied afterwards as a fare
/// multiplier, so the same trip in business always costs more than in
/// economy and repeated calls return identical itineraries.
#[derive(Debug, Clone, Default)]
pub struct MockPricingProvider {
    volatile: bool,
}

impl MockPricingProvider {
    pub fn new(volatile: bool) -> Self {
        Self { volatile }
    }

    fn route_seed(
        origin: &str,
        destination: &str,
        depart_date: NaiveDate,
        return_date: NaiveDate,
        constraints: &TravelConstraints,
    ) -> u64 {
        let time_constraints = serde_json::to_string(&constraints.time_constraints).unwrap_or_default();
        let material = format!(
            "{}|{}|{}|{}|{}|{}",
            origin,
            destination,
            depart_date,
            return_date,
            constraints.preferred_airlines.join(","),
            time_constraints
        );
        let digest = Sha256::digest(material.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes)
    }

    pub fn quote(
        &self,
        origin: &str,
        destination: &str,
        depart_date: NaiveDate,
        return_date: NaiveDate,
        constraints: &TravelConstraints,
    ) -> Result<Itinerary, PricingError> {
        validate_request(origin, destination, depart_date, return_date)?;
        let origin = origin.to_uppercase();
        let destination = destination.to_uppercase();
        let constraints = constraints.clone().canonical();

        let seed = Self::route_seed(&origin, &destination, depart_date, return_date, &constraints);
        let mut rng = StdRng::seed_from_u64(seed);

        let base_fare = 200.0 + rng.gen::<f64>() * 1800.0;
        // Drawn unconditionally so toggling volatility never shifts the stream
        let volatility = 0.95 + rng.gen::<f64>() * 0.1;
        let stops: u32 = rng.gen_range(0..=2);
        let travel_minutes: u32 = 200 + rng.gen_range(0..=1000);
        let depart_hour: u32 = rng.gen_range(6..=22);
        let depart_minute = *QUARTER_HOURS.choose(&mut rng).unwrap_or(&0);
        let return_hour: u32 = rng.gen_range(8..=20);
        let return_minute = *QUARTER_HOURS.choose(&mut rng).unwrap_or(&0);
        let airline = if constraints.preferred_airlines.is_empty() {
            AIRLINES.choose(&mut rng).copied().unwrap_or("AA").to_string()
        } else {
            constraints
                .preferred_airlines
                .choose(&mut rng)
                .cloned()
                .unwrap_or_else(|| "AA".to_string())
        };
        let hub_offset = rng.gen_range(0..CONNECTION_HUBS.len());

        let mut price = base_fare * constraints.travel_class.price_multiplier();
        if self.volatile {
            price *= volatility;
        }
        let price = (price * 100.0).round() / 100.0;

        let depart_time = NaiveTime::from_hms_opt(depart_hour, depart_minute, 0)
            .ok_or_else(|| PricingError::Unavailable("invalid departure slot".to_string()))?;
        let return_depart_time = NaiveTime::from_hms_opt(return_hour, return_minute, 0)
            .ok_or_else(|| PricingError::Unavailable("invalid return slot".to_string()))?;
        let departure = depart_date.and_time(depart_time);
        let arrival = departure + Duration::minutes(travel_minutes as i64);

        let hubs: Vec<&str> = CONNECTION_HUBS
            .iter()
            .cycle()
            .skip(hub_offset)
            .take(CONNECTION_HUBS.len())
            .filter(|hub| **hub != origin && **hub != destination)
            .take(stops as usize)
            .copied()
            .collect();
        let segments = build_segments(&origin, &destination, &hubs, &airline, departure, travel_minutes);

        Ok(Itinerary {
            booking_link: Some(format!(
                "https://booking.example.com/flights?origin={}&dest={}&date={}",
                origin, destination, depart_date
            )),
            origin,
            destination,
            depart_date,
            return_date,
            airline,
            travel_class: constraints.travel_class,
            stops: hubs.len() as u32,
            depart_time,
            arrival,
            return_depart_time,
            travel_minutes,
            price,
            segments,
            source: QuoteSource::Mock,
        })
    }
}

// Splits the outbound journey evenly across legs; the last leg absorbs the remainder
fn build_segments(
    origin: &str,
    destination: &str,
    hubs: &[&str],
    carrier: &str,
    departure: chrono::NaiveDateTime,
    travel_minutes: u32,
) -> Vec<FlightSegment> {
    let mut stops: Vec<&str> = Vec::with_capacity(hubs.len() + 2);
    stops.push(origin);
    stops.extend_from_slice(hubs);
    stops.push(destination);

    let legs = (stops.len() - 1) as u32;
    let per_leg = travel_minutes / legs;
    let mut clock = departure;
    stops
        .windows(2)
        .enumerate()
        .map(|(i, pair)| {
            let minutes = if i as u32 == legs - 1 {
                travel_minutes - per_leg * (legs - 1)
            } else {
                per_leg
            };
            let depart = clock;
            clock = clock + Duration::minutes(minutes as i64);
            FlightSegment {
                from: pair[0].to_string(),
                to: pair[1].to_string(),
                carrier: carrier.to_string(),
                depart,
                arrive: clock,
            }
        })
        .collect()
}

#[async_trait]
impl PricingPort for MockPricingProvider {
    async fn get_best_itinerary(
        &self,
        origin: &str,
        destination: &str,
        depart_date: NaiveDate,
        return_date: NaiveDate,
        constraints: &TravelConstraints,
    ) -> Result<Itinerary, PricingError> {
        self.quote(origin, destination, depart_date, return_date, constraints)
    }
}

// Wraps a primary provider and substitutes a mock quote when it fails
pub struct FallbackPricing {
    primary: Arc<dyn PricingPort>,
    fallback: MockPricingProvider,
}

impl FallbackPricing {
    pub fn new(primary: Arc<dyn PricingPort>, fallback: MockPricingProvider) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl PricingPort for FallbackPricing {
    async fn get_best_itinerary(
        &self,
        origin: &str,
        destination: &str,
        depart_date: NaiveDate,
        return_date: NaiveDate,
        constraints: &TravelConstraints,
    ) -> Result<Itinerary, PricingError> {
        match self
            .primary
            .get_best_itinerary(origin, destination, depart_date, return_date, constraints)
            .await
        {
            Ok(itinerary) => Ok(itinerary),
            Err(PricingError::InvalidRequest(reason)) => Err(PricingError::InvalidRequest(reason)),
            Err(error) => {
                warn!(
                    origin,
                    destination,
                    %depart_date,
                    %error,
                    "pricing provider failed, substituting deterministic mock quote"
                );
                let mut itinerary =
                    self.fallback
                        .quote(origin, destination, depart_date, return_date, constraints)?;
                itinerary.source = QuoteSource::Fallback;
                Ok(itinerary)
            }
        }
    }
}

// Read-through cache in front of any provider
pub struct CachedPricing {
    inner: Arc<dyn PricingPort>,
    cache: Arc<ItineraryCache>,
}

impl CachedPricing {
    pub fn new(inner: Arc<dyn PricingPort>, cache: Arc<ItineraryCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<ItineraryCache> {
        &self.cache
    }

    // Store-backed lookups read files, so they leave the async worker
    async fn lookup(&self, key: &CacheKey) -> Option<Itinerary> {
        if !self.cache.has_store() {
            return self.cache.get(key);
        }
        let cache = Arc::clone(&self.cache);
        let key = key.clone();
        match tokio::task::spawn_blocking(move || cache.get(&key)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "cache lookup task failed");
                None
            }
        }
    }

    async fn remember(&self, key: CacheKey, itinerary: Itinerary) {
        if !self.cache.has_store() {
            self.cache.insert(key, itinerary);
            return;
        }
        let cache = Arc::clone(&self.cache);
        if let Err(e) = tokio::task::spawn_blocking(move || cache.insert(key, itinerary)).await {
            warn!(error = %e, "cache insert task failed");
        }
    }
}

#[async_trait]
impl PricingPort for CachedPricing {
    async fn get_best_itinerary(
        &self,
        origin: &str,
        destination: &str,
        depart_date: NaiveDate,
        return_date: NaiveDate,
        constraints: &TravelConstraints,
    ) -> Result<Itinerary, PricingError> {
        let key = CacheKey::for_request(origin, destination, depart_date, return_date, constraints);
        if let Some(itinerary) = self.lookup(&key).await {
            debug!(origin, destination, key = %key, "quote served from cache");
            return Ok(itinerary);
        }

        let itinerary = self
            .inner
            .get_best_itinerary(origin, destination, depart_date, return_date, constraints)
            .await?;
        // Fallback quotes are not cached so the live provider is retried next time
        if itinerary.source != QuoteSource::Fallback {
            self.remember(key, itinerary.clone()).await;
        }
        Ok(itinerary)
    }
}

/// Compose the pricing stack described by `config`.
///
/// Order from the outside in: cache, fallback (http only), provider.
pub fn build_pricing(
    config: &PricingConfig,
    cache: Option<Arc<ItineraryCache>>,
) -> Result<Arc<dyn PricingPort>, PricingError> {
    let mut port: Arc<dyn PricingPort> = match config.provider {
        ProviderKind::Mock => Arc::new(MockPricingProvider::new(config.volatile)),
        ProviderKind::Http => {
            let live = HttpPricingProvider::new(HttpPricingConfig {
                base_url: config.base_url.clone(),
                api_key: config.api_key.clone(),
                timeout_ms: config.timeout_ms,
            })?;
            if config.fallback_to_mock {
                Arc::new(FallbackPricing::new(
                    Arc::new(live),
                    MockPricingProvider::new(config.volatile),
                ))
            } else {
                Arc::new(live)
            }
        }
    };

    if let Some(cache) = cache {
        port = Arc::new(CachedPricing::new(port, cache));
    }

    info!(
        provider = ?config.provider,
        fallback = config.fallback_to_mock,
        "pricing provider selected"
    );
    Ok(port)
}
