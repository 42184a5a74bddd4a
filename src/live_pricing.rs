// Live pricing adapter over a JSON quote endpoint

use crate::models::{FlightSegment, Itinerary, QuoteSource, TravelClass, TravelConstraints};
use crate::pricing::{validate_request, PricingError, PricingPort};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpPricingConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct QuoteRequest<'a> {
    pub origin: &'a str,
    pub destination: &'a str,
    pub depart_date: NaiveDate,
    pub return_date: NaiveDate,
    pub travel_class: TravelClass,
    pub preferred_airlines: &'a [String],
    pub time_constraints: &'a BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteResponse {
    pub offers: Vec<QuoteOffer>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteOffer {
    pub airline: String,
    pub price: f64,
    pub stops: u32,
    pub depart_time: NaiveTime,
    pub arrival: NaiveDateTime,
    pub return_depart_time: NaiveTime,
    pub travel_minutes: u32,
    #[serde(default)]
    pub segments: Vec<FlightSegment>,
    #[serde(default)]
    pub booking_link: Option<String>,
}

pub struct HttpPricingProvider {
    client: reqwest::Client,
    config: HttpPricingConfig,
}

impl HttpPricingProvider {
    pub fn new(config: HttpPricingConfig) -> Result<Self, PricingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PricingError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn map_transport_error(&self, error: reqwest::Error) -> PricingError {
        if error.is_timeout() {
            PricingError::Timeout(self.config.timeout_ms)
        } else if error.is_decode() {
            PricingError::InvalidResponse(error.to_string())
        } else {
            PricingError::Network(error.to_string())
        }
    }
}

/// Pick the cheapest usable offer and turn it into an itinerary.
/// Non-finite or negative prices are treated as malformed and skipped.
pub fn best_offer(
    origin: &str,
    destination: &str,
    depart_date: NaiveDate,
    return_date: NaiveDate,
    travel_class: TravelClass,
    response: QuoteResponse,
) -> Result<Itinerary, PricingError> {
    let offer = response
        .offers
        .into_iter()
        .filter(|o| o.price.is_finite() && o.price >= 0.0)
        .fold(None::<QuoteOffer>, |best, offer| match best {
            Some(b) if b.price <= offer.price => Some(b),
            _ => Some(offer),
        })
        .ok_or_else(|| {
            PricingError::Unavailable(format!("no offers for {}-{}", origin, destination))
        })?;

    Ok(Itinerary {
        origin: origin.to_uppercase(),
        destination: destination.to_uppercase(),
        depart_date,
        return_date,
        airline: offer.airline,
        travel_class,
        stops: offer.stops,
        depart_time: offer.depart_time,
        arrival: offer.arrival,
        return_depart_time: offer.return_depart_time,
        travel_minutes: offer.travel_minutes,
        price: offer.price,
        segments: offer.segments,
        booking_link: offer.booking_link,
        source: QuoteSource::Live,
    })
}

#[async_trait]
impl PricingPort for HttpPricingProvider {
    async fn get_best_itinerary(
        &self,
        origin: &str,
        destination: &str,
        depart_date: NaiveDate,
        return_date: NaiveDate,
        constraints: &TravelConstraints,
    ) -> Result<Itinerary, PricingError> {
        validate_request(origin, destination, depart_date, return_date)?;
        let body = QuoteRequest {
            origin,
            destination,
            depart_date,
            return_date,
            travel_class: constraints.travel_class,
            preferred_airlines: &constraints.preferred_airlines,
            time_constraints: &constraints.time_constraints,
        };

        let url = format!("{}/quotes", self.config.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        debug!(origin, destination, %depart_date, "requesting live quote");
        let response = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(PricingError::Unavailable(format!("provider returned {}", status)));
        }
        if !status.is_success() {
            return Err(PricingError::InvalidResponse(format!(
                "provider returned {}",
                status
            )));
        }

        let parsed: QuoteResponse = response
            .json()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        best_offer(
            origin,
            destination,
            depart_date,
            return_date,
            constraints.travel_class,
            parsed,
        )
    }
}
