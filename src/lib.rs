//! # CityJet Flights Library
//!
//! Fetches flight availability and fares from the CityJet booking site by
//! replaying its booking form flow and decoding the JSON payload embedded in
//! the resulting availability page.
//!
//! The pipeline is: airport catalog → form options → landing page → first
//! form → second form → embedded payload → [`FlightTicket`] records.

pub mod catalog;
pub mod client;
pub mod config;
pub mod extract;
pub mod form;
pub mod options;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// Re-export main types for convenience
pub use catalog::{parse_catalog, unwrap_jsonp, Airport, AirportIndex, Catalog, Route, RouteCheck};
pub use client::{FlightClient, Page};
pub use config::ScraperConfig;
pub use extract::{extract_embedded_payload, extract_tickets, Tickets};
pub use form::{FormReader, HtmlForm};
pub use options::{build_options, parse_date, FormOptions};

/// Error types for the flights library
#[derive(Error, Debug)]
pub enum FlightError {
    #[error("Airport catalog unavailable or malformed: {0}")]
    CatalogFormat(String),

    #[error("Unknown city: {0}")]
    UnknownCity(String),

    #[error("{step} step: no form with action {action}")]
    FormNotFound { step: FlowStep, action: String },

    #[error("{0}")]
    Extraction(String),

    #[error("Inconsistent flight data: {0}")]
    InconsistentData(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HTTP {status} during {step} step")]
    HttpStatus { step: FlowStep, status: u16 },

    #[error("Invalid date format: {0}")]
    DateParseError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTML parsing error: {0}")]
    ParseError(String),
}

/// The three requests of the booking flow, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    Landing,
    FirstSubmit,
    SecondSubmit,
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowStep::Landing => "landing",
            FlowStep::FirstSubmit => "first submit",
            FlowStep::SecondSubmit => "second submit",
        };
        f.write_str(name)
    }
}

/// A fare amount exactly as the booking site reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Number(n) => write!(f, "{}", n),
            Amount::Text(s) => f.write_str(s),
        }
    }
}

/// One bookable (flight, fare) combination.
///
/// Dates are local times in `YYYYMMDDHHMM` form, copied verbatim from the
/// booking site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightTicket {
    pub flight_number: String,
    pub ticket_class: String,
    pub depart_date: String,
    pub arrival_date: String,
    pub origin: String,
    pub destination: String,
    pub pricing: Amount,
    pub currency: String,
}

impl FlightTicket {
    /// Serialize as a single JSON line
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A one-way or return search between two cities.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub from_city: String,
    pub to_city: String,
    pub depart_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
}

impl SearchRequest {
    pub fn one_way(from_city: &str, to_city: &str, depart_date: NaiveDate) -> Self {
        Self {
            from_city: from_city.to_string(),
            to_city: to_city.to_string(),
            depart_date,
            return_date: None,
        }
    }
}

/// Run a full search against the production site
pub async fn search(request: &SearchRequest) -> Result<Vec<FlightTicket>, FlightError> {
    let client = FlightClient::new(ScraperConfig::default())?;
    client.search(request).await
}

/// Simple one-way search between two cities, date given as `YYYYMMDD`.
///
/// # Example
/// ```no_run
/// use cityjet_flights::search_flights_between_cities;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tickets = search_flights_between_cities("London", "Amsterdam", "20250815").await?;
/// println!("Found {} tickets", tickets.len());
/// # Ok(())
/// # }
/// ```
pub async fn search_flights_between_cities(
    from_city: &str,
    to_city: &str,
    date: &str,
) -> Result<Vec<FlightTicket>, FlightError> {
    let depart_date = parse_date(date)?;
    search(&SearchRequest::one_way(from_city, to_city, depart_date)).await
}
