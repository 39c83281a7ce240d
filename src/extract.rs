//! Flight availability extraction
//!
//! The availability page carries its whole result set as a JavaScript
//! string literal, roughly:
//!
//! ```text
//! <script>var generatedJSon = new String('{"list_tab": {...}}');</script>
//! ```
//!
//! [`extract_embedded_payload`] is the only code that knows about that
//! markup. Everything after it works on plain serde records: flights are
//! collected from the proposed bounds into an id lookup, and each
//! recommendation's bounds point back into that lookup by `flight_id`.

use crate::{Amount, FlightError, FlightTicket};
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Deserializer};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

const PAYLOAD_MARKER: &str = "generatedJSon";
const PAYLOAD_PATTERN: &str = r"generatedJSon.*String\('(.*)'\)";

/// Reported whenever the availability page has no usable payload. An empty
/// or broken payload nearly always means an earlier form step got an error
/// page back.
pub const MISSING_DATA_MESSAGE: &str =
    "Missing data after getting the list of flights. One of the upstream requests probably failed.";

#[derive(Debug, Clone, Deserialize)]
pub struct Payload {
    pub list_tab: ListTab,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListTab {
    #[serde(default)]
    pub list_proposed_bound: Vec<ProposedBound>,
    #[serde(default)]
    pub list_recommendation: Vec<Recommendation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposedBound {
    pub list_flight: Vec<Flight>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Flight {
    #[serde(deserialize_with = "string_or_number")]
    pub flight_id: String,
    pub list_segment: Vec<Segment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Segment {
    pub airline: Code,
    #[serde(deserialize_with = "string_or_number")]
    pub flight_number: String,
    pub b_location: Location,
    pub e_location: Location,
    pub b_date_date: String,
    pub b_date_time: String,
    pub e_date_date: String,
    pub e_date_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Code {
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub location_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Recommendation {
    pub fare_family: FareFamily,
    pub list_bound: Vec<Bound>,
    pub list_pnr: Vec<Pnr>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FareFamily {
    pub brand_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Bound {
    pub list_flight: Vec<FlightRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlightRef {
    #[serde(deserialize_with = "string_or_number")]
    pub flight_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pnr {
    pub list_pnr_price: Vec<PnrPrice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PnrPrice {
    pub total_amount: Amount,
    pub currency: Code,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

fn missing_data() -> FlightError {
    FlightError::Extraction(MISSING_DATA_MESSAGE.to_string())
}

/// Pull the `generatedJSon` document out of an availability page.
pub fn extract_embedded_payload(body: &str) -> Result<serde_json::Value, FlightError> {
    let document = Html::parse_document(body);
    let script_selector = Selector::parse("script")
        .map_err(|e| FlightError::Extraction(format!("Invalid script selector: {}", e)))?;
    let pattern = Regex::new(PAYLOAD_PATTERN)
        .map_err(|e| FlightError::Extraction(format!("Invalid payload pattern: {}", e)))?;

    let captured = document
        .select(&script_selector)
        .map(|script| script.text().collect::<String>())
        .filter(|text| text.contains(PAYLOAD_MARKER))
        .find_map(|text| {
            pattern
                .captures(&text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
        .ok_or_else(|| {
            warn!("No generatedJSon script found in availability page");
            missing_data()
        })?;

    debug!(payload_length = captured.len(), "Found embedded payload");

    if let Ok(value) = serde_json::from_str(&captured) {
        return Ok(value);
    }
    let unescaped = unescape_js_string(&captured).ok_or_else(missing_data)?;
    serde_json::from_str(&unescaped).map_err(|e| {
        warn!(error = %e, "Embedded payload is not valid JSON");
        missing_data()
    })
}

/// Undo the escapes of a single-quoted JavaScript string literal.
///
/// Returns `None` on a truncated or malformed escape.
pub fn unescape_js_string(literal: &str) -> Option<String> {
    let mut out = String::with_capacity(literal.len());
    let mut chars = literal.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            'x' => {
                let code = hex_value(&mut chars, 2)?;
                out.push(char::from_u32(code)?);
            }
            'u' => {
                let high = hex_value(&mut chars, 4)?;
                if (0xD800..0xDC00).contains(&high) {
                    if chars.next()? != '\\' || chars.next()? != 'u' {
                        return None;
                    }
                    let low = hex_value(&mut chars, 4)?;
                    let combined = 0x10000 + ((high - 0xD800) << 10) + (low.checked_sub(0xDC00)?);
                    out.push(char::from_u32(combined)?);
                } else {
                    out.push(char::from_u32(high)?);
                }
            }
            // line continuation
            '\n' => {}
            other => out.push(other),
        }
    }

    Some(out)
}

fn hex_value(chars: &mut std::str::Chars<'_>, digits: usize) -> Option<u32> {
    let mut value = 0;
    for _ in 0..digits {
        value = value * 16 + chars.next()?.to_digit(16)?;
    }
    Some(value)
}

/// Decode the availability page into a lazy stream of tickets.
///
/// The page is parsed up front; tickets are produced one recommendation at a
/// time as the iterator is driven.
pub fn extract_tickets(body: &str) -> Result<Tickets, FlightError> {
    let value = extract_embedded_payload(body)?;
    let payload: Payload = serde_json::from_value(value).map_err(|e| {
        warn!(error = %e, "Embedded payload has an unexpected shape");
        FlightError::Extraction(format!("{} ({})", MISSING_DATA_MESSAGE, e))
    })?;
    Ok(Tickets::new(payload))
}

/// Tickets of one availability page, in payload order.
///
/// Each recommendation is resolved completely before any of its tickets are
/// yielded. The first broken reference ends the stream with an
/// [`FlightError::InconsistentData`] item.
pub struct Tickets {
    flights: HashMap<String, Flight>,
    recommendations: std::vec::IntoIter<Recommendation>,
    pending: VecDeque<FlightTicket>,
    failed: bool,
}

impl Tickets {
    pub fn new(payload: Payload) -> Self {
        let flights: HashMap<String, Flight> = payload
            .list_tab
            .list_proposed_bound
            .into_iter()
            .flat_map(|bound| bound.list_flight)
            .map(|flight| (flight.flight_id.clone(), flight))
            .collect();

        debug!(
            flights = flights.len(),
            recommendations = payload.list_tab.list_recommendation.len(),
            "Built flight lookup"
        );

        Self {
            flights,
            recommendations: payload.list_tab.list_recommendation.into_iter(),
            pending: VecDeque::new(),
            failed: false,
        }
    }
}

impl Iterator for Tickets {
    type Item = Result<FlightTicket, FlightError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(ticket) = self.pending.pop_front() {
                return Some(Ok(ticket));
            }
            if self.failed {
                return None;
            }
            let recommendation = self.recommendations.next()?;
            match resolve_recommendation(&self.flights, &recommendation) {
                Ok(tickets) => self.pending.extend(tickets),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

fn resolve_recommendation(
    flights: &HashMap<String, Flight>,
    recommendation: &Recommendation,
) -> Result<Vec<FlightTicket>, FlightError> {
    let ticket_class = ticket_class(recommendation);
    let price = first_price(recommendation)?;

    recommendation
        .list_bound
        .iter()
        .flat_map(|bound| &bound.list_flight)
        .map(|reference| {
            let flight = flights.get(&reference.flight_id).ok_or_else(|| {
                FlightError::InconsistentData(format!(
                    "recommendation references unknown flight_id {}",
                    reference.flight_id
                ))
            })?;
            ticket_for(flight, ticket_class, price)
        })
        .collect()
}

fn ticket_for(flight: &Flight, ticket_class: &str, price: &PnrPrice) -> Result<FlightTicket, FlightError> {
    let (first, last) = match (flight.list_segment.first(), flight.list_segment.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(FlightError::InconsistentData(format!(
                "flight {} has no segments",
                flight.flight_id
            )))
        }
    };
    let (depart_date, arrival_date) = flight_dates(first, last);

    Ok(FlightTicket {
        flight_number: flight_number(flight),
        ticket_class: ticket_class.to_string(),
        depart_date,
        arrival_date,
        origin: first.b_location.location_name.clone(),
        destination: last.e_location.location_name.clone(),
        pricing: price.total_amount.clone(),
        currency: price.currency.code.clone(),
    })
}

/// Airline code and number of every leg, joined with `+`
pub fn flight_number(flight: &Flight) -> String {
    flight
        .list_segment
        .iter()
        .map(|segment| format!("{}{}", segment.airline.code, segment.flight_number))
        .collect::<Vec<_>>()
        .join("+")
}

fn flight_dates(first: &Segment, last: &Segment) -> (String, String) {
    (
        format!("{}{}", first.b_date_date, first.b_date_time),
        format!("{}{}", last.e_date_date, last.e_date_time),
    )
}

pub fn ticket_class(recommendation: &Recommendation) -> &str {
    &recommendation.fare_family.brand_name
}

/// The first priced itinerary; later fare options are not surfaced.
pub fn first_price(recommendation: &Recommendation) -> Result<&PnrPrice, FlightError> {
    recommendation
        .list_pnr
        .first()
        .and_then(|pnr| pnr.list_pnr_price.first())
        .ok_or_else(|| {
            FlightError::InconsistentData(format!(
                "{} recommendation has no priced itinerary",
                recommendation.fare_family.brand_name
            ))
        })
}
