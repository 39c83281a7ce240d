//! Airport and route catalog
//!
//! The booking site publishes its airports and the routes it flies as a
//! JSONP document: `function({"airports": [...], "routes": [[from, to], ...]});`

use crate::FlightError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tracing::debug;

const JSONP_PREFIX: &str = "function(";
const JSONP_SUFFIX: &str = ");";

/// Airport metadata as published in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub code: String,
    #[serde(rename = "shortname")]
    pub short_name: String,
    pub safe_name: String,
    #[serde(default, alias = "displayname")]
    pub display_name: Option<String>,
}

/// A served route, as a pair of airport safe names
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Route {
    pub origin: String,
    pub destination: String,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.origin, self.destination)
    }
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    airports: Vec<Airport>,
    routes: Vec<(String, String)>,
}

/// Airports keyed by code, plus every valid route
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    airports: BTreeMap<String, Airport>,
    routes: BTreeSet<Route>,
}

/// Outcome of validating a requested origin/destination pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteCheck {
    Valid,
    UnknownOrigin(String),
    UnknownDestination(String),
    NoRoute { origin: String, destination: String },
}

impl RouteCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, RouteCheck::Valid)
    }
}

impl fmt::Display for RouteCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteCheck::Valid => f.write_str("valid route"),
            RouteCheck::UnknownOrigin(city) => write!(f, "{} is not a valid origin", city),
            RouteCheck::UnknownDestination(city) => {
                write!(f, "{} is not a valid destination", city)
            }
            RouteCheck::NoRoute { origin, destination } => {
                write!(f, "No flight between {} and {}", origin, destination)
            }
        }
    }
}

/// Strip the `function(` ... `);` wrapper and return the JSON inside.
pub fn unwrap_jsonp(body: &str) -> Result<&str, FlightError> {
    let trimmed = body.trim();
    let inner = trimmed
        .strip_prefix(JSONP_PREFIX)
        .ok_or_else(|| {
            FlightError::CatalogFormat(format!("payload does not start with `{}`", JSONP_PREFIX))
        })?
        .strip_suffix(JSONP_SUFFIX)
        .ok_or_else(|| {
            FlightError::CatalogFormat(format!("payload does not end with `{}`", JSONP_SUFFIX))
        })?;
    Ok(inner)
}

/// Decode a catalog document, wrapper included.
pub fn parse_catalog(body: &str) -> Result<Catalog, FlightError> {
    let json = unwrap_jsonp(body)?;
    let raw: RawCatalog = serde_json::from_str(json)
        .map_err(|e| FlightError::CatalogFormat(format!("invalid catalog JSON: {}", e)))?;

    let airports: BTreeMap<String, Airport> = raw
        .airports
        .into_iter()
        .map(|airport| (airport.code.clone(), airport))
        .collect();

    let mut routes = BTreeSet::new();
    for (from, to) in raw.routes {
        let origin = airports
            .get(&from)
            .ok_or_else(|| FlightError::CatalogFormat(format!("route references unknown airport {}", from)))?;
        let destination = airports
            .get(&to)
            .ok_or_else(|| FlightError::CatalogFormat(format!("route references unknown airport {}", to)))?;
        routes.insert(Route {
            origin: origin.safe_name.clone(),
            destination: destination.safe_name.clone(),
        });
    }

    debug!(airports = airports.len(), routes = routes.len(), "Catalog parsed");
    Ok(Catalog { airports, routes })
}

impl Catalog {
    pub fn airport(&self, code: &str) -> Option<&Airport> {
        self.airports.get(code)
    }

    pub fn airports(&self) -> impl Iterator<Item = &Airport> {
        self.airports.values()
    }

    /// Valid routes, sorted by origin then destination
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn has_route(&self, origin_safe_name: &str, destination_safe_name: &str) -> bool {
        self.routes.contains(&Route {
            origin: origin_safe_name.to_string(),
            destination: destination_safe_name.to_string(),
        })
    }

    /// Build the city name lookup used by the form builder
    pub fn index(&self) -> AirportIndex {
        AirportIndex::new(self.airports.values())
    }

    /// Validate a requested trip the way the search surfaces report it
    pub fn check_route(&self, origin: &str, destination: &str) -> RouteCheck {
        let index = self.index();
        let Some(from) = index.resolve(origin) else {
            return RouteCheck::UnknownOrigin(origin.to_string());
        };
        let Some(to) = index.resolve(destination) else {
            return RouteCheck::UnknownDestination(destination.to_string());
        };
        if self.has_route(&from.safe_name, &to.safe_name) {
            RouteCheck::Valid
        } else {
            RouteCheck::NoRoute {
                origin: origin.to_string(),
                destination: destination.to_string(),
            }
        }
    }
}

/// Lookup from a human-readable city name to its airport.
///
/// Short names are the primary keys; safe names resolve too unless they
/// collide with another airport's short name.
#[derive(Debug, Clone, Default)]
pub struct AirportIndex {
    by_name: HashMap<String, Airport>,
}

impl AirportIndex {
    pub fn new<'a>(airports: impl IntoIterator<Item = &'a Airport>) -> Self {
        let airports: Vec<&Airport> = airports.into_iter().collect();
        let mut by_name = HashMap::new();
        for airport in &airports {
            by_name.insert(airport.short_name.clone(), (*airport).clone());
        }
        for airport in &airports {
            by_name
                .entry(airport.safe_name.clone())
                .or_insert_with(|| (*airport).clone());
        }
        Self { by_name }
    }

    pub fn resolve(&self, city: &str) -> Option<&Airport> {
        self.by_name.get(city)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
