// src/mcp_server.rs

use anyhow::Result;
use cityjet_flights::{parse_date, FlightClient, FlightTicket, ScraperConfig, SearchRequest};
use rmcp::{
    model::{ServerCapabilities, ServerInfo},
    schemars, tool,
    transport::stdio,
    ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Flight search MCP server
#[derive(Default, Clone)]
pub struct FlightServer {
    config: ScraperConfig,
}

impl FlightServer {
    pub fn new(config: ScraperConfig) -> Self {
        Self { config }
    }

    /// Initialize logging to file
    fn init_logging() -> Result<()> {
        let log_dir = PathBuf::from("logs");
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = tracing_appender::rolling::daily(&log_dir, "cityjet-flights-mcp.log");

        // stdout carries the MCP protocol, so logs only go to the file
        tracing_subscriber::registry()
            .with(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info"))
                    .add_directive("cityjet_flights=debug".parse()?),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_appender)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json(),
            )
            .init();

        info!("Logging initialized - logs will be written to logs/cityjet-flights-mcp.log.*");
        Ok(())
    }

    async fn run_search(&self, request: &SearchRequest) -> Result<Vec<FlightTicket>, String> {
        let client = FlightClient::new(self.config.clone()).map_err(|e| e.to_string())?;
        client.search(request).await.map_err(|e| e.to_string())
    }
}

/// Flight search parameters
#[derive(Debug, Deserialize, Clone, schemars::JsonSchema)]
pub struct FlightSearchParams {
    #[schemars(description = "Departure city as listed by list_routes (e.g., London, london)")]
    pub from_city: String,
    #[schemars(description = "Destination city as listed by list_routes (e.g., Amsterdam)")]
    pub to_city: String,
    #[schemars(description = "Departure date in YYYYMMDD format")]
    pub departure_date: String,
    #[schemars(description = "Return date in YYYYMMDD format; searched as a separate one-way trip")]
    pub return_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FlightSearchResult {
    pub total_tickets: usize,
    pub tickets: Vec<FlightTicket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_tickets: Option<Vec<FlightTicket>>,
}

#[tool(tool_box)]
impl FlightServer {
    /// Search CityJet flights for one route and date
    #[tool(description = "Search CityJet flights between two cities on a date. Returns one record per bookable flight and fare family with price and currency. Dates in results are local YYYYMMDDHHMM.")]
    async fn get_flights(&self, #[tool(aggr)] params: FlightSearchParams) -> String {
        info!(
            from_city = params.from_city,
            to_city = params.to_city,
            departure_date = params.departure_date,
            return_date = params.return_date.as_deref(),
            "Flight search request received"
        );

        let depart_date = match parse_date(&params.departure_date) {
            Ok(date) => date,
            Err(e) => {
                warn!("Invalid departure date: {}", e);
                return serde_json::json!({ "error": e.to_string() }).to_string();
            }
        };
        let return_date = match params.return_date.as_deref().map(parse_date).transpose() {
            Ok(date) => date,
            Err(e) => {
                warn!("Invalid return date: {}", e);
                return serde_json::json!({ "error": e.to_string() }).to_string();
            }
        };

        let outbound = SearchRequest::one_way(&params.from_city, &params.to_city, depart_date);
        let tickets = match self.run_search(&outbound).await {
            Ok(tickets) => tickets,
            Err(e) => {
                error!("Flight search failed: {}", e);
                return serde_json::json!({ "error": format!("Flight search failed: {}", e) }).to_string();
            }
        };

        let return_tickets = match return_date {
            Some(date) => {
                debug!("Searching return leg");
                let inbound = SearchRequest::one_way(&params.to_city, &params.from_city, date);
                match self.run_search(&inbound).await {
                    Ok(tickets) => Some(tickets),
                    Err(e) => {
                        error!("Return flight search failed: {}", e);
                        return serde_json::json!({ "error": format!("Return flight search failed: {}", e) })
                            .to_string();
                    }
                }
            }
            None => None,
        };

        let total_tickets = tickets.len() + return_tickets.as_ref().map_or(0, Vec::len);
        info!(tickets_found = total_tickets, "Flight search completed successfully");

        let result = FlightSearchResult {
            total_tickets,
            tickets,
            return_tickets,
        };
        serde_json::to_string_pretty(&result)
            .unwrap_or_else(|e| serde_json::json!({ "error": format!("Failed to serialize results: {}", e) }).to_string())
    }

    /// List the routes CityJet currently serves
    #[tool(description = "List the origin/destination city pairs CityJet currently serves, as accepted by get_flights.")]
    async fn list_routes(&self) -> String {
        info!("Route list request received");

        let catalog = match FlightClient::new(self.config.clone()) {
            Ok(client) => client.fetch_catalog().await,
            Err(e) => Err(e),
        };

        match catalog {
            Ok(catalog) => {
                let routes: Vec<_> = catalog.routes().collect();
                info!(routes = routes.len(), "Route list fetched");
                serde_json::json!({ "total_routes": routes.len(), "routes": routes }).to_string()
            }
            Err(e) => {
                error!("Route list failed: {}", e);
                serde_json::json!({ "error": format!("Route list failed: {}", e) }).to_string()
            }
        }
    }
}

#[tool(tool_box)]
impl ServerHandler for FlightServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("A CityJet flight search server. Use list_routes to discover served city pairs and get_flights to list bookable flights with fares for a date.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = FlightServer::init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!("Starting MCP Flight Server");

    let server = FlightServer::new(ScraperConfig::default());
    let transport = stdio();

    let service = server.serve(transport).await?;
    info!("MCP service started, waiting for requests");

    service.waiting().await?;

    info!("MCP service shutting down");
    Ok(())
}
