//! CLI interface for cityjet-flights

use anyhow::{anyhow, Result};
use chrono::{Days, Local, NaiveDate};
use cityjet_flights::{
    build_options, extract_tickets, parse_date, Catalog, FlightClient, RouteCheck, ScraperConfig,
};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cityjet-flights")]
#[command(about = "List CityJet flights and fares for a route and date")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub endpoints: EndpointArgs,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct EndpointArgs {
    /// Airport catalog URL
    #[arg(long, env = "CITYJET_CATALOG_URL", global = true)]
    pub catalog_url: Option<String>,
    /// Booking site root
    #[arg(long, env = "CITYJET_LANDING_URL", global = true)]
    pub landing_url: Option<String>,
    /// Action of the search form on the landing page
    #[arg(long, env = "CITYJET_FIRST_FORM_ACTION", global = true)]
    pub first_form_action: Option<String>,
    /// Action of the override form on the intermediate page
    #[arg(long, env = "CITYJET_SECOND_FORM_ACTION", global = true)]
    pub second_form_action: Option<String>,
    /// Per-request timeout in seconds (none by default)
    #[arg(long, env = "CITYJET_TIMEOUT_SECS", global = true)]
    pub timeout_secs: Option<u64>,
}

impl EndpointArgs {
    fn into_config(self) -> ScraperConfig {
        let defaults = ScraperConfig::default();
        ScraperConfig {
            catalog_url: self.catalog_url.unwrap_or(defaults.catalog_url),
            landing_url: self.landing_url.unwrap_or(defaults.landing_url),
            first_form_action: self.first_form_action.unwrap_or(defaults.first_form_action),
            second_form_action: self.second_form_action.unwrap_or(defaults.second_form_action),
            user_agent: defaults.user_agent,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search for flights
    Search {
        /// Departure city
        #[arg(short, long, default_value = "London")]
        from: String,
        /// Destination city
        #[arg(short, long, default_value = "Amsterdam")]
        to: String,
        /// Departure date (YYYYMMDD) [default: today + 10 days]
        #[arg(short, long)]
        depart: Option<String>,
        /// Also list return flights on this date (YYYYMMDD)
        #[arg(short, long = "return")]
        return_date: Option<String>,
    },
    /// Show the list of served routes
    Routes,
    /// Search every route for each day of a date range
    Sweep {
        /// First day (YYYYMMDD) [default: today + 10 days]
        #[arg(short, long)]
        start: Option<String>,
        /// Number of days to cover
        #[arg(long, default_value = "30")]
        days: u64,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn default_depart_date() -> Result<NaiveDate> {
    Local::now()
        .date_naive()
        .checked_add_days(Days::new(10))
        .ok_or_else(|| anyhow!("date out of range"))
}

fn date_or_default(date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(date) => Ok(parse_date(date)?),
        None => default_depart_date(),
    }
}

/// Run one one-way search and stream its tickets to `out`, a JSON object
/// per line.
async fn print_tickets<W: Write>(
    out: &mut W,
    config: &ScraperConfig,
    catalog: &Catalog,
    from: &str,
    to: &str,
    depart: NaiveDate,
) -> Result<usize> {
    let options = build_options(from, to, depart, None, &catalog.index())?;
    let client = FlightClient::new(config.clone())?;
    let page = client.submit_flow(&options).await?;

    let mut count = 0;
    for ticket in extract_tickets(&page.body)? {
        writeln!(out, "{}", ticket?.to_json_line()?)?;
        count += 1;
    }
    out.flush()?;
    Ok(count)
}

/// Validate the route, print the banner and the tickets. `false` when the
/// route was rejected and the caller should stop.
async fn issue_result<W: Write>(
    out: &mut W,
    config: &ScraperConfig,
    catalog: &Catalog,
    from: &str,
    to: &str,
    depart: NaiveDate,
    kind: &str,
) -> Result<bool> {
    let check = catalog.check_route(from, to);
    if check != RouteCheck::Valid {
        writeln!(out, "{}", check)?;
        return Ok(false);
    }

    writeln!(out, "{:=^80}", format!(" {} ", kind))?;
    let count = print_tickets(out, config, catalog, from, to, depart).await?;
    info!(from = from, to = to, date = %depart, tickets = count, "Search finished");
    Ok(true)
}

async fn run<W: Write>(cli: Cli, out: &mut W) -> Result<()> {
    let config = cli.endpoints.into_config();
    let catalog = FlightClient::new(config.clone())?.fetch_catalog().await?;

    match cli.command {
        Commands::Routes => {
            for route in catalog.routes() {
                writeln!(out, "{}", route)?;
            }
        }
        Commands::Search {
            from,
            to,
            depart,
            return_date,
        } => {
            let depart = date_or_default(depart.as_deref())?;
            let return_date = return_date.as_deref().map(parse_date).transpose()?;

            if !issue_result(out, &config, &catalog, &from, &to, depart, "DEPART").await? {
                return Ok(());
            }
            if let Some(return_date) = return_date {
                issue_result(out, &config, &catalog, &to, &from, return_date, "RETURN").await?;
            }
        }
        Commands::Sweep { start, days } => {
            let start = date_or_default(start.as_deref())?;
            for delta in 0..days {
                let Some(date) = start.checked_add_days(Days::new(delta)) else {
                    break;
                };
                for route in catalog.routes() {
                    match print_tickets(out, &config, &catalog, &route.origin, &route.destination, date).await {
                        Ok(count) => info!(route = %route, date = %date, tickets = count, "Route swept"),
                        Err(e) => warn!(route = %route, date = %date, error = %e, "Route search failed"),
                    }
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    if let Err(e) = run(cli, &mut std::io::stdout()).await {
        eprintln!("Error searching for flights: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cityjet_flights::parse_catalog;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CATALOG: &str = r#"function({"airports": [
        {"code": "LCY", "shortname": "London", "safe_name": "london"},
        {"code": "AMS", "shortname": "Amsterdam", "safe_name": "amsterdam"},
        {"code": "DUB", "shortname": "Dublin", "safe_name": "dublin"}
    ], "routes": [["LCY", "AMS"], ["AMS", "LCY"]]});"#;

    fn printed(out: Vec<u8>) -> String {
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "cityjet-flights",
            "search",
            "--from", "Dublin",
            "--to", "London",
            "--depart", "20240115",
            "--return", "20240120",
        ]);

        assert!(cli.is_ok());

        if let Ok(Cli { command: Commands::Search { from, to, depart, return_date }, .. }) = cli {
            assert_eq!(from, "Dublin");
            assert_eq!(to, "London");
            assert_eq!(depart.as_deref(), Some("20240115"));
            assert_eq!(return_date.as_deref(), Some("20240120"));
        }
    }

    #[test]
    fn test_search_defaults() {
        let cli = Cli::try_parse_from(["cityjet-flights", "search"]).unwrap();
        match cli.command {
            Commands::Search { from, to, depart, return_date } => {
                assert_eq!(from, "London");
                assert_eq!(to, "Amsterdam");
                assert!(depart.is_none());
                assert!(return_date.is_none());
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn test_endpoint_overrides() {
        let cli = Cli::try_parse_from([
            "cityjet-flights",
            "routes",
            "--landing-url", "http://localhost:9000",
            "--timeout-secs", "5",
        ])
        .unwrap();
        let config = cli.endpoints.into_config();
        assert_eq!(config.landing_url, "http://localhost:9000");
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.first_form_action, ScraperConfig::default().first_form_action);
    }

    #[test]
    fn test_sweep_days() {
        let cli = Cli::try_parse_from(["cityjet-flights", "sweep", "--start", "20240101", "--days", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::Sweep { days: 3, .. }));
    }

    #[tokio::test]
    async fn test_rejected_route_is_reported_without_searching() {
        let catalog = parse_catalog(CATALOG).unwrap();
        // Nothing listens here; any request would fail the search
        let config = ScraperConfig::with_base_url("http://127.0.0.1:9");
        let depart = parse_date("20240115").unwrap();

        let cases = [
            ("Paris", "London", "Paris is not a valid origin"),
            ("London", "Rome", "Rome is not a valid destination"),
            ("Dublin", "Amsterdam", "No flight between Dublin and Amsterdam"),
        ];
        for (from, to, message) in cases {
            let mut out = Vec::new();
            let issued = issue_result(&mut out, &config, &catalog, from, to, depart, "DEPART")
                .await
                .unwrap();
            assert!(!issued, "{} -> {} should be rejected", from, to);
            assert_eq!(printed(out), format!("{}\n", message));
        }
    }

    #[tokio::test]
    async fn test_rejected_depart_skips_return_leg() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/eRetail/airports.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CATALOG))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let config = ScraperConfig::with_base_url(&server.uri());
        let cli = Cli::try_parse_from([
            "cityjet-flights",
            "--catalog-url", config.catalog_url.as_str(),
            "--landing-url", config.landing_url.as_str(),
            "--first-form-action", config.first_form_action.as_str(),
            "--second-form-action", config.second_form_action.as_str(),
            "search",
            "--from", "Paris",
            "--to", "London",
            "--depart", "20240115",
            "--return", "20240120",
        ])
        .unwrap();

        let mut out = Vec::new();
        run(cli, &mut out).await.unwrap();

        let text = printed(out);
        assert_eq!(text, "Paris is not a valid origin\n");
        assert!(!text.contains("RETURN"));
    }
}
