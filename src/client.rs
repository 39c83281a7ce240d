//! HTTP client for the CityJet booking flow

use crate::catalog::{parse_catalog, Catalog};
use crate::config::ScraperConfig;
use crate::extract::extract_tickets;
use crate::form::{FormMethod, FormReader, HtmlForm};
use crate::options::{build_options, FormOptions};
use crate::{FlightError, FlightTicket, FlowStep, SearchRequest};
use reqwest::{header, Client, Url};
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// A fetched page and the URL it was finally served from
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub body: String,
}

/// Main client for talking to the booking site.
///
/// One client holds one cookie jar, so a single search should run on a
/// single client from landing page to availability page.
pub struct FlightClient {
    http_client: Client,
    form_reader: FormReader,
    config: ScraperConfig,
}

impl FlightClient {
    /// Create a new flight client
    pub fn new(config: ScraperConfig) -> Result<Self, FlightError> {
        debug!("Creating new flight client");
        let mut builder = Client::builder()
            .user_agent(config.user_agent.as_str())
            .cookie_store(true);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;
        let form_reader = FormReader::new()?;

        debug!("Flight client created successfully");
        Ok(Self {
            http_client,
            form_reader,
            config,
        })
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Download and decode the airport catalog. Never cached.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch_catalog(&self) -> Result<Catalog, FlightError> {
        let url = &self.config.catalog_url;
        info!(url = %url, "Fetching airport catalog");

        let start_time = Instant::now();
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| FlightError::CatalogFormat(format!("request failed: {}", e)))?;
        let status = response.status();
        info!(
            status = %status,
            duration_ms = start_time.elapsed().as_millis(),
            "Catalog request completed"
        );

        if !status.is_success() {
            error!(status = %status, "Catalog request failed");
            return Err(FlightError::CatalogFormat(format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FlightError::CatalogFormat(format!("unreadable body: {}", e)))?;
        parse_catalog(&body)
    }

    /// Step 1: open the site root so the session cookies get set
    #[instrument(level = "info", skip(self))]
    pub async fn landing(&self) -> Result<Page, FlightError> {
        let url = Url::parse(&self.config.landing_url)
            .map_err(|e| FlightError::InvalidUrl(format!("{}: {}", self.config.landing_url, e)))?;
        self.fetch(FlowStep::Landing, self.http_client.get(url)).await
    }

    /// Step 2: submit the search form found on the landing page with `options`
    /// laid over its own fields.
    #[instrument(level = "info", skip(self, landing, options))]
    pub async fn submit_first(&self, landing: &Page, options: &FormOptions) -> Result<Page, FlightError> {
        let action = &self.config.first_form_action;
        let mut form = find_form(&self.form_reader, landing, action, FlowStep::FirstSubmit)?;
        form.merge(options.iter());
        self.submit(FlowStep::FirstSubmit, landing, &form).await
    }

    /// Step 3: submit the intermediate page's override form untouched
    #[instrument(level = "info", skip(self, intermediate))]
    pub async fn submit_second(&self, intermediate: &Page) -> Result<Page, FlightError> {
        let action = &self.config.second_form_action;
        let form = find_form(&self.form_reader, intermediate, action, FlowStep::SecondSubmit)?;
        self.submit(FlowStep::SecondSubmit, intermediate, &form).await
    }

    /// Run the three form steps in order and return the availability page
    #[instrument(level = "info", skip(self, options))]
    pub async fn submit_flow(&self, options: &FormOptions) -> Result<Page, FlightError> {
        let landing = self.landing().await?;
        self.submit_forms(&landing, options).await
    }

    /// Catalog, options and form flow up to the availability page.
    ///
    /// The catalog download overlaps with the landing request; everything
    /// after that is sequential.
    #[instrument(level = "info", skip(self, request), fields(from = %request.from_city, to = %request.to_city))]
    pub async fn search_page(&self, request: &SearchRequest) -> Result<Page, FlightError> {
        let (catalog, landing) = tokio::try_join!(self.fetch_catalog(), self.landing())?;

        let options = build_options(
            &request.from_city,
            &request.to_city,
            request.depart_date,
            request.return_date,
            &catalog.index(),
        )?;
        debug!(fields = options.len(), "Form options built");

        self.submit_forms(&landing, &options).await
    }

    /// Full search: every ticket on the availability page
    #[instrument(level = "info", skip(self, request), fields(from = %request.from_city, to = %request.to_city))]
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<FlightTicket>, FlightError> {
        let page = self.search_page(request).await?;
        let tickets = extract_tickets(&page.body)?.collect::<Result<Vec<_>, _>>()?;
        info!(tickets_found = tickets.len(), "Search completed");
        Ok(tickets)
    }

    // Steps 2 and 3, from an already fetched landing page
    async fn submit_forms(&self, landing: &Page, options: &FormOptions) -> Result<Page, FlightError> {
        let intermediate = self.submit_first(landing, options).await?;
        self.submit_second(&intermediate).await
    }

    async fn submit(&self, step: FlowStep, page: &Page, form: &HtmlForm) -> Result<Page, FlightError> {
        let target = form.target_url(&page.url).map_err(FlightError::InvalidUrl)?;
        let request = match form.method() {
            FormMethod::Post => self.http_client.post(target).form(form.fields()),
            FormMethod::Get => self.http_client.get(target).query(form.fields()),
        };
        let request = request.header(header::REFERER, page.url.as_str());
        self.fetch(step, request).await
    }

    async fn fetch(&self, step: FlowStep, request: reqwest::RequestBuilder) -> Result<Page, FlightError> {
        let start_time = Instant::now();
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().clone();

        info!(
            step = %step,
            url = %url,
            status = %status,
            duration_ms = start_time.elapsed().as_millis(),
            "HTTP request completed"
        );

        if !status.is_success() {
            error!(step = %step, status = %status, "HTTP request failed");
            return Err(FlightError::HttpStatus {
                step,
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        debug!(step = %step, html_length = body.len(), "Received HTML response");
        Ok(Page { url, body })
    }
}

fn find_form(reader: &FormReader, page: &Page, action: &str, step: FlowStep) -> Result<HtmlForm, FlightError> {
    reader.find(&page.body, action).ok_or_else(|| {
        error!(step = %step, action = %action, "Expected form not found");
        FlightError::FormNotFound {
            step,
            action: action.to_string(),
        }
    })
}
