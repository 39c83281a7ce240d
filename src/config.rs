//! Endpoints and HTTP settings for the booking flow

use std::time::Duration;

pub const CATALOG_URL: &str = "https://www.cityjet.com/cgi-bin/eRetail/airports.json";
pub const LANDING_URL: &str = "https://www.cityjet.com";
pub const FIRST_FORM_ACTION: &str = "https://www.cityjet.com/book/go/";
pub const SECOND_FORM_ACTION: &str =
    "https://book.cityjet.com/plnext/CityJetairlines/Override.action";

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Where the scraper talks to and how.
///
/// `Default` targets the production site. The form actions are matched
/// verbatim against the `action` attribute of the forms on each page.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub catalog_url: String,
    pub landing_url: String,
    pub first_form_action: String,
    pub second_form_action: String,
    pub user_agent: String,
    /// Per-request timeout. `None` lets a hung connection block the run.
    pub timeout: Option<Duration>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            catalog_url: CATALOG_URL.to_string(),
            landing_url: LANDING_URL.to_string(),
            first_form_action: FIRST_FORM_ACTION.to_string(),
            second_form_action: SECOND_FORM_ACTION.to_string(),
            user_agent: USER_AGENT.to_string(),
            timeout: None,
        }
    }
}

impl ScraperConfig {
    /// Point every endpoint at `base` while keeping the production paths.
    ///
    /// Handy for mock servers: `https://host/book/go/` becomes
    /// `<base>/book/go/` and so on.
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            catalog_url: format!("{}/cgi-bin/eRetail/airports.json", base),
            landing_url: base.to_string(),
            first_form_action: format!("{}/book/go/", base),
            second_form_action: format!("{}/plnext/CityJetairlines/Override.action", base),
            ..Self::default()
        }
    }
}
