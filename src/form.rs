//! HTML form reader
//!
//! Collects the fields a scraping framework submits for a form: named inputs
//! with their current values, checked boxes, selected options, textareas and
//! the first submit control. Hidden tokens and session fields ride along this
//! way without the caller knowing about them.

use crate::FlightError;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMethod {
    Get,
    Post,
}

/// A form lifted out of a page, ready to submit
#[derive(Debug, Clone)]
pub struct HtmlForm {
    action: String,
    method: FormMethod,
    fields: Vec<(String, String)>,
}

/// Pre-compiled selectors for reading forms out of a page
#[derive(Debug, Clone)]
pub struct FormReader {
    form_selector: Selector,
    controls_selector: Selector,
    option_selector: Selector,
}

impl FormReader {
    pub fn new() -> Result<Self, FlightError> {
        debug!("Initializing form reader with selectors");
        Ok(Self {
            form_selector: Selector::parse("form")
                .map_err(|e| FlightError::ParseError(format!("Invalid form selector: {}", e)))?,
            controls_selector: Selector::parse("input, select, textarea, button")
                .map_err(|e| FlightError::ParseError(format!("Invalid controls selector: {}", e)))?,
            option_selector: Selector::parse("option")
                .map_err(|e| FlightError::ParseError(format!("Invalid option selector: {}", e)))?,
        })
    }

    /// Find the first form whose `action` attribute equals `action`.
    pub fn find(&self, html: &str, action: &str) -> Option<HtmlForm> {
        let document = Html::parse_document(html);
        let form = document
            .select(&self.form_selector)
            .find(|form| form.value().attr("action") == Some(action))?;
        Some(self.read(form))
    }

    pub fn read(&self, form: ElementRef<'_>) -> HtmlForm {
        let action = form.value().attr("action").unwrap_or_default().to_string();
        let method = match form.value().attr("method") {
            Some(m) if m.eq_ignore_ascii_case("post") => FormMethod::Post,
            _ => FormMethod::Get,
        };

        let mut fields = Vec::new();
        let mut clicked: Option<(String, String)> = None;
        let mut click_taken = false;

        for control in form.select(&self.controls_selector) {
            let element = control.value();
            if element.attr("disabled").is_some() {
                continue;
            }
            let name = element.attr("name");

            match element.name() {
                "input" => {
                    let kind = element.attr("type").unwrap_or("text").to_ascii_lowercase();
                    if kind == "submit" || kind == "image" {
                        if !click_taken {
                            click_taken = true;
                            clicked = name.map(|n| {
                                (n.to_string(), element.attr("value").unwrap_or_default().to_string())
                            });
                        }
                        continue;
                    }
                    let Some(name) = name else { continue };
                    if kind == "reset" {
                        continue;
                    }
                    if (kind == "checkbox" || kind == "radio") && element.attr("checked").is_none() {
                        continue;
                    }
                    let default = if kind == "checkbox" || kind == "radio" { "on" } else { "" };
                    let value = element.attr("value").unwrap_or(default);
                    fields.push((name.to_string(), value.to_string()));
                }
                "select" => {
                    let Some(name) = name else { continue };
                    for value in self.selected_options(control) {
                        fields.push((name.to_string(), value));
                    }
                }
                "textarea" => {
                    let Some(name) = name else { continue };
                    fields.push((name.to_string(), control.text().collect()));
                }
                "button" => {
                    let kind = element.attr("type").unwrap_or("submit");
                    if kind.eq_ignore_ascii_case("submit") && !click_taken {
                        click_taken = true;
                        clicked = name.map(|n| {
                            (n.to_string(), element.attr("value").unwrap_or_default().to_string())
                        });
                    }
                }
                _ => {}
            }
        }

        fields.extend(clicked);
        debug!(action = %action, fields = fields.len(), "Read form fields");

        HtmlForm { action, method, fields }
    }

    fn selected_options(&self, select: ElementRef<'_>) -> Vec<String> {
        let options: Vec<ElementRef<'_>> = select.select(&self.option_selector).collect();
        let option_value = |option: &ElementRef<'_>| {
            option
                .value()
                .attr("value")
                .map(str::to_string)
                .unwrap_or_else(|| option.text().collect::<String>().trim().to_string())
        };

        let selected: Vec<String> = options
            .iter()
            .filter(|option| option.value().attr("selected").is_some())
            .map(option_value)
            .collect();

        if select.value().attr("multiple").is_some() {
            return selected;
        }
        selected
            .into_iter()
            .next()
            .or_else(|| options.first().map(option_value))
            .into_iter()
            .collect()
    }
}

impl HtmlForm {
    /// Overlay values: existing fields are replaced in place, new ones appended.
    pub fn merge<'a>(&mut self, overrides: impl IntoIterator<Item = (&'a str, &'a str)>) {
        for (name, value) in overrides {
            let mut replaced = false;
            self.fields.retain_mut(|(key, current)| {
                if key.as_str() != name {
                    return true;
                }
                if replaced {
                    return false;
                }
                *current = value.to_string();
                replaced = true;
                true
            });
            if !replaced {
                self.fields.push((name.to_string(), value.to_string()));
            }
        }
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn method(&self) -> FormMethod {
        self.method
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Absolute submission URL for a form found on `page_url`
    pub fn target_url(&self, page_url: &Url) -> Result<Url, String> {
        page_url
            .join(&self.action)
            .map_err(|e| format!("invalid form action {}: {}", self.action, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(html: &str, action: &str) -> Option<HtmlForm> {
        FormReader::new().unwrap().find(html, action)
    }

    const PAGE: &str = r#"
<html><body>
  <form action="/search" method="get"><input name="q" value="x"></form>
  <form action="https://www.cityjet.com/book/go/" method="POST">
    <input type="hidden" name="SESSION_TOKEN" value="abc123">
    <input type="text" name="_from" value="">
    <input name="_auto_from">
    <input type="checkbox" name="newsletter" value="yes">
    <input type="checkbox" name="terms" checked>
    <input type="radio" name="cabin" value="eco" checked>
    <input type="radio" name="cabin" value="biz">
    <input type="text" name="locked" value="1" disabled>
    <select name="passengers">
      <option value="1">One</option>
      <option value="2" selected>Two</option>
    </select>
    <select name="lang"><option>EN</option><option>FR</option></select>
    <textarea name="note">hello</textarea>
    <input type="reset" name="clear" value="Clear">
    <input type="submit" name="go" value="Search">
    <input type="submit" name="other" value="Other">
  </form>
</body></html>"#;

    #[test]
    fn test_find_by_action() {
        let form = find(PAGE, "https://www.cityjet.com/book/go/").unwrap();
        assert_eq!(form.method(), FormMethod::Post);
        assert!(find(PAGE, "https://www.cityjet.com/other/").is_none());

        let search = find(PAGE, "/search").unwrap();
        assert_eq!(search.method(), FormMethod::Get);
        assert_eq!(search.fields(), &[("q".to_string(), "x".to_string())]);
    }

    #[test]
    fn test_reads_submittable_fields() {
        let form = find(PAGE, "https://www.cityjet.com/book/go/").unwrap();
        let fields: Vec<(&str, &str)> = form
            .fields()
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("SESSION_TOKEN", "abc123"),
                ("_from", ""),
                ("_auto_from", ""),
                ("terms", "on"),
                ("cabin", "eco"),
                ("passengers", "2"),
                ("lang", "EN"),
                ("note", "hello"),
                ("go", "Search"),
            ]
        );
    }

    #[test]
    fn test_merge_overrides_in_place() {
        let mut form = find(PAGE, "https://www.cityjet.com/book/go/").unwrap();
        form.merge([("_from", "LCY"), ("TRIP_TYPE", "O")]);

        assert_eq!(form.get("_from"), Some("LCY"));
        assert_eq!(form.get("SESSION_TOKEN"), Some("abc123"));
        assert_eq!(form.fields()[1], ("_from".to_string(), "LCY".to_string()));
        assert_eq!(
            form.fields().last(),
            Some(&("TRIP_TYPE".to_string(), "O".to_string()))
        );
    }

    #[test]
    fn test_target_url_resolves_relative_action() {
        let page = Url::parse("https://www.cityjet.com/en/home").unwrap();
        let search = find(PAGE, "/search").unwrap();
        assert_eq!(
            search.target_url(&page).unwrap().as_str(),
            "https://www.cityjet.com/search"
        );

        let book = find(PAGE, "https://www.cityjet.com/book/go/").unwrap();
        assert_eq!(
            book.target_url(&page).unwrap().as_str(),
            "https://www.cityjet.com/book/go/"
        );
    }

    #[test]
    fn test_button_is_default_submit() {
        let html = r#"<form action="/x" method="post">
            <input type="hidden" name="a" value="1">
            <button name="action" value="next">Next</button>
        </form>"#;
        let form = find(html, "/x").unwrap();
        assert_eq!(form.get("action"), Some("next"));
    }

    #[test]
    fn test_named_button_and_file_inputs_are_submitted() {
        let html = r#"<form action="/x" method="post">
            <input type="button" name="helper" value="Help">
            <input type="file" name="upload">
            <input type="reset" name="clear" value="Clear">
            <input type="image" name="map">
        </form>"#;
        let form = find(html, "/x").unwrap();
        assert_eq!(
            form.fields(),
            &[
                ("helper".to_string(), "Help".to_string()),
                ("upload".to_string(), String::new()),
                ("map".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_reader_is_reusable_across_pages() {
        let reader = FormReader::new().unwrap();
        let first = reader.find(PAGE, "/search").unwrap();
        let second = reader
            .find(r#"<form action="/search"><input name="q" value="y"></form>"#, "/search")
            .unwrap();
        assert_eq!(first.get("q"), Some("x"));
        assert_eq!(second.get("q"), Some("y"));
    }
}
