// Scraping of hidden tokens and service identifiers out of rendered portal pages
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};

pub const TOKEN_FIELD: &str = "__RequestVerificationToken";

static TOKEN_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[name="__RequestVerificationToken"]"#).unwrap());
static SCRIPT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());
static GUID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""([a-f0-9-]{36})""#).unwrap());

#[derive(Error, Debug, PartialEq)]
pub enum ExtractionError {
    #[error("No anti-forgery token on page")]
    MissingToken,

    #[error("Service not found in page scripts: {0}")]
    ServiceNotFound(String),

    #[error("No duration IDs for {0} minute bookings")]
    DurationsNotFound(u32),
}

// Identifiers the availability endpoint needs to select a service and its durations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIds {
    pub service_id: String,
    pub duration_ids: Vec<String>,
}

impl Default for ServiceIds {
    // Captured from a live session; the portal may rotate these at any time
    fn default() -> Self {
        Self {
            service_id: "e413294c-507d-4653-b25e-c30c09be2e3f".to_string(),
            duration_ids: vec![
                "393bd548-77a3-42db-8b10-02580516a1d6".to_string(),
                "abfe26e9-3c74-4bf9-a82d-0ae8e99fd8d4".to_string(),
                "b2645b1b-0c84-40d5-b39f-87f93eb06d53".to_string(),
                "60887470-6f40-4743-833c-8b384b3e8df8".to_string(),
            ],
        }
    }
}

// Which service/duration entry to mine from the facility page
#[derive(Debug, Clone)]
pub struct ServiceSelector {
    pub service_name: String,
    pub duration_minutes: u32,
    pub fallback: ServiceIds,
}

impl Default for ServiceSelector {
    fn default() -> Self {
        Self {
            service_name: "Badminton Hire".to_string(),
            duration_minutes: 60,
            fallback: ServiceIds::default(),
        }
    }
}

// Pulls the hidden anti-forgery token out of a rendered page
pub fn extract_token(html: &str) -> Result<String, ExtractionError> {
    let document = Html::parse_document(html);
    document
        .select(&TOKEN_SELECTOR)
        .filter_map(|input| input.value().attr("value"))
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(ExtractionError::MissingToken)
}

// Service ID and duration IDs as found on a page; either half may be missing
pub type ScannedIds = (Option<String>, Vec<String>);

pub trait ServiceIdExtractor: Send + Sync {
    // Whatever the page exposes; Err only when there is nothing to scan
    fn scan(&self, html: &str) -> Result<ScannedIds, ExtractionError>;

    // Strict extraction, both halves required
    fn extract(&self, html: &str) -> Result<ServiceIds, ExtractionError>;

    // Last-known-good identifiers used when extraction fails
    fn fallback(&self) -> ServiceIds;

    // Each missing half is filled from the fallback on its own
    fn extract_or_fallback(&self, html: &str) -> ServiceIds {
        let fallback = self.fallback();
        let (service_id, duration_ids) = match self.scan(html) {
            Ok(scanned) => scanned,
            Err(e) => {
                warn!("Service ID extraction failed, using fallback identifiers: {}", e);
                return fallback;
            }
        };

        let service_id = service_id.unwrap_or_else(|| {
            warn!("Service ID missing from page, using fallback");
            fallback.service_id
        });
        let duration_ids = if duration_ids.is_empty() {
            warn!("Duration IDs missing from page, using fallback durations");
            fallback.duration_ids
        } else {
            duration_ids
        };
        ServiceIds {
            service_id,
            duration_ids,
        }
    }
}

// Mines the inline `services:` script block of a facility page
impl ServiceIdExtractor for ServiceSelector {
    fn scan(&self, html: &str) -> Result<ScannedIds, ExtractionError> {
        let document = Html::parse_document(html);
        let script = document
            .select(&SCRIPT_SELECTOR)
            .map(|el| el.text().collect::<String>())
            .find(|text| text.contains("services:") && text.contains(&self.service_name))
            .ok_or_else(|| ExtractionError::ServiceNotFound(self.service_name.clone()))?;

        let service_id = find_service_id(&script, &self.service_name);
        let duration_ids = find_duration_ids(&script, self.duration_minutes);
        debug!(
            "Extracted service {:?} with {} duration IDs",
            service_id,
            duration_ids.len()
        );
        Ok((service_id, duration_ids))
    }

    fn extract(&self, html: &str) -> Result<ServiceIds, ExtractionError> {
        match self.scan(html)? {
            (None, _) => Err(ExtractionError::ServiceNotFound(self.service_name.clone())),
            (Some(_), duration_ids) if duration_ids.is_empty() => {
                Err(ExtractionError::DurationsNotFound(self.duration_minutes))
            }
            (Some(service_id), duration_ids) => Ok(ServiceIds {
                service_id,
                duration_ids,
            }),
        }
    }

    fn fallback(&self) -> ServiceIds {
        self.fallback.clone()
    }
}

fn find_service_id(script: &str, service_name: &str) -> Option<String> {
    let pattern = format!(
        r#""ID":"([a-f0-9-]{{36}})"[^}}]*"Name":"{}""#,
        regex::escape(service_name)
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(script).map(|caps| caps[1].to_string())
}

fn find_duration_ids(script: &str, duration_minutes: u32) -> Vec<String> {
    let pattern = format!(
        r#""Duration":{}\.0[^}}]*"DurationIDs":\[([^\]]+)\]"#,
        duration_minutes
    );
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    re.captures(script)
        .map(|caps| {
            GUID_RE
                .captures_iter(&caps[1])
                .map(|id| id[1].to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE_ID: &str = "11111111-2222-3333-4444-555555555555";
    const DURATION_A: &str = "aaaaaaaa-0000-0000-0000-000000000001";
    const DURATION_B: &str = "bbbbbbbb-0000-0000-0000-000000000002";

    fn facility_page(script: &str) -> String {
        format!(
            r#"<html><body>
                <form><input type="hidden" name="__RequestVerificationToken" value="tok-123" /></form>
                <script>var x = 1;</script>
                <script>{}</script>
            </body></html>"#,
            script
        )
    }

    fn services_script() -> String {
        format!(
            r#"init({{ services: [{{"ID":"{SERVICE_ID}","Name":"Badminton Hire","Durations":[{{"Duration":30.0,"DurationIDs":["cccccccc-0000-0000-0000-000000000003"]}},{{"Duration":60.0,"DurationIDs":["{DURATION_A}","{DURATION_B}"]}}]}}] }});"#
        )
    }

    #[test]
    fn test_extract_token() {
        let html = facility_page("");
        assert_eq!(extract_token(&html), Ok("tok-123".to_string()));
    }

    #[test]
    fn test_extract_token_missing() {
        let html = "<html><body><form><input name=\"Username\"/></form></body></html>";
        assert_eq!(extract_token(html), Err(ExtractionError::MissingToken));
    }

    #[test]
    fn test_extract_service_ids() {
        let selector = ServiceSelector::default();
        let ids = selector.extract(&facility_page(&services_script())).unwrap();

        assert_eq!(ids.service_id, SERVICE_ID);
        assert_eq!(ids.duration_ids, vec![DURATION_A, DURATION_B]);
    }

    #[test]
    fn test_extract_other_duration() {
        let selector = ServiceSelector {
            duration_minutes: 30,
            ..ServiceSelector::default()
        };
        let ids = selector.extract(&facility_page(&services_script())).unwrap();

        assert_eq!(ids.duration_ids, vec!["cccccccc-0000-0000-0000-000000000003"]);
    }

    #[test]
    fn test_fallback_when_script_missing() {
        let selector = ServiceSelector::default();
        let html = facility_page("var unrelated = true;");

        assert!(matches!(
            selector.extract(&html),
            Err(ExtractionError::ServiceNotFound(_))
        ));
        assert_eq!(selector.extract_or_fallback(&html), ServiceIds::default());
    }

    #[test]
    fn test_fallback_durations_keep_scraped_service() {
        let selector = ServiceSelector {
            duration_minutes: 90,
            ..ServiceSelector::default()
        };
        let html = facility_page(&services_script());

        assert_eq!(
            selector.extract(&html),
            Err(ExtractionError::DurationsNotFound(90))
        );
        let ids = selector.extract_or_fallback(&html);
        assert_eq!(ids.service_id, SERVICE_ID);
        assert_eq!(ids.duration_ids, ServiceIds::default().duration_ids);
    }

    #[test]
    fn test_fallback_service_keeps_scraped_durations() {
        let selector = ServiceSelector::default();
        let script = format!(
            r#"init({{ services: [{{"Name":"Badminton Hire","Durations":[{{"Duration":60.0,"DurationIDs":["{DURATION_A}","{DURATION_B}"]}}]}}] }});"#
        );
        let html = facility_page(&script);

        assert_eq!(
            selector.scan(&html),
            Ok((None, vec![DURATION_A.to_string(), DURATION_B.to_string()]))
        );
        assert!(matches!(
            selector.extract(&html),
            Err(ExtractionError::ServiceNotFound(_))
        ));
        let ids = selector.extract_or_fallback(&html);
        assert_eq!(ids.service_id, ServiceIds::default().service_id);
        assert_eq!(ids.duration_ids, vec![DURATION_A, DURATION_B]);
    }

    #[test]
    fn test_service_name_is_escaped() {
        let script = r#"services: [{"ID":"11111111-2222-3333-4444-555555555555","Name":"Squash (Court)"}]"#;
        assert_eq!(
            find_service_id(script, "Squash (Court)"),
            Some(SERVICE_ID.to_string())
        );
        assert_eq!(find_service_id(script, "Badminton Hire"), None);
    }
}
