// Authenticated session against the PerfectMind booking portal
// Holds the cookie jar and performs the login, facility-list and availability calls

use crate::extract::{self, ServiceIdExtractor, ServiceIds, ServiceSelector, TOKEN_FIELD};
use crate::portal::{AvailabilityPayload, FacilityList};
use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveTime, TimeZone};
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    #[error("Network error: {0}")]
    TransportError(String),

    #[error("HTTP {status_code} from {url}")]
    HttpStatus { status_code: u16, url: String },

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Missing anti-forgery token on {0}")]
    MissingToken(String),
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        SessionError::TransportError(e.to_string())
    }
}

// Portal endpoints and the fixed identifiers of the facility map widget
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub org_id: String,
    pub calendar_id: String,
    pub widget_id: String,
    pub map_id: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub request_delay_ms: u64,
    pub service: ServiceSelector,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://unimelb.perfectmind.com".to_string(),
            org_id: "32617".to_string(),
            calendar_id: "bce15730-1f38-4e5c-889c-856322a7f877".to_string(),
            widget_id: "15f6af07-39c5-473e-b053-96653f77a406".to_string(),
            map_id: "7d8b8d20-b7cf-43ac-8167-0738142baff3".to_string(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            timeout_ms: 30_000,
            request_delay_ms: 300,
            service: ServiceSelector::default(),
        }
    }
}

impl ClientConfig {
    pub fn login_url(&self) -> String {
        format!("{}/SocialSite/MemberRegistration/MemberSignIn", self.base_url)
    }

    pub fn map_url(&self) -> String {
        format!("{}/{}/Clients/BookMe4FacilityMap/Map", self.base_url, self.org_id)
    }

    pub fn facilities_url(&self) -> String {
        format!(
            "{}/{}/Clients/BookMe4FacilityMap/GetFacilities",
            self.base_url, self.org_id
        )
    }

    // Facility detail page; also the base of booking deep links.
    pub fn facility_page_url(&self) -> String {
        format!(
            "{}/{}/Clients/BookMe4LandingPages/Facility",
            self.base_url, self.org_id
        )
    }

    pub fn availability_url(&self) -> String {
        format!(
            "{}/{}/Clients/BookMe4LandingPages/FacilityAvailability",
            self.base_url, self.org_id
        )
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    fn landing_page_back_url(&self) -> String {
        format!(
            "{}?mapId={}&widgetId={}&calendarId={}",
            self.map_url(),
            self.map_id,
            self.widget_id,
            self.calendar_id
        )
    }
}

// The three portal calls a query needs
#[async_trait]
pub trait PortalClient: Send + Sync {
    // Logs in; `false` on bad credentials or any transport failure.
    async fn authenticate(&mut self, username: &str, password: &str) -> bool;

    fn is_authenticated(&self) -> bool;

    async fn list_facilities(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FacilityList, SessionError>;

    async fn fetch_availability(
        &self,
        facility_id: &str,
        start: NaiveDate,
        days_count: u32,
    ) -> Result<AvailabilityPayload, SessionError>;
}

pub struct SessionClient {
    http: Client,
    config: ClientConfig,
    authenticated: bool,
}

impl SessionClient {
    pub fn new(config: ClientConfig) -> Result<Self, SessionError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| SessionError::TransportError(e.to_string()))?,
        );
        headers.insert(
            ORIGIN,
            HeaderValue::from_str(&config.base_url)
                .map_err(|e| SessionError::TransportError(e.to_string()))?,
        );
        headers.insert(
            REFERER,
            HeaderValue::from_str(&config.map_url())
                .map_err(|e| SessionError::TransportError(e.to_string()))?,
        );

        let http = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            http,
            config,
            authenticated: false,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // Same as `authenticate` but keeps the reason a login failed
    pub async fn try_authenticate(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<(), SessionError> {
        let login_url = self.config.login_url();
        let page = self.get_text(self.http.get(&login_url), &login_url).await?;
        let token = extract::extract_token(&page)
            .map_err(|_| SessionError::AuthFailure("login page has no anti-forgery token".into()))?;

        let form = [
            ("Username", username),
            ("Password", password),
            (TOKEN_FIELD, token.as_str()),
        ];
        let body = self
            .get_text(self.http.post(&login_url).form(&form), &login_url)
            .await?;

        if !has_sign_out(&body) {
            return Err(SessionError::AuthFailure(
                "no sign-out link after login".into(),
            ));
        }
        self.authenticated = true;
        Ok(())
    }

    fn ensure_authenticated(&self) -> Result<(), SessionError> {
        if self.authenticated {
            Ok(())
        } else {
            Err(SessionError::NotAuthenticated)
        }
    }

    // Token of the facility map page; the facility list tolerates an empty one
    async fn map_token(&self) -> Result<String, SessionError> {
        let url = self.config.map_url();
        let page = self.get_text(self.http.get(&url), &url).await?;
        Ok(extract::extract_token(&page).unwrap_or_else(|e| {
            warn!("{} on facility map page, continuing without it", e);
            String::new()
        }))
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, SessionError> {
        debug!("Requesting {}", url);
        let response = request.send().await.map_err(|e| {
            warn!("Request to {} failed: {}", url, e);
            SessionError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!("HTTP {} from {}", status, url);
            return Err(SessionError::HttpStatus {
                status_code: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn get_text(&self, request: RequestBuilder, url: &str) -> Result<String, SessionError> {
        Ok(self.send(request, url).await?.text().await?)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        url: &str,
    ) -> Result<T, SessionError> {
        let body = self
            .get_text(request.header("X-Requested-With", "XMLHttpRequest"), url)
            .await?;
        serde_json::from_str(&body).map_err(|e| SessionError::JsonParseError(e.to_string()))
    }
}

#[async_trait]
impl PortalClient for SessionClient {
    async fn authenticate(&mut self, username: &str, password: &str) -> bool {
        match self.try_authenticate(username, password).await {
            Ok(()) => {
                info!("Logged in to {}", self.config.base_url);
                true
            }
            Err(e) => {
                warn!("Login failed: {}", e);
                false
            }
        }
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    async fn list_facilities(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FacilityList, SessionError> {
        self.ensure_authenticated()?;
        let token = self.map_token().await?;

        let form = facilities_form(&self.config, start, end, &token);
        let url = self.config.facilities_url();
        let list: FacilityList = self.post_json(self.http.post(&url).form(&form), &url).await?;
        info!("Portal returned {} facilities", list.facilities.len());
        Ok(list)
    }

    async fn fetch_availability(
        &self,
        facility_id: &str,
        start: NaiveDate,
        days_count: u32,
    ) -> Result<AvailabilityPayload, SessionError> {
        self.ensure_authenticated()?;

        // Tokens and service IDs are re-derived from a fresh detail page every time
        let arrival = format!("{}T14:00:00.000Z", start.format("%Y-%m-%d"));
        let back_url = self.config.landing_page_back_url();
        let page_request = self.http.get(self.config.facility_page_url()).query(&[
            ("facilityId", facility_id),
            ("widgetId", self.config.widget_id.as_str()),
            ("calendarId", self.config.calendar_id.as_str()),
            ("arrivalDate", arrival.as_str()),
            ("landingPageBackUrl", back_url.as_str()),
        ]);
        let page_url = self.config.facility_page_url();
        let page = self.send(page_request, &page_url).await?;
        let referer = page.url().to_string();
        let html = page.text().await?;

        let token =
            extract::extract_token(&html).map_err(|_| SessionError::MissingToken(referer.clone()))?;
        let ids = self.config.service.extract_or_fallback(&html);

        let form = availability_form(&self.config, facility_id, start, days_count, &ids, &token);
        let url = self.config.availability_url();
        let request = self.http.post(&url).header(REFERER, referer).form(&form);
        self.post_json(request, &url).await
    }
}

// The portal's page chrome only renders a sign-out link for logged-in members.
pub fn has_sign_out(body: &str) -> bool {
    body.contains("SignOut") || body.contains("signout")
}

// Local-time epoch milliseconds of `date` at `hour:minute`, as the portal
// expects for its range filters.
pub fn date_to_ticks(date: NaiveDate, hour: u32, minute: u32) -> i64 {
    let naive = date.and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default());
    Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
        .timestamp_millis()
}

fn facilities_form(
    config: &ClientConfig,
    start: NaiveDate,
    end: NaiveDate,
    token: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("take", "10000".to_string()),
        ("skip", "0".to_string()),
        ("page", "1".to_string()),
        ("pageSize", "10000".to_string()),
        ("StartDate", start.format("%Y%m%d").to_string()),
        ("EndDate", end.format("%Y%m%d").to_string()),
        ("StartTimeInTicks", date_to_ticks(start, 0, 0).to_string()),
        ("EndTimeInTicks", date_to_ticks(end, 23, 59).to_string()),
        ("ShouldCheckAvailability", "true".to_string()),
        ("calendarId", config.calendar_id.clone()),
        ("widgetId", config.widget_id.clone()),
        ("mapId", config.map_id.clone()),
        ("filtersLoaded", "false".to_string()),
        (TOKEN_FIELD, token.to_string()),
    ]
}

// Duration IDs repeat the same key, once per ID, after the fixed fields
fn availability_form(
    config: &ClientConfig,
    facility_id: &str,
    start: NaiveDate,
    days_count: u32,
    ids: &ServiceIds,
    token: &str,
) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("facilityId", facility_id.to_string()),
        ("date", start.format("%Y-%m-%d").to_string()),
        ("daysCount", days_count.to_string()),
        ("duration", config.service.duration_minutes.to_string()),
        ("serviceId", ids.service_id.clone()),
        (TOKEN_FIELD, token.to_string()),
    ];
    form.extend(
        ids.duration_ids
            .iter()
            .map(|id| ("durationIds[]", id.clone())),
    );
    form
}


#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_endpoint_urls() {
        let config = ClientConfig {
            base_url: "https://portal.example".to_string(),
            org_id: "42".to_string(),
            ..ClientConfig::default()
        };

        assert_eq!(
            config.login_url(),
            "https://portal.example/SocialSite/MemberRegistration/MemberSignIn"
        );
        assert_eq!(
            config.facilities_url(),
            "https://portal.example/42/Clients/BookMe4FacilityMap/GetFacilities"
        );
        assert_eq!(
            config.availability_url(),
            "https://portal.example/42/Clients/BookMe4LandingPages/FacilityAvailability"
        );
        assert!(config
            .landing_page_back_url()
            .starts_with("https://portal.example/42/Clients/BookMe4FacilityMap/Map?mapId="));
    }

    #[test]
    fn test_date_to_ticks_spans_the_day() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();
        let start = date_to_ticks(date, 0, 0);
        let end = date_to_ticks(date, 23, 59);

        let expected = Local
            .from_local_datetime(&date.and_hms_opt(0, 0, 0).unwrap())
            .earliest()
            .unwrap()
            .timestamp_millis();
        assert_eq!(start, expected);
        assert!(end > start);
        assert!(end - start <= (24 * 60 - 1) * 60_000 + 3_600_000);
    }

    #[test]
    fn test_facilities_form_fields() {
        let config = ClientConfig::default();
        let start = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let form = facilities_form(&config, start, end, "tok");

        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("StartDate"), Some("20250609"));
        assert_eq!(get("EndDate"), Some("20250615"));
        assert_eq!(get("mapId"), Some(config.map_id.as_str()));
        assert_eq!(get(TOKEN_FIELD), Some("tok"));
        assert_eq!(
            get("EndTimeInTicks"),
            Some(date_to_ticks(end, 23, 59).to_string().as_str())
        );
    }

    #[test]
    fn test_availability_form_repeats_duration_ids() {
        let config = ClientConfig::default();
        let ids = ServiceIds {
            service_id: "svc".to_string(),
            duration_ids: vec!["d-1".to_string(), "d-2".to_string(), "d-3".to_string()],
        };
        let start = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();

        let form = availability_form(&config, "f-1", start, 7, &ids, "tok");

        let expected: Vec<(&str, String)> = vec![
            ("facilityId", "f-1".to_string()),
            ("date", "2025-06-09".to_string()),
            ("daysCount", "7".to_string()),
            ("duration", "60".to_string()),
            ("serviceId", "svc".to_string()),
            (TOKEN_FIELD, "tok".to_string()),
            ("durationIds[]", "d-1".to_string()),
            ("durationIds[]", "d-2".to_string()),
            ("durationIds[]", "d-3".to_string()),
        ];
        assert_eq!(form, expected);
    }

    #[test_case("<a href=\"/SignOut\">Sign out</a>", true; "#1 camel case link")]
    #[test_case("<a href=\"/account/signout\">x</a>", true; "#2 lower case link")]
    #[test_case("<form>Invalid username or password</form>", false; "#3 login form again")]
    fn test_sign_out_marker(body: &str, expected: bool) {
        assert_eq!(has_sign_out(body), expected);
    }

    #[tokio::test]
    async fn test_calls_require_authentication() {
        let client = SessionClient::new(ClientConfig::default()).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();

        assert!(!client.is_authenticated());
        assert!(matches!(
            client.list_facilities(date, date).await,
            Err(SessionError::NotAuthenticated)
        ));
        assert!(matches!(
            client.fetch_availability("f-1", date, 1).await,
            Err(SessionError::NotAuthenticated)
        ));
    }
}
