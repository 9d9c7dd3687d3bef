// Wire model for the booking portal's AJAX responses
use chrono::{Local, NaiveDate, TimeZone};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::LazyLock;

pub const UNKNOWN_FACILITY: &str = "Unknown facility";

static JSON_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/Date\((-?\d+)(?:[+-]\d{4})?\)/").unwrap());

// Response of the facility-list endpoint
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FacilityList {
    #[serde(default)]
    pub facilities: Vec<Facility>,
}

impl FacilityList {
    // Entries without an ID cannot be queried and are dropped
    pub fn bookable(&self) -> impl Iterator<Item = &Facility> {
        self.facilities.iter().filter(|f| !f.id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Facility {
    #[serde(rename = "ID", default, deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(
        rename = "Name",
        default = "unknown_facility",
        deserialize_with = "null_as_unknown"
    )]
    pub name: String,
}

impl Facility {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

fn unknown_facility() -> String {
    UNKNOWN_FACILITY.to_string()
}

// The portal sends explicit nulls for some entries; treat them like missing keys
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_unknown<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(unknown_facility))
}

// Response of the facility-availability endpoint
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AvailabilityPayload {
    #[serde(default)]
    pub availabilities: Vec<DaySlotGroup>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DaySlotGroup {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub booking_groups: Vec<BookingGroup>,
}

impl DaySlotGroup {
    pub fn calendar_date(&self) -> Option<NaiveDate> {
        parse_json_date(&self.date)
    }

    // `YYYY-MM-DD` in local time, or the raw vendor value when it is not a
    // `/Date(ms)/` string.
    pub fn date_label(&self) -> String {
        match self.calendar_date() {
            Some(date) => date.format("%Y-%m-%d").to_string(),
            None => self.date.clone(),
        }
    }

    // Spots that can actually be booked, in vendor order.
    pub fn open_spots(&self) -> impl Iterator<Item = &Spot> {
        self.booking_groups
            .iter()
            .flat_map(|group| group.available_spots.iter())
            .filter(|spot| !spot.is_disabled)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BookingGroup {
    #[serde(default)]
    pub available_spots: Vec<Spot>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Spot {
    #[serde(default)]
    pub time: SpotTime,
    #[serde(default)]
    pub duration: SpotDuration,
    #[serde(default)]
    pub is_disabled: bool,
}

impl Spot {
    pub fn new(hours: u32, minutes: u32, total_hours: f64) -> Self {
        Self {
            time: SpotTime { hours, minutes },
            duration: SpotDuration { total_hours },
            is_disabled: false,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.is_disabled = true;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpotTime {
    #[serde(default)]
    pub hours: u32,
    #[serde(default)]
    pub minutes: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpotDuration {
    #[serde(default = "one_hour")]
    pub total_hours: f64,
}

impl Default for SpotDuration {
    fn default() -> Self {
        Self { total_hours: 1.0 }
    }
}

fn one_hour() -> f64 {
    1.0
}

// Parses a vendor `/Date(<epoch-ms>)/` string into a calendar date in the
// local timezone. Timezone suffixes such as `/Date(ms+1000)/` are ignored.
pub fn parse_json_date(raw: &str) -> Option<NaiveDate> {
    let caps = JSON_DATE_RE.captures(raw)?;
    let millis: i64 = caps[1].parse().ok()?;
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.date_naive())
}
