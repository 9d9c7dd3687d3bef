// Availability aggregation
// Turns per-facility availability payloads into the summary, slot list and timetable views

use crate::portal::{AvailabilityPayload, Facility, Spot};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

pub const GRID_FIRST_HOUR: u32 = 8;
pub const GRID_LAST_HOUR: u32 = 22;
// Number of half-hour labels on the grid, both ends included
pub const GRID_SLOT_COUNT: u32 = (GRID_LAST_HOUR - GRID_FIRST_HOUR) * 2 + 1;

// One facility together with the outcome of its availability fetch
#[derive(Debug, Clone)]
pub struct FacilityAvailability {
    pub facility: Facility,
    // None when the fetch failed
    pub payload: Option<AvailabilityPayload>,
}

impl FacilityAvailability {
    pub fn new(facility: Facility, payload: Option<AvailabilityPayload>) -> Self {
        Self { facility, payload }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacilityStatus {
    Available {
        days_with_slots: usize,
        total_slots: usize,
    },
    Unavailable,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FacilitySummary {
    pub facility: Facility,
    pub status: FacilityStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryTable {
    pub rows: Vec<FacilitySummary>,
}

impl SummaryTable {
    pub fn available(&self) -> impl Iterator<Item = &FacilitySummary> {
        self.rows
            .iter()
            .filter(|row| matches!(row.status, FacilityStatus::Available { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.status == FacilityStatus::Failed)
            .count()
    }
}

// A bookable window with its deep link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLink {
    pub date_label: String,
    pub slot_label: String,
    pub booking_url: String,
}

// Facility names per (half-hour label, date) cell
#[derive(Debug, Clone)]
pub struct TimetableGrid {
    slot_labels: Vec<String>,
    dates: Vec<String>,
    cells: Vec<Vec<BTreeSet<String>>>,
}

impl TimetableGrid {
    pub fn new(dates: Vec<String>) -> Self {
        let slot_labels = half_hour_labels();
        let cells = vec![vec![BTreeSet::new(); dates.len()]; slot_labels.len()];
        Self {
            slot_labels,
            dates,
            cells,
        }
    }

    pub fn slot_labels(&self) -> &[String] {
        &self.slot_labels
    }

    pub fn dates(&self) -> &[String] {
        &self.dates
    }

    // Writes are dropped silently for labels or dates outside the grid
    fn insert(&mut self, slot_label: &str, date: &str, facility_name: &str) -> bool {
        let row = self.slot_labels.iter().position(|s| s == slot_label);
        let col = self.dates.iter().position(|d| d == date);
        match (row, col) {
            (Some(row), Some(col)) => {
                self.cells[row][col].insert(facility_name.to_string());
                true
            }
            _ => false,
        }
    }

    // Sorted, de-duplicated, `", "`-joined facility names; empty when no
    // facility covers the cell or the cell is outside the grid.
    pub fn cell(&self, slot_label: &str, date: &str) -> String {
        let row = self.slot_labels.iter().position(|s| s == slot_label);
        let col = self.dates.iter().position(|d| d == date);
        match (row, col) {
            (Some(row), Some(col)) => join_names(&self.cells[row][col]),
            _ => String::new(),
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = (&str, Vec<String>)> {
        self.slot_labels
            .iter()
            .zip(self.cells.iter())
            .map(|(label, row)| (label.as_str(), row.iter().map(join_names).collect()))
    }
}

fn join_names(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

// `08:00`, `08:30`, ... `22:00`.
pub fn half_hour_labels() -> Vec<String> {
    let mut labels = Vec::new();
    for hour in GRID_FIRST_HOUR..GRID_LAST_HOUR {
        labels.push(format!("{:02}:00", hour));
        labels.push(format!("{:02}:30", hour));
    }
    labels.push(format!("{:02}:00", GRID_LAST_HOUR));
    labels
}

// Display window `HH:MM-HH:MM`. The fractional part of the duration is
// carried into the hour at most once.
pub fn display_window(spot: &Spot) -> String {
    let start_hour = spot.time.hours;
    let start_minute = spot.time.minutes;
    let duration = spot.duration.total_hours;

    let mut end_hour = start_hour.saturating_add(duration.trunc() as u32);
    let mut end_minute = start_minute.saturating_add((duration.fract() * 60.0) as u32);
    if end_minute >= 60 {
        end_hour = end_hour.saturating_add(1);
        end_minute -= 60;
    }
    format!(
        "{:02}:{:02}-{:02}:{:02}",
        start_hour, start_minute, end_hour, end_minute
    )
}

// Half-hour labels covered by a spot, starting at its start time. The cell
// count is `duration * 2` truncated, never more than the grid holds.
pub fn covered_half_hours(spot: &Spot) -> Vec<String> {
    let count = ((spot.duration.total_hours * 2.0).max(0.0) as u32).min(GRID_SLOT_COUNT);
    (0..count)
        .map(|i| {
            let minutes = spot.time.minutes.saturating_add(i * 30);
            format!(
                "{:02}:{:02}",
                spot.time.hours.saturating_add(minutes / 60),
                minutes % 60
            )
        })
        .collect()
}

pub fn booking_url(base: &str, facility_id: &str, date_label: &str, spot: &Spot) -> String {
    format!(
        "{}?facilityId={}&arrivalDate={}T{:02}:{:02}:00.000Z",
        base, facility_id, date_label, spot.time.hours, spot.time.minutes
    )
}

pub fn summarize(results: &[FacilityAvailability]) -> SummaryTable {
    let rows = results
        .iter()
        .map(|result| {
            let status = match &result.payload {
                None => FacilityStatus::Failed,
                Some(payload) => count_slots(payload),
            };
            info!("{}: {:?}", result.facility.name, status);
            FacilitySummary {
                facility: result.facility.clone(),
                status,
            }
        })
        .collect();

    SummaryTable { rows }
}

fn count_slots(payload: &AvailabilityPayload) -> FacilityStatus {
    let mut days_with_slots = 0;
    let mut total_slots = 0;
    for day in &payload.availabilities {
        let open = day.open_spots().count();
        if open > 0 {
            days_with_slots += 1;
            total_slots += open;
        }
    }

    if total_slots == 0 {
        FacilityStatus::Unavailable
    } else {
        FacilityStatus::Available {
            days_with_slots,
            total_slots,
        }
    }
}

// Flattens a payload into bookable windows, in vendor order.
pub fn expand_slots(
    facility_id: &str,
    payload: &AvailabilityPayload,
    booking_base: &str,
) -> Vec<SlotLink> {
    payload
        .availabilities
        .iter()
        .flat_map(|day| {
            let date_label = day.date_label();
            day.open_spots()
                .map(|spot| SlotLink {
                    booking_url: booking_url(booking_base, facility_id, &date_label, spot),
                    slot_label: display_window(spot),
                    date_label: date_label.clone(),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

// Groups the expanded slots per day label, keeping days without slots so
// they can be reported as empty.
pub fn slots_by_day(payload: &AvailabilityPayload) -> Vec<(String, Vec<String>)> {
    payload
        .availabilities
        .iter()
        .map(|day| (day.date_label(), day.open_spots().map(display_window).collect()))
        .collect()
}

pub fn date_columns(start: NaiveDate, days_count: u32) -> Vec<String> {
    start
        .iter_days()
        .take(days_count as usize)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect()
}

pub fn build_grid(
    results: &[FacilityAvailability],
    start: NaiveDate,
    days_count: u32,
) -> TimetableGrid {
    let mut grid = TimetableGrid::new(date_columns(start, days_count));
    let mut dropped: HashMap<&str, usize> = HashMap::new();

    for result in results {
        let Some(payload) = &result.payload else {
            continue;
        };
        for day in &payload.availabilities {
            let date_label = day.date_label();
            for spot in day.open_spots() {
                for label in covered_half_hours(spot) {
                    if !grid.insert(&label, &date_label, &result.facility.name) {
                        *dropped.entry(result.facility.name.as_str()).or_default() += 1;
                    }
                }
            }
        }
    }

    for (name, count) in dropped {
        debug!("{} cells of {} fell outside the timetable", count, name);
    }
    grid
}
