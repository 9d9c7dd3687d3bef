// Query orchestration
// One facility-list call, then one throttled availability call per facility

use crate::aggregate::{self, FacilityAvailability, SummaryTable, TimetableGrid};
use crate::portal::Facility;
use crate::session::{PortalClient, SessionError};
use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Invalid date (expected YYYYMMDD): {0}")]
    InvalidDate(String),

    #[error("Start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl QueryRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, QueryError> {
        if start > end {
            return Err(QueryError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    // Parses two compact `YYYYMMDD` dates.
    pub fn parse_compact(start: &str, end: &str) -> Result<Self, QueryError> {
        Self::new(parse_compact_date(start)?, parse_compact_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    // Inclusive of both ends
    pub fn days_count(&self) -> u32 {
        (self.end - self.start).num_days() as u32 + 1
    }
}

pub fn parse_compact_date(raw: &str) -> Result<NaiveDate, QueryError> {
    let raw = raw.trim();
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(QueryError::InvalidDate(raw.to_string()));
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d").map_err(|_| QueryError::InvalidDate(raw.to_string()))
}

// Everything a presentation layer needs from one search
#[derive(Debug, Clone)]
pub struct QueryReport {
    pub range: QueryRange,
    pub results: Vec<FacilityAvailability>,
    pub summary: SummaryTable,
    pub grid: TimetableGrid,
}

// Runs one search over `range` with an already authenticated portal client.
//
// Facility list failures abort the query. A failed availability fetch only
// marks that facility as failed; the remaining facilities are still queried.
pub async fn run_query<P: PortalClient + ?Sized>(
    portal: &P,
    range: QueryRange,
    request_delay: Duration,
) -> Result<QueryReport, QueryError> {
    if !portal.is_authenticated() {
        return Err(SessionError::NotAuthenticated.into());
    }

    let list = portal.list_facilities(range.start(), range.end()).await?;
    let facilities: Vec<Facility> = list.bookable().cloned().collect();
    info!(
        "Querying {} facilities from {} for {} days",
        facilities.len(),
        range.start(),
        range.days_count()
    );

    let mut results = Vec::with_capacity(facilities.len());
    for (i, facility) in facilities.into_iter().enumerate() {
        if i > 0 && !request_delay.is_zero() {
            tokio::time::sleep(request_delay).await;
        }

        let payload = match portal
            .fetch_availability(&facility.id, range.start(), range.days_count())
            .await
        {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!("Availability query for {} failed: {}", facility.name, e);
                None
            }
        };
        results.push(FacilityAvailability::new(facility, payload));
    }

    let summary = aggregate::summarize(&results);
    let grid = aggregate::build_grid(&results, range.start(), range.days_count());

    Ok(QueryReport {
        range,
        results,
        summary,
        grid,
    })
}
