// Plain-text rendering of a query report
use crate::aggregate::{self, FacilityStatus, SummaryTable, TimetableGrid};
use crate::query::QueryReport;
use std::fmt::Write;

pub fn render_summary(summary: &SummaryTable) -> String {
    let mut out = String::new();
    let width = summary
        .rows
        .iter()
        .map(|row| row.facility.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(8);

    for row in &summary.rows {
        let status = match row.status {
            FacilityStatus::Available {
                days_with_slots,
                total_slots,
            } => format!(
                "available: {} day(s), {} slot(s)",
                days_with_slots, total_slots
            ),
            FacilityStatus::Unavailable => "no availability".to_string(),
            FacilityStatus::Failed => "query failed".to_string(),
        };
        let _ = writeln!(out, "{:<width$}  {}", row.facility.name, status, width = width);
    }
    out
}

pub fn render_slots(report: &QueryReport, booking_base: &str) -> String {
    let mut out = String::new();
    for row in report.summary.available() {
        let Some(payload) = report
            .results
            .iter()
            .find(|r| r.facility.id == row.facility.id)
            .and_then(|r| r.payload.as_ref())
        else {
            continue;
        };

        let _ = writeln!(out, "{}", row.facility.name);
        let links = aggregate::expand_slots(&row.facility.id, payload, booking_base);
        for (date_label, windows) in aggregate::slots_by_day(payload) {
            if windows.is_empty() {
                let _ = writeln!(out, "  {}: no slots", date_label);
                continue;
            }
            let _ = writeln!(out, "  {}:", date_label);
            for link in links.iter().filter(|l| l.date_label == date_label) {
                let _ = writeln!(out, "    {}  {}", link.slot_label, link.booking_url);
            }
        }
    }
    out
}

pub fn render_grid(grid: &TimetableGrid) -> String {
    let mut out = String::new();
    let _ = write!(out, "{:<5}", "");
    for date in grid.dates() {
        let _ = write!(out, " | {:<24}", date);
    }
    out.push('\n');

    for (label, cells) in grid.rows() {
        let _ = write!(out, "{:<5}", label);
        for cell in cells {
            let _ = write!(out, " | {:<24}", cell);
        }
        out.push('\n');
    }
    out
}
