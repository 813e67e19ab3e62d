//! Display helpers for backend timestamps.
//!
//! The backend is inconsistent: detections and appointments carry naive ISO
//! datetimes (`2024-01-20T11:00:00`, sometimes with fractional seconds),
//! command stamps are RFC 3339, and plate images carry the compact
//! `YYYYMMDD_HHMMSS` form lifted from their filenames. All three parse here;
//! anything else falls back to the raw string.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

pub fn parse_timestamp(s: &str) -> Option<PrimitiveDateTime> {
    if let Ok(odt) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(PrimitiveDateTime::new(odt.date(), odt.time()));
    }
    let naive =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]");
    if let Ok(dt) = PrimitiveDateTime::parse(s, &naive) {
        return Some(dt);
    }
    let compact = format_description!("[year][month][day]_[hour][minute][second]");
    PrimitiveDateTime::parse(s, &compact).ok()
}

/// `YYYY-MM-DD HH:MM:SS`, or the input unchanged if it does not parse.
pub fn display_datetime(s: &str) -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    match parse_timestamp(s).and_then(|dt| dt.format(&fmt).ok()) {
        Some(out) => out,
        None => s.to_string(),
    }
}

/// Time-of-day only (`HH:MM:SS`), used for same-day appointments.
pub fn display_time(s: &str) -> String {
    let fmt = format_description!("[hour]:[minute]:[second]");
    match parse_timestamp(s).and_then(|dt| dt.format(&fmt).ok()) {
        Some(out) => out,
        None => s.to_string(),
    }
}
