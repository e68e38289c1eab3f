//! Value coercion shared by every storage variant.
//!
//! Backends store loosely typed cells; these helpers turn them into the
//! fixed `Record` shape. Unreadable values degrade to defaults instead of
//! failing the whole load.

use crate::model::record::{Field, Record, SurrogateId};
use crate::repo::BackendKind;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::warn;
use std::collections::BTreeSet;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Coerces a year-like value to an integer; invalid or missing becomes `0`.
pub fn coerce_year(raw: &str) -> i32 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0;
    }
    if let Ok(year) = trimmed.parse::<i32>() {
        return year;
    }
    match trimmed.parse::<f64>() {
        Ok(value)
            if value.is_finite()
                && value.fract() == 0.0
                && value >= f64::from(i32::MIN)
                && value <= f64::from(i32::MAX) =>
        {
            value as i32
        }
        _ => 0,
    }
}

/// Coerces a date-like value to a calendar date; unparseable becomes `None`.
pub fn coerce_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
    {
        return Some(date);
    }
    if let Some(date_time) = DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
    {
        return Some(date_time.date());
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|date_time| date_time.date_naive())
}

/// Builds a record from per-column text, filling absent columns with defaults.
pub fn record_from_columns(
    surrogate_id: Option<SurrogateId>,
    mut column_text: impl FnMut(Field) -> Option<String>,
) -> Record {
    let mut text = |field: Field| column_text(field).unwrap_or_default();

    let mut record = Record::new(text(Field::GroupName).trim(), 0);
    record.surrogate_id = surrogate_id;
    for field in Field::ALL {
        match field {
            Field::GroupName => {}
            Field::Contact(role, part) => {
                *record.contacts.get_mut(role).part_mut(part) = text(field);
            }
            Field::LastFeePaidYear => record.last_fee_paid_year = coerce_year(&text(field)),
            Field::LastUpdated => record.last_updated = coerce_date(&text(field)),
        }
    }
    record
}

/// Drops rows without a group name and reports duplicated names.
///
/// Duplicates are kept in backend order; lookups resolve to the first one.
pub fn finalize_dataset(rows: Vec<Record>, backend: BackendKind) -> Vec<Record> {
    let total = rows.len();
    let records: Vec<Record> = rows
        .into_iter()
        .filter(|record| !record.group_name.is_empty())
        .collect();

    let skipped = total - records.len();
    if skipped > 0 {
        warn!(
            "event=dataset_normalize module=repo status=skipped backend={} unnamed_rows={skipped}",
            backend.as_str()
        );
    }

    let mut seen = BTreeSet::new();
    let duplicates = records
        .iter()
        .filter(|record| !seen.insert(record.group_name.as_str()))
        .count();
    if duplicates > 0 {
        warn!(
            "event=dataset_normalize module=repo status=duplicates backend={} duplicate_rows={duplicates}",
            backend.as_str()
        );
    }

    records
}
