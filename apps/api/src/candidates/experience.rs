//! Experience duration in whole months.
//!
//! Durations are written when an interval is stored, recomputed on read for
//! open intervals, and repaired by the backfill job. A missing duration is a
//! data-quality fault, never zero experience.

use chrono::{Datelike, NaiveDate};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::candidate::ExperienceIntervalRow;

/// Whole calendar months from `start` to `end`; a partial trailing month does
/// not count. Never negative.
pub fn months_between(start: NaiveDate, end: NaiveDate) -> i32 {
    let mut months = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
    if end.day() < start.day() {
        months -= 1;
    }
    months.max(0)
}

/// Duration of an interval as of `today`. Open intervals run through `today`.
pub fn interval_months(start: NaiveDate, end: Option<NaiveDate>, today: NaiveDate) -> i32 {
    months_between(start, end.unwrap_or(today))
}

pub fn validate_interval(start: NaiveDate, end: Option<NaiveDate>) -> Result<(), AppError> {
    match end {
        Some(end) if end < start => Err(AppError::Validation(format!(
            "Experience interval ends ({end}) before it starts ({start})"
        ))),
        _ => Ok(()),
    }
}

/// Months credited for one stored interval.
pub fn effective_months(interval: &ExperienceIntervalRow, today: NaiveDate) -> i32 {
    match (interval.end_date, interval.duration_months) {
        (None, _) => interval_months(interval.start_date, None, today),
        (Some(_), Some(stored)) => stored,
        (Some(end), None) => {
            warn!(
                "Experience interval {} of candidate {} has no stored duration; recomputing from dates",
                interval.id, interval.candidate_id
            );
            months_between(interval.start_date, end)
        }
    }
}

pub fn total_experience_months(intervals: &[ExperienceIntervalRow], today: NaiveDate) -> i32 {
    intervals.iter().map(|i| effective_months(i, today)).sum()
}

pub fn months_to_years(months: i32) -> f64 {
    f64::from(months) / 12.0
}

/// Intervals whose stored duration is missing or stale as of `today`.
pub fn stale_durations(intervals: &[ExperienceIntervalRow], today: NaiveDate) -> Vec<(Uuid, i32)> {
    intervals
        .iter()
        .filter_map(|i| {
            let fresh = interval_months(i.start_date, i.end_date, today);
            (i.duration_months != Some(fresh)).then_some((i.id, fresh))
        })
        .collect()
}
