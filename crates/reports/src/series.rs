//! Time-bucketed series.
//!
//! Weeks are fixed 7-day slices of a calendar month: days 1-7 are week 1,
//! days 29-31 form a short week 5.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;

use eventcrm_campaigns::DeliveryLog;
use eventcrm_core::Purchase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeeklyPoint {
    pub week: u32,
    pub sent: u32,
    pub opened: u32,
    pub clicked: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthlyPoint {
    pub month: u32,
    pub new_customers: u32,
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map_or(0, |d| d.day())
}

fn week_in(at: DateTime<Utc>, year: i32, month: u32) -> Option<usize> {
    (at.year() == year && at.month() == month).then(|| ((at.day() - 1) / 7) as usize)
}

/// Sends, opens and clicks per week of `month`/`year`.
///
/// A send is counted on the day its row was created; opens and clicks on
/// the day the provider reported them. An invalid month yields no points.
pub fn weekly<'a>(
    rows: impl IntoIterator<Item = &'a DeliveryLog>,
    year: i32,
    month: u32,
) -> Vec<WeeklyPoint> {
    let weeks = days_in_month(year, month).div_ceil(7);
    let mut points: Vec<WeeklyPoint> = (1..=weeks)
        .map(|week| WeeklyPoint {
            week,
            sent: 0,
            opened: 0,
            clicked: 0,
        })
        .collect();

    for row in rows {
        if let Some(w) = week_in(row.created_at, year, month) {
            points[w].sent += 1;
        }
        if let Some(w) = row.opened_at.and_then(|at| week_in(at, year, month)) {
            points[w].opened += 1;
        }
        if let Some(w) = row.clicked_at.and_then(|at| week_in(at, year, month)) {
            points[w].clicked += 1;
        }
    }

    points
}

/// Customers whose first purchase falls in each month of `year`.
pub fn monthly_new_customers<'a>(
    histories: impl IntoIterator<Item = &'a [Purchase]>,
    year: i32,
) -> Vec<MonthlyPoint> {
    let mut counts = [0u32; 12];

    for history in histories {
        let first = history.iter().map(|p| p.purchased_at).min();
        if let Some(first) = first.filter(|at| at.year() == year) {
            counts[first.month0() as usize] += 1;
        }
    }

    counts
        .iter()
        .enumerate()
        .map(|(idx, n)| MonthlyPoint {
            month: idx as u32 + 1,
            new_customers: *n,
        })
        .collect()
}
