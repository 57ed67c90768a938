//! Canonical period keys: the join key between a habit's frequency and its
//! completion rows. Daily keys are `YYYY-MM-DD`, weekly keys are ISO-8601
//! `YYYY-Www` (Thursday-anchored), monthly keys are `YYYY-MM`.
//!
//! The calendar iterators used for rendering share this module's boundary
//! logic so that UI highlighting can never drift from stored keys.

use chrono::{Datelike, Local, NaiveDate};

use crate::habit::Frequency;

/// Map a date to its canonical period key for the given frequency.
/// Pure and total: every valid `NaiveDate` has a key.
pub fn period_key(date: NaiveDate, frequency: Frequency) -> String {
    match frequency {
        Frequency::Daily => date.format("%Y-%m-%d").to_string(),
        Frequency::Weekly => {
            let week = date.iso_week();
            week_key(week.year(), week.week())
        }
        Frequency::Monthly => month_key(date.year(), date.month()),
    }
}

pub fn week_key(iso_year: i32, week: u32) -> String {
    format!("{iso_year}-W{week:02}")
}

pub fn month_key(year: i32, month: u32) -> String {
    format!("{year}-{month:02}")
}

/// Number of ISO weeks in an ISO year (52 or 53). Dec 28 always falls in the
/// last ISO week of its year, unlike Dec 31 which can belong to W01 of the
/// next one.
pub fn weeks_in_iso_year(iso_year: i32) -> u32 {
    NaiveDate::from_ymd_opt(iso_year, 12, 28)
        .map(|d| d.iso_week().week())
        .unwrap_or(52)
}

/// Step one ISO week backward, rolling into the previous ISO year's final
/// week when needed.
pub fn previous_week(iso_year: i32, week: u32) -> (i32, u32) {
    if week > 1 {
        (iso_year, week - 1)
    } else {
        (iso_year - 1, weeks_in_iso_year(iso_year - 1))
    }
}

/// Step one calendar month backward.
pub fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month > 1 {
        (year, month - 1)
    } else {
        (year - 1, 12)
    }
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_y, next_m) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_y, next_m, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(30)
}

/// The seven dates of the ISO week containing `date`, Monday first, as
/// `YYYY-MM-DD` strings. The iterator is cheap to clone and restart.
pub fn week_dates(date: NaiveDate) -> WeekDates {
    let monday = date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64);
    WeekDates { monday, offset: 0 }
}

/// Every date of the calendar month containing `date`, in order.
pub fn month_dates(date: NaiveDate) -> MonthDates {
    MonthDates {
        year: date.year(),
        month: date.month(),
        day: 1,
        last: days_in_month(date.year(), date.month()),
    }
}

pub fn current_week_dates() -> WeekDates {
    week_dates(Local::now().date_naive())
}

pub fn current_month_dates() -> MonthDates {
    month_dates(Local::now().date_naive())
}

#[derive(Clone, Debug)]
pub struct WeekDates {
    monday: NaiveDate,
    offset: u32,
}

impl Iterator for WeekDates {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.offset >= 7 {
            return None;
        }
        let day = self.monday + chrono::Duration::days(self.offset as i64);
        self.offset += 1;
        Some(day.format("%Y-%m-%d").to_string())
    }
}

#[derive(Clone, Debug)]
pub struct MonthDates {
    year: i32,
    month: u32,
    day: u32,
    last: u32,
}

impl Iterator for MonthDates {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.day > self.last {
            return None;
        }
        let out = format!("{}-{:02}-{:02}", self.year, self.month, self.day);
        self.day += 1;
        Some(out)
    }
}
