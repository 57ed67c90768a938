//! Current-streak computation: starting from the period containing `as_of`,
//! walk backward one period at a time and count consecutive completed
//! periods. The first missing period ends the streak; there is no
//! "best streak" memory.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};

use crate::habit::{Completion, Frequency};
use crate::period;

/// Count the consecutive-period streak ending at `as_of`. Only rows with
/// `completed = true` participate; an empty history yields 0.
pub fn streak(frequency: Frequency, completions: &[Completion], as_of: NaiveDate) -> u32 {
    let completed: HashSet<&str> = completions
        .iter()
        .filter(|c| c.completed)
        .filter(|c| {
            // Defensive parsing for daily rows only; weekly/monthly walks are
            // exact string-key membership.
            frequency != Frequency::Daily
                || NaiveDate::parse_from_str(&c.period_key, "%Y-%m-%d").is_ok()
        })
        .map(|c| c.period_key.as_str())
        .collect();

    if completed.is_empty() {
        return 0;
    }

    let mut count = 0;
    match frequency {
        Frequency::Daily => {
            let mut cursor = as_of;
            while completed.contains(period_daily(cursor).as_str()) {
                count += 1;
                match cursor.pred_opt() {
                    Some(prev) => cursor = prev,
                    None => break,
                }
            }
        }
        Frequency::Weekly => {
            let iso = as_of.iso_week();
            let (mut year, mut week) = (iso.year(), iso.week());
            while completed.contains(period::week_key(year, week).as_str()) {
                count += 1;
                (year, week) = period::previous_week(year, week);
            }
        }
        Frequency::Monthly => {
            let (mut year, mut month) = (as_of.year(), as_of.month());
            while completed.contains(period::month_key(year, month).as_str()) {
                count += 1;
                (year, month) = period::previous_month(year, month);
            }
        }
    }
    count
}

fn period_daily(date: NaiveDate) -> String {
    period::period_key(date, Frequency::Daily)
}
