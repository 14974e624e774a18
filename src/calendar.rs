//! Major macro-event dates used by the news label.

use std::collections::{BTreeSet, HashSet};

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Source of "major event" calendar dates.
pub trait EventCalendar: Send + Sync {
  fn is_major_event(&self, date: NaiveDate) -> bool;
}

impl EventCalendar for HashSet<NaiveDate> {
  fn is_major_event(&self, date: NaiveDate) -> bool {
    self.contains(&date)
  }
}

impl EventCalendar for BTreeSet<NaiveDate> {
  fn is_major_event(&self, date: NaiveDate) -> bool {
    self.contains(&date)
  }
}

// ============================================================
// BUILT-IN DATES
// ============================================================

const FOMC: &[(i32, u32, u32)] = &[
  (2024, 1, 31),
  (2024, 3, 20),
  (2024, 5, 1),
  (2024, 6, 12),
  (2024, 7, 31),
  (2024, 9, 18),
  (2024, 11, 7),
  (2024, 12, 18),
  (2025, 1, 29),
  (2025, 3, 19),
  (2025, 5, 7),
  (2025, 6, 18),
  (2025, 7, 30),
  (2025, 9, 17),
  (2025, 10, 29),
  (2025, 12, 17),
  (2026, 1, 28),
];

const CPI: &[(i32, u32, u32)] = &[
  (2024, 1, 11),
  (2024, 2, 13),
  (2024, 3, 12),
  (2024, 4, 10),
  (2024, 5, 15),
  (2024, 6, 12),
  (2024, 7, 11),
  (2024, 8, 14),
  (2024, 9, 11),
  (2024, 10, 10),
  (2024, 11, 13),
  (2024, 12, 11),
  (2025, 1, 15),
  (2025, 2, 12),
  (2025, 3, 12),
  (2025, 4, 10),
  (2025, 5, 13),
  (2025, 6, 11),
  (2025, 7, 15),
  (2025, 8, 12),
  (2025, 9, 10),
  (2025, 10, 14),
  (2025, 11, 12),
  (2025, 12, 10),
];

/// Payrolls are released on the first Friday of the month
const NFP_YEARS: std::ops::RangeInclusive<i32> = 2024..=2026;

/// First Friday of `year`-`month`
pub fn first_friday(year: i32, month: u32) -> Option<NaiveDate> {
  let first = NaiveDate::from_ymd_opt(year, month, 1)?;
  let ahead = (Weekday::Fri.num_days_from_monday() + 7 - first.weekday().num_days_from_monday()) % 7;
  first.checked_add_signed(Duration::days(ahead as i64))
}

/// Fixed set of major macro-event dates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroCalendar {
  dates: BTreeSet<NaiveDate>,
}

impl MacroCalendar {
  /// No events: every day is a regular day
  pub fn empty() -> Self {
    Self::default()
  }

  /// FOMC decisions, CPI releases and non-farm payrolls, 2024 through 2026
  pub fn standard() -> Self {
    let listed = FOMC
      .iter()
      .chain(CPI)
      .filter_map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d));
    let payrolls = NFP_YEARS.flat_map(|y| (1..=12).filter_map(move |m| first_friday(y, m)));

    Self::from_dates(listed.chain(payrolls))
  }

  pub fn from_dates<I: IntoIterator<Item = NaiveDate>>(dates: I) -> Self {
    Self { dates: dates.into_iter().collect() }
  }

  pub fn len(&self) -> usize {
    self.dates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dates.is_empty()
  }

  pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
    self.dates.iter().copied()
  }
}

impl EventCalendar for MacroCalendar {
  fn is_major_event(&self, date: NaiveDate) -> bool {
    self.dates.contains(&date)
  }
}
