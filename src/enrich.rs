//! Setup enrichment
//!
//! Joins raw setups with zone context, trading session, news regime and
//! calendar fields, and threads a running P&L through them in chronological
//! order. Raw setup fields are never modified.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::{
  calendar::EventCalendar,
  detectors::{helpers::quantile, Setup, Zone, ZoneClass, ZoneMatch, ZoneMatcher},
  Direction, OHLCV,
};

/// Daily ranges above this quantile are high-volatility days
pub const HIGH_VOLATILITY_QUANTILE: f64 = 0.85;

// ============================================================
// LABELS
// ============================================================

/// Trading session by hour of day, in the series' reference time zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Session {
  Asian,
  London,
  NewYork,
  OffHours,
}

impl Session {
  pub fn from_hour(hour: u32) -> Self {
    match hour {
      0..=7 => Session::Asian,
      8..=12 => Session::London,
      13..=20 => Session::NewYork,
      _ => Session::OffHours,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Session::Asian => "Asian",
      Session::London => "London",
      Session::NewYork => "New York",
      Session::OffHours => "Off-Hours",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NewsLabel {
  MajorEvent,
  HighVolatility,
  Normal,
}

impl NewsLabel {
  pub fn as_str(self) -> &'static str {
    match self {
      NewsLabel::MajorEvent => "Major Event",
      NewsLabel::HighVolatility => "High Volatility",
      NewsLabel::Normal => "Normal",
    }
  }
}

/// Whether C1's own color agrees with the breakout direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Alignment {
  Aligned,
  Counter,
}

impl Alignment {
  pub fn as_str(self) -> &'static str {
    match self {
      Alignment::Aligned => "Aligned",
      Alignment::Counter => "Counter",
    }
  }
}

/// Trade direction relative to the zone the entry sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ZoneAlignment {
  /// Long at demand or short at supply
  WithZone,
  /// Long at supply or short at demand
  AgainstZone,
  Neutral,
  Contested,
}

impl ZoneAlignment {
  pub fn of(class: ZoneClass, direction: Direction) -> Self {
    match (class, direction) {
      (ZoneClass::Demand, Direction::Long) | (ZoneClass::Supply, Direction::Short) => {
        ZoneAlignment::WithZone
      },
      (ZoneClass::Demand, Direction::Short) | (ZoneClass::Supply, Direction::Long) => {
        ZoneAlignment::AgainstZone
      },
      (ZoneClass::Neutral, _) => ZoneAlignment::Neutral,
      (ZoneClass::Contested, _) => ZoneAlignment::Contested,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      ZoneAlignment::WithZone => "With Zone",
      ZoneAlignment::AgainstZone => "Against Zone",
      ZoneAlignment::Neutral => "Neutral",
      ZoneAlignment::Contested => "Contested",
    }
  }
}

/// C3 breakout margin in R, right-closed bins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BreakoutBand {
  UpToQuarter,
  QuarterToHalf,
  HalfToOne,
  OneToOneHalf,
  AboveOneHalf,
}

impl BreakoutBand {
  pub fn from_r(r: f64) -> Self {
    match r {
      r if r <= 0.25 => BreakoutBand::UpToQuarter,
      r if r <= 0.5 => BreakoutBand::QuarterToHalf,
      r if r <= 1.0 => BreakoutBand::HalfToOne,
      r if r <= 1.5 => BreakoutBand::OneToOneHalf,
      _ => BreakoutBand::AboveOneHalf,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      BreakoutBand::UpToQuarter => "0-0.25R",
      BreakoutBand::QuarterToHalf => "0.25-0.5R",
      BreakoutBand::HalfToOne => "0.5-1.0R",
      BreakoutBand::OneToOneHalf => "1.0-1.5R",
      BreakoutBand::AboveOneHalf => "1.5R+",
    }
  }
}

/// Nearest-zone strength, right-closed bins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ZoneStrengthBand {
  UpTo1_5,
  To2_0,
  To2_5,
  To3_0,
  Above3_0,
}

impl ZoneStrengthBand {
  /// `None` for a non-positive strength
  pub fn from_strength(strength: f64) -> Option<Self> {
    let band = match strength {
      s if s.is_nan() || s <= 0.0 => return None,
      s if s <= 1.5 => ZoneStrengthBand::UpTo1_5,
      s if s <= 2.0 => ZoneStrengthBand::To2_0,
      s if s <= 2.5 => ZoneStrengthBand::To2_5,
      s if s <= 3.0 => ZoneStrengthBand::To3_0,
      _ => ZoneStrengthBand::Above3_0,
    };
    Some(band)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      ZoneStrengthBand::UpTo1_5 => "1.0-1.5×",
      ZoneStrengthBand::To2_0 => "1.5-2.0×",
      ZoneStrengthBand::To2_5 => "2.0-2.5×",
      ZoneStrengthBand::To3_0 => "2.5-3.0×",
      ZoneStrengthBand::Above3_0 => "3.0×+",
    }
  }
}

macro_rules! impl_display_as_str {
  ($($t:ty),* $(,)?) => {
    $(
      impl std::fmt::Display for $t {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
          f.write_str(self.as_str())
        }
      }
    )*
  };
}

impl_display_as_str!(Session, NewsLabel, Alignment, ZoneAlignment, BreakoutBand, ZoneStrengthBand);

// ============================================================
// CALENDAR FIELDS
// ============================================================

const MONTHS: [&str; 12] =
  ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFields {
  pub date: NaiveDate,
  pub weekday: Weekday,
  /// 1..=12
  pub month: u32,
  /// `YYYY-MM`
  pub year_month: String,
  pub hour: u32,
  /// Monday = 0
  pub day_of_week: u32,
}

impl CalendarFields {
  pub fn of(timestamp: DateTime<Utc>) -> Self {
    let date = timestamp.date_naive();
    Self {
      date,
      weekday: date.weekday(),
      month: date.month(),
      year_month: format!("{:04}-{:02}", date.year(), date.month()),
      hour: timestamp.hour(),
      day_of_week: date.weekday().num_days_from_monday(),
    }
  }

  /// `Mon`..`Sun`
  pub fn weekday_name(&self) -> String {
    self.weekday.to_string()
  }

  /// `Jan`..`Dec`
  pub fn month_name(&self) -> &'static str {
    MONTHS[(self.month as usize).saturating_sub(1) % 12]
  }
}

// ============================================================
// DAILY RANGES
// ============================================================

/// Calendar-day range (max high - min low) of a series and its
/// high-volatility threshold.
#[derive(Debug, Clone, Default)]
pub struct DailyRanges {
  ranges: BTreeMap<NaiveDate, f64>,
  threshold: Option<f64>,
}

impl DailyRanges {
  pub fn from_bars<T: OHLCV>(bars: &[T]) -> Self {
    let mut extremes: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for bar in bars {
      let day = bar.timestamp().date_naive();
      let entry = extremes.entry(day).or_insert((bar.high(), bar.low()));
      entry.0 = entry.0.max(bar.high());
      entry.1 = entry.1.min(bar.low());
    }

    let ranges: BTreeMap<_, _> = extremes.into_iter().map(|(d, (hi, lo))| (d, hi - lo)).collect();
    let values: Vec<f64> = ranges.values().copied().collect();
    let threshold = quantile(&values, HIGH_VOLATILITY_QUANTILE);

    Self { ranges, threshold }
  }

  pub fn range(&self, date: NaiveDate) -> Option<f64> {
    self.ranges.get(&date).copied()
  }

  pub fn threshold(&self) -> Option<f64> {
    self.threshold
  }

  /// Strictly above the threshold
  pub fn is_high_volatility(&self, date: NaiveDate) -> bool {
    match (self.range(date), self.threshold) {
      (Some(range), Some(threshold)) => range > threshold,
      _ => false,
    }
  }
}

// ============================================================
// ENRICHED RECORD
// ============================================================

/// Analysis-ready setup: the raw record plus contextual labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSetup {
  #[serde(flatten)]
  pub setup: Setup,
  pub zone: ZoneMatch,
  pub zone_alignment: ZoneAlignment,
  pub session: Session,
  pub news: NewsLabel,
  pub calendar: CalendarFields,
  pub alignment: Alignment,
  pub breakout_band: BreakoutBand,
  pub zone_strength_band: Option<ZoneStrengthBand>,
  /// +1 for a win, -1 for a loss
  pub pnl_r: f64,
  /// Running sum of `pnl_r` over the series up to and including this setup
  pub cumulative_r: f64,
}

impl std::ops::Deref for EnrichedSetup {
  type Target = Setup;

  fn deref(&self) -> &Setup {
    &self.setup
  }
}

pub struct SetupEnricher<'a> {
  matcher: &'a ZoneMatcher,
  calendar: &'a dyn EventCalendar,
}

impl<'a> SetupEnricher<'a> {
  pub fn new(matcher: &'a ZoneMatcher, calendar: &'a dyn EventCalendar) -> Self {
    Self { matcher, calendar }
  }

  /// Enrich the setups of one series. `bars` is the series the setups and
  /// zones came from; output is in chronological order.
  pub fn enrich<T: OHLCV>(
    &self,
    bars: &[T],
    mut setups: Vec<Setup>,
    zones: &[Zone],
  ) -> Vec<EnrichedSetup> {
    setups.sort_by_key(|s| s.timestamp);
    let daily = DailyRanges::from_bars(bars);

    let mut cumulative = 0.0;
    setups
      .into_iter()
      .map(|setup| {
        let pnl_r = setup.pnl_r();
        cumulative += pnl_r;
        self.label(setup, &daily, pnl_r, cumulative, zones)
      })
      .collect()
  }

  pub fn news_label(&self, date: NaiveDate, daily: &DailyRanges) -> NewsLabel {
    if self.calendar.is_major_event(date) {
      NewsLabel::MajorEvent
    } else if daily.is_high_volatility(date) {
      NewsLabel::HighVolatility
    } else {
      NewsLabel::Normal
    }
  }

  fn label(
    &self,
    setup: Setup,
    daily: &DailyRanges,
    pnl_r: f64,
    cumulative_r: f64,
    zones: &[Zone],
  ) -> EnrichedSetup {
    let zone = self.matcher.classify(setup.timestamp, setup.entry, zones);
    let calendar = CalendarFields::of(setup.timestamp);
    let alignment =
      if setup.c1_direction_match() { Alignment::Aligned } else { Alignment::Counter };

    EnrichedSetup {
      zone_alignment: ZoneAlignment::of(zone.class, setup.direction),
      session: Session::from_hour(calendar.hour),
      news: self.news_label(calendar.date, daily),
      alignment,
      breakout_band: BreakoutBand::from_r(setup.breakout.r),
      zone_strength_band: zone.nearest.and_then(|n| ZoneStrengthBand::from_strength(n.strength)),
      zone,
      calendar,
      pnl_r,
      cumulative_r,
      setup,
    }
  }
}
