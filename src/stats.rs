//! Aggregation of enriched setups into win-rate / expectancy tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::enrich::EnrichedSetup;

/// Summary statistics of a group of setups, all outcomes in risk units
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
  pub trades: usize,
  pub wins: usize,
  /// Percent
  pub win_rate: f64,
  /// Mean P&L per trade (expectancy)
  pub avg_r: f64,
  /// Gross winning R / gross losing R; `None` without losses
  pub profit_factor: Option<f64>,
  pub hit_1r_pct: f64,
  pub hit_1_5r_pct: f64,
  pub hit_2r_pct: f64,
  pub avg_mfe: f64,
  pub avg_mae: f64,
}

impl Stats {
  pub fn of<'a, I>(setups: I) -> Self
  where
    I: IntoIterator<Item = &'a EnrichedSetup>,
  {
    let mut s = Stats::default();
    let (mut total_r, mut gross_win, mut gross_loss) = (0.0, 0.0, 0.0);
    let (mut hit_1r, mut hit_1_5r, mut hit_2r) = (0usize, 0usize, 0usize);
    let (mut mfe, mut mae) = (0.0, 0.0);

    for e in setups {
      s.trades += 1;
      s.wins += e.win as usize;
      total_r += e.pnl_r;
      if e.pnl_r > 0.0 {
        gross_win += e.pnl_r;
      } else if e.pnl_r < 0.0 {
        gross_loss -= e.pnl_r;
      }
      hit_1r += e.outcome.hit_1r as usize;
      hit_1_5r += e.outcome.hit_1_5r as usize;
      hit_2r += e.outcome.hit_2r as usize;
      mfe += e.outcome.mfe_r;
      mae += e.outcome.mae_r;
    }

    if s.trades == 0 {
      return s;
    }

    let n = s.trades as f64;
    let pct = |count: usize| count as f64 / n * 100.0;
    s.win_rate = pct(s.wins);
    s.avg_r = total_r / n;
    s.profit_factor = (gross_loss > 0.0).then(|| gross_win / gross_loss);
    s.hit_1r_pct = pct(hit_1r);
    s.hit_1_5r_pct = pct(hit_1_5r);
    s.hit_2r_pct = pct(hit_2r);
    s.avg_mfe = mfe / n;
    s.avg_mae = mae / n;
    s
  }

  pub fn total_r(&self) -> f64 {
    self.avg_r * self.trades as f64
  }
}

// ============================================================
// DIMENSIONS
// ============================================================

/// Built-in grouping keys over enriched setups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
  Direction,
  Session,
  News,
  Zone,
  ProximityBand,
  ZoneAlignment,
  Alignment,
  Weekday,
  Month,
  YearMonth,
  Hour,
  C1Wick,
  C2Wick,
  Scenario,
  FollowCount,
  BreakoutBand,
  ZoneStrengthBand,
}

impl Dimension {
  pub const ALL: [Dimension; 17] = [
    Dimension::Direction,
    Dimension::Session,
    Dimension::News,
    Dimension::Zone,
    Dimension::ProximityBand,
    Dimension::ZoneAlignment,
    Dimension::Alignment,
    Dimension::Weekday,
    Dimension::Month,
    Dimension::YearMonth,
    Dimension::Hour,
    Dimension::C1Wick,
    Dimension::C2Wick,
    Dimension::Scenario,
    Dimension::FollowCount,
    Dimension::BreakoutBand,
    Dimension::ZoneStrengthBand,
  ];

  /// Label of `setup` along this dimension; `None` when it has no value
  /// (zone strength without a nearby zone).
  pub fn label(self, setup: &EnrichedSetup) -> Option<String> {
    let label = match self {
      Dimension::Direction => setup.direction.to_string(),
      Dimension::Session => setup.session.to_string(),
      Dimension::News => setup.news.to_string(),
      Dimension::Zone => setup.zone.class.to_string(),
      Dimension::ProximityBand => setup.zone.band.to_string(),
      Dimension::ZoneAlignment => setup.zone_alignment.to_string(),
      Dimension::Alignment => setup.alignment.to_string(),
      Dimension::Weekday => setup.calendar.weekday_name(),
      Dimension::Month => setup.calendar.month_name().to_string(),
      Dimension::YearMonth => setup.calendar.year_month.clone(),
      Dimension::Hour => format!("{:02}", setup.calendar.hour),
      Dimension::C1Wick => setup.c1_wick.label.to_string(),
      Dimension::C2Wick => setup.c2_wick.label.to_string(),
      Dimension::Scenario => setup.scenario_key(),
      Dimension::FollowCount => setup.follow_count.to_string(),
      Dimension::BreakoutBand => setup.breakout_band.to_string(),
      Dimension::ZoneStrengthBand => setup.zone_strength_band?.to_string(),
    };
    Some(label)
  }
}

/// Group by an arbitrary key. Setups whose key is `None` are left out.
pub fn group_by_key<K, F>(setups: &[EnrichedSetup], key: F) -> BTreeMap<K, Stats>
where
  K: Ord,
  F: Fn(&EnrichedSetup) -> Option<K>,
{
  let mut groups: BTreeMap<K, Vec<&EnrichedSetup>> = BTreeMap::new();
  for setup in setups {
    if let Some(k) = key(setup) {
      groups.entry(k).or_default().push(setup);
    }
  }
  groups.into_iter().map(|(k, members)| (k, Stats::of(members))).collect()
}

/// Group by one built-in dimension, keyed by label
pub fn group_by(setups: &[EnrichedSetup], dimension: Dimension) -> BTreeMap<String, Stats> {
  group_by_key(setups, |s| dimension.label(s))
}

/// Two-way table: `rows` label -> `cols` label -> stats. Empty cells are absent.
pub fn pivot(
  setups: &[EnrichedSetup],
  rows: Dimension,
  cols: Dimension,
) -> BTreeMap<String, BTreeMap<String, Stats>> {
  let cells = group_by_key(setups, |s| Some((rows.label(s)?, cols.label(s)?)));

  let mut table: BTreeMap<String, BTreeMap<String, Stats>> = BTreeMap::new();
  for ((row, col), stats) in cells {
    table.entry(row).or_default().insert(col, stats);
  }
  table
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    calendar::MacroCalendar,
    detectors::{InsideBarDetector, ZoneMatcher},
    enrich::{Session, SetupEnricher},
    ContextProvider, PriceBar,
  };
  use chrono::{Duration, TimeZone, Utc};

  /// Four setups: hours 20, 22 (loss), 44, 46 starting from a Monday
  fn sample() -> Vec<EnrichedSetup> {
    let start = Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap();
    let at = |i: usize| start + Duration::hours(i as i64);
    let mut bars: Vec<_> =
      (0..20).map(|i| PriceBar::new(at(i), 100.0, 101.0, 99.0, 100.2, 1.0)).collect();
    bars.push(PriceBar::new(at(20), 100.5, 110.0, 100.0, 109.5, 1.0));
    bars.push(PriceBar::new(at(21), 108.0, 109.0, 105.0, 106.0, 1.0));
    bars.push(PriceBar::new(at(22), 106.0, 110.5, 105.5, 110.0, 1.0));
    bars.push(PriceBar::new(at(23), 110.0, 116.0, 109.0, 115.5, 1.0));
    while bars.len() < 30 {
      let i = bars.len();
      bars.push(PriceBar::new(at(i), 115.2, 115.8, 114.8, 115.4, 1.0));
    }
    let contexts = crate::AtrContextProvider::default().compute_all(&bars);
    let (setups, _) = InsideBarDetector::default().scan(&bars, &contexts);
    let base = setups.into_iter().find(|s| s.index == 20).unwrap();

    let raw: Vec<_> = [(0, true), (2, false), (24, true), (26, true)]
      .into_iter()
      .map(|(offset, win)| {
        let mut s = base.clone();
        s.timestamp = base.timestamp + Duration::hours(offset);
        s.win = win;
        s
      })
      .collect();

    let matcher = ZoneMatcher::default();
    let calendar = MacroCalendar::empty();
    SetupEnricher::new(&matcher, &calendar).enrich::<PriceBar>(&[], raw, &[])
  }

  #[test]
  fn test_stats() {
    let setups = sample();
    let stats = Stats::of(&setups);
    assert_eq!(stats.trades, 4);
    assert_eq!(stats.wins, 3);
    assert!((stats.win_rate - 75.0).abs() < 1e-12);
    assert!((stats.avg_r - 0.5).abs() < 1e-12);
    assert_eq!(stats.profit_factor, Some(3.0));
    assert!((stats.total_r() - 2.0).abs() < 1e-12);
    assert!((stats.hit_1r_pct - 100.0).abs() < 1e-12);
    assert!((stats.avg_mfe - 1.2).abs() < 1e-12);
  }

  #[test]
  fn test_no_losses_has_no_profit_factor() {
    let setups: Vec<_> = sample().into_iter().filter(|s| s.win).collect();
    assert_eq!(Stats::of(&setups).profit_factor, None);
    assert_eq!(Stats::of(std::iter::empty()), Stats::default());
  }

  #[test]
  fn test_group_by_weekday_and_session() {
    let setups = sample();
    let by_day = group_by(&setups, Dimension::Weekday);
    assert_eq!(by_day.keys().collect::<Vec<_>>(), vec!["Mon", "Tue"]);
    assert_eq!(by_day["Mon"].trades, 2);
    assert_eq!(by_day["Tue"].wins, 2);

    let by_session = group_by_key(&setups, |s| Some(s.session));
    assert_eq!(by_session[&Session::NewYork].trades, 2);
    assert_eq!(by_session[&Session::OffHours].trades, 2);
  }

  #[test]
  fn test_missing_labels_are_skipped() {
    let setups = sample();
    assert!(group_by(&setups, Dimension::ZoneStrengthBand).is_empty());
    assert_eq!(group_by(&setups, Dimension::Zone)["neutral"].trades, 4);
  }

  #[test]
  fn test_pivot() {
    let setups = sample();
    let table = pivot(&setups, Dimension::Weekday, Dimension::Hour);
    assert_eq!(table["Mon"]["20"].trades, 1);
    assert_eq!(table["Mon"]["22"].wins, 0);
    assert_eq!(table["Tue"].len(), 2);
    assert!(!table["Tue"].contains_key("21"));
  }
}
