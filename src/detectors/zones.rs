//! Supply/demand zones
//!
//! [`ZoneDetector`] turns every high-conviction candle (body large relative to
//! ATR) into a price zone. [`ZoneMatcher`] answers, for a point in time and a
//! price, which of those zones are active and how close the price sits to them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::helpers::ZONE_WARMUP;
use crate::{
  params::AnalysisParams, Detector, MarketContext, Multiple, OHLCVExt, Period, Ratio, Result,
  OHLCV,
};

// ============================================================
// ZONE
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
  Supply,
  Demand,
}

impl ZoneKind {
  pub fn as_str(self) -> &'static str {
    match self {
      ZoneKind::Supply => "supply",
      ZoneKind::Demand => "demand",
    }
  }
}

impl std::fmt::Display for ZoneKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A price band where an aggressive candle originated. Never mutated after detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Zone {
  pub origin: DateTime<Utc>,
  pub top: f64,
  pub bottom: f64,
  pub kind: ZoneKind,
  /// Origin body / concurrent ATR
  pub strength: f64,
  pub origin_body: f64,
  pub origin_range: f64,
}

impl Zone {
  #[inline]
  pub fn contains(&self, price: f64) -> bool {
    self.bottom <= price && price <= self.top
  }

  /// Fractional distance from `price` to the nearest zone edge; 0 inside the zone.
  pub fn distance(&self, price: f64) -> f64 {
    if self.contains(price) {
      return 0.0;
    }
    let to_top = (price - self.top).abs() / price;
    let to_bottom = (price - self.bottom).abs() / price;
    to_top.min(to_bottom)
  }
}

// ============================================================
// ZONE DETECTOR
// ============================================================

/// Emits a zone for every bar whose body is at least `strength_minimum` x ATR.
///
/// Bullish origin: demand zone from the open down to the low.
/// Bearish origin: supply zone from the high down to the open.
#[derive(Debug, Clone)]
pub struct ZoneDetector {
  pub strength_minimum: Multiple,
}

impl Default for ZoneDetector {
  fn default() -> Self {
    Self { strength_minimum: Multiple::new_const(1.5) }
  }
}

impl ZoneDetector {
  pub fn from_params(params: &AnalysisParams) -> Self {
    Self { strength_minimum: params.zone_strength_minimum }
  }

  /// All zones of a series, in bar order. Overlapping zones are kept as-is.
  pub fn scan<T: OHLCV>(&self, bars: &[T], contexts: &[MarketContext]) -> Vec<Zone> {
    let zones: Vec<Zone> = (ZONE_WARMUP..bars.len())
      .filter_map(|i| contexts.get(i).and_then(|ctx| self.detect(bars, i, ctx)))
      .collect();

    tracing::debug!(bars = bars.len(), zones = zones.len(), "zone scan");
    zones
  }
}

impl Detector for ZoneDetector {
  type Output = Zone;

  fn id(&self) -> &'static str {
    "SUPPLY_DEMAND_ZONE"
  }

  fn min_bars(&self) -> usize {
    ZONE_WARMUP + 1
  }

  fn detect<T: OHLCV>(&self, bars: &[T], index: usize, ctx: &MarketContext) -> Option<Zone> {
    if index < ZONE_WARMUP {
      return None;
    }
    let bar = bars.get(index)?;
    let atr = ctx.usable_atr()?;

    let body = bar.body();
    if body < self.strength_minimum.get() * atr {
      return None;
    }

    let (top, bottom, kind) = if bar.is_bullish() {
      (bar.open(), bar.low(), ZoneKind::Demand)
    } else {
      (bar.high(), bar.open(), ZoneKind::Supply)
    };

    Some(Zone {
      origin: bar.timestamp(),
      top: top.max(bottom),
      bottom: top.min(bottom),
      kind,
      strength: body / atr,
      origin_body: body,
      origin_range: bar.range(),
    })
  }
}

// ============================================================
// ZONE MATCHER
// ============================================================

/// Zone context of a price at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneClass {
  Supply,
  Demand,
  Contested,
  Neutral,
}

impl ZoneClass {
  pub fn as_str(self) -> &'static str {
    match self {
      ZoneClass::Supply => "supply",
      ZoneClass::Demand => "demand",
      ZoneClass::Contested => "contested",
      ZoneClass::Neutral => "neutral",
    }
  }
}

impl std::fmt::Display for ZoneClass {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Distance band of the nearest active zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProximityBand {
  InsideZone,
  Touching,
  VeryClose,
  Near,
  Moderate,
  Far,
  NoZone,
}

impl ProximityBand {
  /// Band for a fractional distance (0.001 = 0.1%)
  pub fn from_distance(distance: f64) -> Self {
    match distance {
      d if d == 0.0 => ProximityBand::InsideZone,
      d if d <= 0.001 => ProximityBand::Touching,
      d if d <= 0.003 => ProximityBand::VeryClose,
      d if d <= 0.006 => ProximityBand::Near,
      d if d <= 0.01 => ProximityBand::Moderate,
      _ => ProximityBand::Far,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      ProximityBand::InsideZone => "Inside Zone",
      ProximityBand::Touching => "Touching (≤0.1%)",
      ProximityBand::VeryClose => "Very Close (0.1-0.3%)",
      ProximityBand::Near => "Near (0.3-0.6%)",
      ProximityBand::Moderate => "Moderate (0.6-1%)",
      ProximityBand::Far => "Far (>1%)",
      ProximityBand::NoZone => "No Zone",
    }
  }
}

impl std::fmt::Display for ProximityBand {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The single nearest active zone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NearestZone {
  pub kind: ZoneKind,
  pub strength: f64,
  pub top: f64,
  pub bottom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneMatch {
  pub class: ZoneClass,
  /// Distance to the nearest active zone, in percent of price
  pub distance_pct: Option<f64>,
  pub band: ProximityBand,
  pub nearest: Option<NearestZone>,
}

impl ZoneMatch {
  pub const NONE: ZoneMatch = ZoneMatch {
    class: ZoneClass::Neutral,
    distance_pct: None,
    band: ProximityBand::NoZone,
    nearest: None,
  };
}

/// Point-in-time zone lookup.
///
/// A zone is active for a query at `t` when its origin lies in
/// `[t - lookback, t)`: a zone born on the query bar itself is not yet visible.
#[derive(Debug, Clone)]
pub struct ZoneMatcher {
  pub lookback_hours: Period,
  /// Max fractional distance for a zone to count as near
  pub proximity: Ratio,
}

impl Default for ZoneMatcher {
  fn default() -> Self {
    Self { lookback_hours: Period::new_const(720), proximity: Ratio::new_const(0.003) }
  }
}

impl ZoneMatcher {
  pub fn from_params(params: &AnalysisParams) -> Self {
    Self {
      lookback_hours: params.zone_lookback_hours,
      proximity: params.zone_proximity_fraction,
    }
  }

  pub fn validate_config(&self) -> Result<()> {
    if self.proximity.get() >= 1.0 {
      return Err(crate::AnalysisError::InvalidConfig(format!(
        "zone proximity {} must be below 1",
        self.proximity.get()
      )));
    }
    if self.lookback().is_none() {
      return Err(crate::AnalysisError::InvalidConfig(format!(
        "zone lookback of {} hours is out of range",
        self.lookback_hours.get()
      )));
    }
    Ok(())
  }

  fn lookback(&self) -> Option<Duration> {
    i64::try_from(self.lookback_hours.get()).ok().and_then(Duration::try_hours)
  }

  /// A cutoff earlier than the earliest representable time means no lower bound.
  #[inline]
  pub fn is_active(&self, zone: &Zone, at: DateTime<Utc>) -> bool {
    let cutoff = self.lookback().and_then(|lookback| at.checked_sub_signed(lookback));
    cutoff.map_or(true, |cutoff| zone.origin >= cutoff) && zone.origin < at
  }

  /// Classify `price` at `at` against `zones`.
  ///
  /// Exact distance ties keep the first zone encountered in `zones`.
  pub fn classify(&self, at: DateTime<Utc>, price: f64, zones: &[Zone]) -> ZoneMatch {
    let proximity = self.proximity.get();
    let mut near_supply = false;
    let mut near_demand = false;
    let mut nearest: Option<(f64, &Zone)> = None;

    for zone in zones.iter().filter(|z| self.is_active(z, at)) {
      let dist = zone.distance(price);

      if nearest.map_or(true, |(best, _)| dist < best) {
        nearest = Some((dist, zone));
      }

      if dist <= proximity {
        match zone.kind {
          ZoneKind::Supply => near_supply = true,
          ZoneKind::Demand => near_demand = true,
        }
      }
    }

    let Some((dist, zone)) = nearest else {
      return ZoneMatch::NONE;
    };

    let class = match (near_supply, near_demand) {
      (true, true) => ZoneClass::Contested,
      (true, false) => ZoneClass::Supply,
      (false, true) => ZoneClass::Demand,
      (false, false) => ZoneClass::Neutral,
    };

    ZoneMatch {
      class,
      distance_pct: Some(dist * 100.0),
      band: ProximityBand::from_distance(dist),
      nearest: Some(NearestZone {
        kind: zone.kind,
        strength: zone.strength,
        top: zone.top,
        bottom: zone.bottom,
      }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{ContextProvider, PriceBar};
  use chrono::TimeZone;

  fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
  }

  fn zone(hours_before: i64, bottom: f64, top: f64, kind: ZoneKind) -> Zone {
    Zone {
      origin: t0() - Duration::hours(hours_before),
      top,
      bottom,
      kind,
      strength: 2.0,
      origin_body: top - bottom,
      origin_range: top - bottom,
    }
  }

  fn matcher(lookback: usize, proximity: f64) -> ZoneMatcher {
    ZoneMatcher {
      lookback_hours: Period::new(lookback).unwrap(),
      proximity: Ratio::new(proximity).unwrap(),
    }
  }

  #[test]
  fn test_zone_distance() {
    let z = zone(1, 99.0, 100.0, ZoneKind::Supply);
    assert_eq!(z.distance(100.0), 0.0);
    assert_eq!(z.distance(99.0), 0.0);
    assert!((z.distance(101.0) - 1.0 / 101.0).abs() < 1e-12);
    assert!((z.distance(98.0) - 1.0 / 98.0).abs() < 1e-12);
  }

  #[test]
  fn test_price_on_zone_top_is_inside() {
    let zones = [zone(5, 95.0, 100.0, ZoneKind::Demand)];
    let m = matcher(720, 0.003).classify(t0(), 100.0, &zones);
    assert_eq!(m.distance_pct, Some(0.0));
    assert_eq!(m.band, ProximityBand::InsideZone);
    assert_eq!(m.class, ZoneClass::Demand);
  }

  #[test]
  fn test_zone_at_query_time_excluded() {
    let zones = [zone(0, 95.0, 100.0, ZoneKind::Demand)];
    let m = matcher(720, 0.003).classify(t0(), 97.0, &zones);
    assert_eq!(m, ZoneMatch::NONE);
  }

  #[test]
  fn test_lookback_lower_bound_inclusive() {
    let m = matcher(720, 0.003);
    let at_cutoff = [zone(720, 95.0, 100.0, ZoneKind::Supply)];
    let past_cutoff = [zone(721, 95.0, 100.0, ZoneKind::Supply)];

    assert_eq!(m.classify(t0(), 97.0, &at_cutoff).class, ZoneClass::Supply);
    assert_eq!(m.classify(t0(), 97.0, &past_cutoff), ZoneMatch::NONE);
  }

  #[test]
  fn test_lookback_beyond_time_range_has_no_lower_bound() {
    let m = matcher(10_000_000_000, 0.003);
    assert!(m.validate_config().is_ok());

    let old = zone(24 * 365 * 50, 95.0, 100.0, ZoneKind::Demand);
    assert!(m.is_active(&old, t0()));
    assert!(!m.is_active(&zone(0, 95.0, 100.0, ZoneKind::Demand), t0()));
    assert_eq!(m.classify(t0(), 97.0, &[old]).class, ZoneClass::Demand);

    let unrepresentable = matcher(usize::MAX, 0.003);
    assert!(unrepresentable.validate_config().is_err());
    assert!(unrepresentable.is_active(&old, t0()));
  }

  #[test]
  fn test_contested_and_nearest() {
    let zones = [
      zone(10, 100.1, 101.0, ZoneKind::Supply),
      zone(20, 98.0, 99.9, ZoneKind::Demand),
      zone(30, 120.0, 125.0, ZoneKind::Supply),
    ];
    let m = matcher(720, 0.003).classify(t0(), 100.0, &zones);
    assert_eq!(m.class, ZoneClass::Contested);
    // both at 0.1%; the first one wins the tie
    let nearest = m.nearest.unwrap();
    assert_eq!(nearest.kind, ZoneKind::Supply);
    assert_eq!(m.band, ProximityBand::Touching);
  }

  #[test]
  fn test_far_zone_is_neutral_with_band() {
    let zones = [zone(10, 110.0, 112.0, ZoneKind::Supply)];
    let m = matcher(720, 0.003).classify(t0(), 100.0, &zones);
    assert_eq!(m.class, ZoneClass::Neutral);
    assert_eq!(m.band, ProximityBand::Far);
    assert!((m.distance_pct.unwrap() - 10.0).abs() < 1e-9);
    assert_eq!(m.nearest.unwrap().top, 112.0);
  }

  #[test]
  fn test_proximity_bands() {
    assert_eq!(ProximityBand::from_distance(0.0), ProximityBand::InsideZone);
    assert_eq!(ProximityBand::from_distance(0.001), ProximityBand::Touching);
    assert_eq!(ProximityBand::from_distance(0.002), ProximityBand::VeryClose);
    assert_eq!(ProximityBand::from_distance(0.005), ProximityBand::Near);
    assert_eq!(ProximityBand::from_distance(0.008), ProximityBand::Moderate);
    assert_eq!(ProximityBand::from_distance(0.02), ProximityBand::Far);
  }

  fn bars_with_spike(spike: PriceBar) -> Vec<PriceBar> {
    let start = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
    let mut bars: Vec<_> = (0..22)
      .map(|i| PriceBar::new(start + Duration::hours(i), 100.0, 101.0, 99.0, 100.2, 1.0))
      .collect();
    bars.push(PriceBar { timestamp: start + Duration::hours(22), ..spike });
    bars
  }

  #[test]
  fn test_detects_demand_zone() {
    let bars = bars_with_spike(PriceBar::new(t0(), 100.0, 106.5, 99.5, 106.0, 1.0));
    let contexts = crate::AtrContextProvider::default().compute_all(&bars);
    let zones = ZoneDetector::with_defaults().scan(&bars, &contexts);

    assert_eq!(zones.len(), 1);
    let z = zones[0];
    assert_eq!(z.kind, ZoneKind::Demand);
    assert_eq!((z.top, z.bottom), (100.0, 99.5));
    assert!(z.strength >= 1.5);
    assert_eq!(z.origin, bars[22].timestamp);
  }

  #[test]
  fn test_detects_supply_zone() {
    let bars = bars_with_spike(PriceBar::new(t0(), 100.0, 100.5, 93.5, 94.0, 1.0));
    let contexts = crate::AtrContextProvider::default().compute_all(&bars);
    let zones = ZoneDetector::with_defaults().scan(&bars, &contexts);

    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0].kind, ZoneKind::Supply);
    assert_eq!((zones[0].top, zones[0].bottom), (100.5, 100.0));
  }

  #[test]
  fn test_no_zones_in_warmup() {
    let start = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
    let mut bars: Vec<_> = (0..20)
      .map(|i| PriceBar::new(start + Duration::hours(i), 100.0, 101.0, 99.0, 100.2, 1.0))
      .collect();
    bars[18] = PriceBar::new(bars[18].timestamp, 100.0, 120.0, 100.0, 119.0, 1.0);
    let contexts = crate::AtrContextProvider::default().compute_all(&bars);
    assert!(ZoneDetector::with_defaults().scan(&bars, &contexts).is_empty());
  }
}
