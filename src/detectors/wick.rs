//! Wick profile classifier
//!
//! Classifies a single bar's anatomy from the share of its range taken by the
//! upper wick, lower wick and body.

use serde::{Deserialize, Serialize};

use super::helpers::{
  pct, BOTH_WICKS_PCT, DOJI_BODY_PCT, FULL_BODY_PCT, HEAVY_WICK_PCT, SLIGHT_WICK_MARGIN_PCT,
};
use crate::OHLCV;

/// Candle anatomy label. Classification order is significant, see [`classify_wick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WickLabel {
  Doji,
  WicksBothSides,
  HeavyUpperWick,
  HeavyLowerWick,
  FullBody,
  SlightUpperWick,
  SlightLowerWick,
  Balanced,
}

impl WickLabel {
  pub fn as_str(self) -> &'static str {
    match self {
      WickLabel::Doji => "Doji",
      WickLabel::WicksBothSides => "Wicks Both Sides",
      WickLabel::HeavyUpperWick => "Heavy Upper Wick",
      WickLabel::HeavyLowerWick => "Heavy Lower Wick",
      WickLabel::FullBody => "Full Body",
      WickLabel::SlightUpperWick => "Slight Upper Wick",
      WickLabel::SlightLowerWick => "Slight Lower Wick",
      WickLabel::Balanced => "Balanced",
    }
  }

  /// Coarser grouping used by scenario keys
  pub fn bucket(self) -> WickBucket {
    match self {
      WickLabel::HeavyUpperWick | WickLabel::SlightUpperWick => WickBucket::UpperWick,
      WickLabel::HeavyLowerWick | WickLabel::SlightLowerWick => WickBucket::LowerWick,
      WickLabel::FullBody => WickBucket::FullBody,
      WickLabel::WicksBothSides => WickBucket::BothWicks,
      WickLabel::Doji => WickBucket::Doji,
      WickLabel::Balanced => WickBucket::Balanced,
    }
  }
}

impl std::fmt::Display for WickLabel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WickBucket {
  UpperWick,
  LowerWick,
  FullBody,
  BothWicks,
  Doji,
  Balanced,
}

impl WickBucket {
  pub fn as_str(self) -> &'static str {
    match self {
      WickBucket::UpperWick => "Upper Wick",
      WickBucket::LowerWick => "Lower Wick",
      WickBucket::FullBody => "Full Body",
      WickBucket::BothWicks => "Both Wicks",
      WickBucket::Doji => "Doji",
      WickBucket::Balanced => "Balanced",
    }
  }
}

impl std::fmt::Display for WickBucket {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Anatomy of one bar. Percentages are of the bar's total range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WickProfile {
  pub label: WickLabel,
  pub upper_pct: f64,
  pub lower_pct: f64,
  pub body_pct: f64,
  pub bullish: bool,
}

impl WickProfile {
  pub fn of<T: OHLCV>(bar: &T) -> Self {
    classify_wick(bar.open(), bar.close(), bar.high(), bar.low())
  }
}

/// Classify a bar's wick profile. Requires `high >= low`.
///
/// First match wins: doji, wicks both sides, heavy upper, heavy lower, full
/// body, slight upper, slight lower, balanced. A zero-range bar is a doji with
/// all percentages zero, and counts as bullish when `close >= open` (every
/// other bar needs `close > open`).
pub fn classify_wick(open: f64, close: f64, high: f64, low: f64) -> WickProfile {
  let range = high - low;
  if range == 0.0 {
    return WickProfile {
      label: WickLabel::Doji,
      upper_pct: 0.0,
      lower_pct: 0.0,
      body_pct: 0.0,
      bullish: close >= open,
    };
  }

  let body_top = open.max(close);
  let body_bottom = open.min(close);
  let upper = pct(high - body_top, range);
  let lower = pct(body_bottom - low, range);
  let body = pct(body_top - body_bottom, range);

  let label = if body < DOJI_BODY_PCT {
    WickLabel::Doji
  } else if upper > BOTH_WICKS_PCT && lower > BOTH_WICKS_PCT {
    WickLabel::WicksBothSides
  } else if upper > lower * 2.0 && upper > HEAVY_WICK_PCT {
    WickLabel::HeavyUpperWick
  } else if lower > upper * 2.0 && lower > HEAVY_WICK_PCT {
    WickLabel::HeavyLowerWick
  } else if body > FULL_BODY_PCT {
    WickLabel::FullBody
  } else if upper > lower + SLIGHT_WICK_MARGIN_PCT {
    WickLabel::SlightUpperWick
  } else if lower > upper + SLIGHT_WICK_MARGIN_PCT {
    WickLabel::SlightLowerWick
  } else {
    WickLabel::Balanced
  };

  WickProfile { label, upper_pct: upper, lower_pct: lower, body_pct: body, bullish: close > open }
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  #[test]
  fn test_zero_range_is_doji() {
    let p = classify_wick(100.0, 100.0, 100.0, 100.0);
    assert_eq!(p.label, WickLabel::Doji);
    assert_eq!((p.upper_pct, p.lower_pct, p.body_pct), (0.0, 0.0, 0.0));
    assert!(p.bullish);

    // a flat-bodied bar with range is not bullish
    assert!(!classify_wick(100.0, 100.0, 101.0, 99.0).bullish);
  }

  #[test]
  fn test_full_body() {
    // 5% upper, 5% lower, 90% body
    let p = classify_wick(100.5, 109.5, 110.0, 100.0);
    assert_eq!(p.label, WickLabel::FullBody);
    assert!(p.bullish);
    assert!((p.body_pct - 90.0).abs() < 1e-9);
  }

  #[test]
  fn test_small_body_is_doji_before_wicks() {
    // 45% / 50% wicks would be "both sides" but body 5% wins first
    let p = classify_wick(104.5, 105.0, 110.0, 100.0);
    assert_eq!(p.label, WickLabel::Doji);
  }

  #[test]
  fn test_wicks_both_sides() {
    let p = classify_wick(103.5, 106.0, 110.0, 100.0);
    assert_eq!(p.label, WickLabel::WicksBothSides);
  }

  #[test]
  fn test_heavy_wicks() {
    // upper 40%, lower 10%, body 50%
    let up = classify_wick(101.0, 106.0, 110.0, 100.0);
    assert_eq!(up.label, WickLabel::HeavyUpperWick);
    assert_eq!(up.label.bucket(), WickBucket::UpperWick);

    // lower 40%, upper 10%, body 50%, bearish
    let down = classify_wick(109.0, 104.0, 110.0, 100.0);
    assert_eq!(down.label, WickLabel::HeavyLowerWick);
    assert!(!down.bullish);
  }

  #[test]
  fn test_slight_and_balanced() {
    // upper 15%, lower 8%, body 77%: full body is checked before slight upper
    assert_eq!(classify_wick(100.8, 108.5, 110.0, 100.0).label, WickLabel::FullBody);
    // upper 20%, lower 10%, body 70%: not heavy (20 not > 20), slight upper
    assert_eq!(classify_wick(101.0, 108.0, 110.0, 100.0).label, WickLabel::SlightUpperWick);
    // upper 10%, lower 20%, body 70%
    assert_eq!(classify_wick(102.0, 109.0, 110.0, 100.0).label, WickLabel::SlightLowerWick);
    // upper 15%, lower 15%, body 70%
    assert_eq!(classify_wick(101.5, 108.5, 110.0, 100.0).label, WickLabel::Balanced);
  }

  proptest! {
    #[test]
    fn prop_percentages_sum_to_hundred(
      low in 1.0f64..1000.0,
      span in 0.01f64..100.0,
      a in 0.0f64..=1.0,
      b in 0.0f64..=1.0,
    ) {
      let high = low + span;
      let open = low + span * a;
      let close = low + span * b;
      let p = classify_wick(open, close, high, low);
      prop_assert!((p.upper_pct + p.lower_pct + p.body_pct - 100.0).abs() < 1e-6);
      prop_assert!(p.upper_pct >= -1e-9 && p.lower_pct >= -1e-9 && p.body_pct >= 0.0);
    }

    #[test]
    fn prop_flat_bar_is_zeroed_doji(price in 0.01f64..10_000.0) {
      let p = classify_wick(price, price, price, price);
      prop_assert_eq!(p.label, WickLabel::Doji);
      prop_assert_eq!(p.upper_pct + p.lower_pct + p.body_pct, 0.0);
    }
  }
}
