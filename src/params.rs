//! Analysis parameters and their metadata
//!
//! [`AnalysisParams`] is the fixed parameter set every analysis runs with. The
//! [`ParamMeta`] table describes each parameter for:
//! - Grid search optimization
//! - Parameter documentation
//! - Automatic configuration UI generation
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use insidebar::params::{AnalysisParams, PARAMS};
//!
//! for param in PARAMS {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let mut values = HashMap::new();
//! values.insert("body_ratio_threshold", 0.7);
//! let params = AnalysisParams::with_params(&values).unwrap();
//! assert_eq!(params.body_ratio_threshold.get(), 0.7);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{AnalysisError, Multiple, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Fraction in 0.0..=1.0
  Ratio,
  /// Strictly positive multiplier
  Multiple,
  /// Positive integer
  Period,
}

/// Metadata for a single analysis parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "body_ratio_threshold")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn multiple(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Multiple, default, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let steps = ((max - min) / step + 1e-9).floor() as usize;
    (0..=steps).map(|k| min + k as f64 * step).collect()
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(AnalysisError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ratio::new(value).map(|_| ()),
      ParamType::Multiple => Multiple::new(value).map(|_| ()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(AnalysisError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
    }
  }
}

/// Metadata for every field of [`AnalysisParams`]
pub static PARAMS: &[ParamMeta] = &[
  ParamMeta::ratio(
    "body_ratio_threshold",
    0.65,
    (0.50, 0.85, 0.05),
    "Minimum body / range of the big candle",
  ),
  ParamMeta::multiple(
    "atr_multiplier",
    1.3,
    (0.5, 2.5, 0.1),
    "Minimum big-candle body as a multiple of ATR-14",
  ),
  ParamMeta::multiple(
    "zone_strength_minimum",
    1.5,
    (1.0, 3.0, 0.25),
    "Minimum zone-origin body as a multiple of ATR-14",
  ),
  ParamMeta::period(
    "zone_lookback_hours",
    720.0,
    (120.0, 1440.0, 120.0),
    "How far back a zone stays active, in hours",
  ),
  ParamMeta::ratio(
    "zone_proximity_fraction",
    0.003,
    (0.001, 0.015, 0.001),
    "Max distance to a zone edge, as a fraction of price, to count as near",
  ),
];

// ============================================================
// ANALYSIS PARAMETERS
// ============================================================

/// Caller-supplied parameter set for one analysis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
  pub body_ratio_threshold: Ratio,
  pub atr_multiplier: Multiple,
  pub zone_strength_minimum: Multiple,
  pub zone_lookback_hours: Period,
  pub zone_proximity_fraction: Ratio,
}

impl Default for AnalysisParams {
  fn default() -> Self {
    Self {
      body_ratio_threshold: Ratio::new_const(0.65),
      atr_multiplier: Multiple::new_const(1.3),
      zone_strength_minimum: Multiple::new_const(1.5),
      zone_lookback_hours: Period::new_const(720),
      zone_proximity_fraction: Ratio::new_const(0.003),
    }
  }
}

impl AnalysisParams {
  /// Creates a parameter set from loose values. Missing keys use their defaults.
  pub fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let defaults = Self::default();
    Ok(Self {
      body_ratio_threshold: get_ratio(
        params,
        "body_ratio_threshold",
        defaults.body_ratio_threshold.get(),
      )?,
      atr_multiplier: get_multiple(params, "atr_multiplier", defaults.atr_multiplier.get())?,
      zone_strength_minimum: get_multiple(
        params,
        "zone_strength_minimum",
        defaults.zone_strength_minimum.get(),
      )?,
      zone_lookback_hours: get_period(
        params,
        "zone_lookback_hours",
        defaults.zone_lookback_hours.get(),
      )?,
      zone_proximity_fraction: get_ratio(
        params,
        "zone_proximity_fraction",
        defaults.zone_proximity_fraction.get(),
      )?,
    })
  }

  /// Cross-field checks the newtypes cannot express on their own.
  pub fn validate(&self) -> Result<()> {
    let proximity = self.zone_proximity_fraction.get();
    if proximity >= 1.0 {
      return Err(AnalysisError::OutOfRange {
        field: "zone_proximity_fraction",
        value: proximity,
        min: 0.0,
        max: 1.0,
      });
    }
    if i64::try_from(self.zone_lookback_hours.get()).is_err() {
      return Err(AnalysisError::InvalidConfig("zone_lookback_hours too large".into()));
    }
    Ok(())
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a Multiple from params with default fallback
pub fn get_multiple(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Multiple> {
  let value = params.get(key).copied().unwrap_or(default);
  Multiple::new(value)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value < 0.0 || value.fract() != 0.0 {
    return Err(AnalysisError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_match_metadata() {
    let defaults = AnalysisParams::default();
    let lookup = |name: &str| PARAMS.iter().find(|p| p.name == name).unwrap().default;

    assert_eq!(defaults.body_ratio_threshold.get(), lookup("body_ratio_threshold"));
    assert_eq!(defaults.atr_multiplier.get(), lookup("atr_multiplier"));
    assert_eq!(defaults.zone_strength_minimum.get(), lookup("zone_strength_minimum"));
    assert_eq!(defaults.zone_lookback_hours.get() as f64, lookup("zone_lookback_hours"));
    assert_eq!(defaults.zone_proximity_fraction.get(), lookup("zone_proximity_fraction"));
  }

  #[test]
  fn test_every_default_validates() {
    for meta in PARAMS {
      assert!(meta.validate(meta.default).is_ok(), "{} default out of range", meta.name);
    }
  }

  #[test]
  fn test_generate_grid() {
    let meta = ParamMeta::ratio("test", 0.5, (0.3, 0.7, 0.2), "Test");

    let grid = meta.generate_grid();
    assert_eq!(grid.len(), 3);
    assert!((grid[0] - 0.3).abs() < 1e-12);
    assert!((grid[1] - 0.5).abs() < 1e-12);
    assert!((grid[2] - 0.7).abs() < 1e-12);
  }

  #[test]
  fn test_lookback_grid() {
    let meta = PARAMS.iter().find(|p| p.name == "zone_lookback_hours").unwrap();
    let grid = meta.generate_grid();
    assert_eq!(grid.len(), 12);
    assert_eq!(grid[0], 120.0);
    assert_eq!(grid[11], 1440.0);
  }

  #[test]
  fn test_validate_period() {
    let meta = ParamMeta::period("test", 720.0, (120.0, 1440.0, 120.0), "Test");

    assert!(meta.validate(720.0).is_ok());
    assert!(meta.validate(720.5).is_err());
    assert!(meta.validate(100.0).is_err());
    assert!(meta.validate(2000.0).is_err());
  }

  #[test]
  fn test_with_params() {
    let mut values = HashMap::new();
    values.insert("atr_multiplier", 1.0);
    values.insert("zone_lookback_hours", 240.0);

    let params = AnalysisParams::with_params(&values).unwrap();
    assert_eq!(params.atr_multiplier.get(), 1.0);
    assert_eq!(params.zone_lookback_hours.get(), 240);
    assert_eq!(params.body_ratio_threshold.get(), 0.65);
  }

  #[test]
  fn test_with_params_rejects_bad_values() {
    let mut values = HashMap::new();
    values.insert("body_ratio_threshold", 1.5);
    assert!(AnalysisParams::with_params(&values).is_err());

    let mut values = HashMap::new();
    values.insert("zone_lookback_hours", 0.0);
    assert!(AnalysisParams::with_params(&values).is_err());
  }

  #[test]
  fn test_full_proximity_rejected() {
    let params = AnalysisParams {
      zone_proximity_fraction: Ratio::new(1.0).unwrap(),
      ..AnalysisParams::default()
    };
    assert!(params.validate().is_err());
  }
}
