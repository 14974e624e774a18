//! Bar retrieval seam: timeframes, resampling and a memoizing source wrapper.
//!
//! Fetching is kept out of the analysis core. An [`crate::Analyzer`] only ever
//! sees a complete in-memory series.

use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, PriceBar, Result, OHLCV};

// ============================================================
// TIMEFRAME
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
  #[serde(rename = "15m")]
  M15,
  #[serde(rename = "30m")]
  M30,
  #[serde(rename = "1h")]
  H1,
  #[serde(rename = "4h")]
  H4,
}

impl Timeframe {
  pub fn as_str(self) -> &'static str {
    match self {
      Timeframe::M15 => "15m",
      Timeframe::M30 => "30m",
      Timeframe::H1 => "1h",
      Timeframe::H4 => "4h",
    }
  }

  pub fn minutes(self) -> i64 {
    match self {
      Timeframe::M15 => 15,
      Timeframe::M30 => 30,
      Timeframe::H1 => 60,
      Timeframe::H4 => 240,
    }
  }

  #[inline]
  pub fn duration(self) -> Duration {
    Duration::minutes(self.minutes())
  }

  /// Longest history the upstream provider serves at this resolution
  pub fn max_history_days(self) -> u32 {
    match self {
      Timeframe::M15 | Timeframe::M30 => 59,
      Timeframe::H1 | Timeframe::H4 => 729,
    }
  }

  /// Resolution actually requested upstream; 4h bars are built from 1h
  pub fn native(self) -> Timeframe {
    match self {
      Timeframe::H4 => Timeframe::H1,
      other => other,
    }
  }

  /// Start of the epoch-aligned bucket containing `ts`
  pub fn align(self, ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = self.minutes() * 60;
    let offset = ts.timestamp().rem_euclid(secs);
    ts - Duration::seconds(offset) - Duration::nanoseconds(ts.timestamp_subsec_nanos() as i64)
  }
}

impl fmt::Display for Timeframe {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Timeframe {
  type Err = AnalysisError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "15m" => Ok(Timeframe::M15),
      "30m" => Ok(Timeframe::M30),
      "1h" | "60m" => Ok(Timeframe::H1),
      "4h" => Ok(Timeframe::H4),
      other => Err(AnalysisError::InvalidConfig(format!("unknown timeframe '{other}'"))),
    }
  }
}

/// Aggregate `bars` into `timeframe` buckets: first open, max high, min low,
/// last close, summed volume. Buckets without bars are not emitted.
///
/// Input must be chronological.
pub fn resample<T: OHLCV>(bars: &[T], timeframe: Timeframe) -> Vec<PriceBar> {
  let mut out: Vec<PriceBar> = Vec::new();

  for bar in bars {
    let bucket = timeframe.align(bar.timestamp());
    match out.last_mut() {
      Some(acc) if acc.timestamp == bucket => {
        acc.high = acc.high.max(bar.high());
        acc.low = acc.low.min(bar.low());
        acc.close = bar.close();
        acc.volume += bar.volume();
      },
      _ => out.push(PriceBar::new(
        bucket,
        bar.open(),
        bar.high(),
        bar.low(),
        bar.close(),
        bar.volume(),
      )),
    }
  }

  out
}

// ============================================================
// SOURCES
// ============================================================

/// Synchronous provider of complete bar series.
///
/// `window_days` counts back from now. A failed fetch yields an error, never a
/// partial series.
pub trait BarSource: Send + Sync {
  fn fetch(
    &self,
    instrument: &str,
    timeframe: Timeframe,
    window_days: u32,
  ) -> Result<Vec<PriceBar>>;
}

/// Cache key of one retrieved series
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
  pub instrument: String,
  pub timeframe: Timeframe,
  pub window_days: u32,
}

impl fmt::Display for SeriesKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}/{}d", self.instrument, self.timeframe, self.window_days)
  }
}

/// Memoizes an inner [`BarSource`] by (instrument, timeframe, window days).
///
/// Windows are clamped to the timeframe's history cap before keying. 4h series
/// are fetched at 1h and resampled. Failures are not cached.
pub struct CachedSource<S> {
  inner: S,
  series: RwLock<HashMap<SeriesKey, Arc<Vec<PriceBar>>>>,
}

impl<S: BarSource> CachedSource<S> {
  pub fn new(inner: S) -> Self {
    Self { inner, series: RwLock::new(HashMap::new()) }
  }

  pub fn key(instrument: &str, timeframe: Timeframe, window_days: u32) -> SeriesKey {
    SeriesKey {
      instrument: instrument.to_string(),
      timeframe,
      window_days: window_days.min(timeframe.max_history_days()),
    }
  }

  pub fn get(
    &self,
    instrument: &str,
    timeframe: Timeframe,
    window_days: u32,
  ) -> Result<Arc<Vec<PriceBar>>> {
    let key = Self::key(instrument, timeframe, window_days);
    if let Some(hit) = self.series.read().get(&key) {
      return Ok(Arc::clone(hit));
    }

    let native = timeframe.native();
    let raw = self.inner.fetch(instrument, native, key.window_days).map_err(|e| match e {
      AnalysisError::Source { .. } => e,
      other => {
        AnalysisError::Source { instrument: instrument.to_string(), reason: other.to_string() }
      },
    })?;
    let bars = if native == timeframe { raw } else { resample(&raw, timeframe) };

    tracing::debug!(series = %key, bars = bars.len(), "fetched");

    // A concurrent miss on the same key may have landed first; keep that one.
    let mut series = self.series.write();
    Ok(Arc::clone(series.entry(key).or_insert_with(|| Arc::new(bars))))
  }

  pub fn len(&self) -> usize {
    self.series.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.series.read().is_empty()
  }

  pub fn clear(&self) {
    self.series.write().clear();
  }

  pub fn inner(&self) -> &S {
    &self.inner
  }
}

impl<S: BarSource> BarSource for CachedSource<S> {
  fn fetch(
    &self,
    instrument: &str,
    timeframe: Timeframe,
    window_days: u32,
  ) -> Result<Vec<PriceBar>> {
    self.get(instrument, timeframe, window_days).map(|bars| bars.as_ref().clone())
  }
}
