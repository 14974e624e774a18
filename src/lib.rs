//! # insidebar - inside-bar breakout backtesting engine
//!
//! Scans an ordered price series for the three-candle "big candle -> inside bar ->
//! confirmed breakout" setup, simulates each setup's forward outcome against a
//! fixed-risk model and enriches it with supply/demand zone, session, news and
//! calendar context.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use insidebar::prelude::*;
//!
//! let start = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
//! let bars: Vec<PriceBar> = (0..40)
//!     .map(|i| {
//!         let ts = start + chrono::Duration::hours(i);
//!         PriceBar::new(ts, 100.0, 101.0, 99.0, 100.2, 1000.0)
//!     })
//!     .collect();
//!
//! let analyzer = AnalyzerBuilder::new()
//!     .calendar(MacroCalendar::standard())
//!     .build()
//!     .unwrap();
//!
//! let analysis = analyzer.analyze(&bars).unwrap();
//! assert!(analysis.setups.is_empty());
//! assert!(analysis.funnel.total_scanned > 0);
//! ```

use chrono::{DateTime, Utc};

pub mod calendar;
pub mod detectors;
pub mod enrich;
pub mod params;
pub mod source;
pub mod stats;

pub mod prelude {
    pub use crate::{
        // Calendar
        calendar::{EventCalendar, MacroCalendar},
        // Detectors
        detectors::*,
        // Enrichment
        enrich::{
            Alignment, BreakoutBand, CalendarFields, EnrichedSetup, NewsLabel, Session,
            SetupEnricher, ZoneAlignment, ZoneStrengthBand,
        },
        // Parameters
        params::{AnalysisParams, ParamMeta, ParamType},
        // Parallel
        scan_parallel,
        // Retrieval seam
        source::{resample, BarSource, CachedSource, SeriesKey, Timeframe},
        // Statistics
        stats::{group_by, group_by_key, pivot, Dimension, Stats},
        // Engine
        Analysis,
        AnalysisError,
        Analyzer,
        AnalyzerBuilder,
        AtrContextProvider,
        Candle,
        ContextProvider,
        DefaultAnalyzer,
        Detector,
        Direction,
        MarketContext,
        Multiple,
        OHLCVExt,
        Period,
        PriceBar,
        Ratio,
        Result,
        ScanError,
        ScanResult,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors that can occur while configuring or running an analysis
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },

    #[error("Timestamp at index {index} is not strictly after the previous bar")]
    NonMonotonicTimestamp { index: usize },

    #[error("Price source failed for {instrument}: {reason}")]
    Source { instrument: String, reason: String },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(AnalysisError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(AnalysisError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Strictly positive multiplier (e.g. "body must be 1.3x ATR")
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Multiple(f64);

impl Multiple {
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(AnalysisError::InvalidValue(
                "Multiple cannot be NaN or infinite",
            ));
        }
        if value <= 0.0 {
            return Err(AnalysisError::InvalidValue("Multiple must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Multiple {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Multiple {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Multiple::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(AnalysisError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core trait for timestamped price data.
///
/// Timestamps must already be normalized to one reference time zone (UTC is
/// used throughout) and strictly increasing within a series.
pub trait OHLCV {
    fn timestamp(&self) -> DateTime<Utc>;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn upper_shadow(&self) -> f64 {
        self.high() - self.open().max(self.close())
    }

    #[inline]
    fn lower_shadow(&self) -> f64 {
        self.open().min(self.close()) - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Body as ratio of range. Returns None for a zero-range bar
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > 0.0).then(|| self.body() / range)
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) {
            return Err(AnalysisError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return Err(AnalysisError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if self.high() < self.low() {
            return Err(AnalysisError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        if self.high() < self.open().max(self.close()) || self.low() > self.open().min(self.close())
        {
            return Err(AnalysisError::InvalidOHLCV {
                index: 0,
                reason: "open/close outside high-low range",
            });
        }
        if !(self.volume() >= 0.0) {
            return Err(AnalysisError::InvalidOHLCV {
                index: 0,
                reason: "negative or NaN volume",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Plain OHLCV bar as produced by a market-data source
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for PriceBar {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

/// OHLC snapshot of one bar, copied into setup records
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn of<T: OHLCV>(bar: &T) -> Self {
        Self {
            open: bar.open(),
            high: bar.high(),
            low: bar.low(),
            close: bar.close(),
        }
    }

    #[inline]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

// ============================================================
// DIRECTION
// ============================================================

/// Breakout direction of a setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// Price `r` risk units from `entry` in this direction
    #[inline]
    pub fn level(self, entry: f64, risk: f64, r: f64) -> f64 {
        entry + self.sign() * r * risk
    }

    /// Signed move from `from` to `to`; positive when it goes the trade's way
    #[inline]
    pub fn gain(self, from: f64, to: f64) -> f64 {
        self.sign() * (to - from)
    }

    /// True when `price` is at or beyond `level` in the trade's direction
    #[inline]
    pub fn at_or_beyond(self, price: f64, level: f64) -> bool {
        match self {
            Direction::Long => price >= level,
            Direction::Short => price <= level,
        }
    }

    /// Extreme of a candle that favors the trade (high for long, low for short)
    #[inline]
    pub fn favorable_extreme(self, candle: &Candle) -> f64 {
        match self {
            Direction::Long => candle.high,
            Direction::Short => candle.low,
        }
    }

    #[inline]
    pub fn adverse_extreme(self, candle: &Candle) -> f64 {
        match self {
            Direction::Long => candle.low,
            Direction::Short => candle.high,
        }
    }

    /// Direction implied by a candle's color
    #[inline]
    pub fn of_candle(bullish: bool) -> Self {
        if bullish {
            Direction::Long
        } else {
            Direction::Short
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================
// MARKET CONTEXT
// ============================================================

/// Per-bar volatility context
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarketContext {
    pub true_range: f64,
    /// Rolling ATR; `None` until the window is full
    pub atr: Option<f64>,
}

impl MarketContext {
    /// ATR if available and non-zero. Bars without one never anchor a setup or a zone.
    #[inline]
    pub fn usable_atr(&self) -> Option<f64> {
        self.atr.filter(|atr| *atr > 0.0)
    }
}

/// Provider of market context - precomputes context for all bars
pub trait ContextProvider: Send + Sync {
    fn compute_all<T: OHLCV>(&self, bars: &[T]) -> Vec<MarketContext>;
}

/// Simple-moving-average ATR over a fixed window (14 by default)
#[derive(Debug, Clone)]
pub struct AtrContextProvider {
    pub period: Period,
}

impl Default for AtrContextProvider {
    fn default() -> Self {
        Self {
            period: Period::new_const(detectors::helpers::ATR_PERIOD),
        }
    }
}

impl ContextProvider for AtrContextProvider {
    fn compute_all<T: OHLCV>(&self, bars: &[T]) -> Vec<MarketContext> {
        let true_ranges = detectors::volatility::true_ranges(bars);
        let atr = detectors::volatility::rolling_mean(&true_ranges, self.period.get());

        true_ranges
            .into_iter()
            .zip(atr)
            .map(|(true_range, atr)| MarketContext { true_range, atr })
            .collect()
    }
}

// ============================================================
// DETECTOR TRAIT
// ============================================================

/// A detector evaluated at one anchor bar of a series
pub trait Detector: Send + Sync {
    type Output;

    fn id(&self) -> &'static str;

    /// Minimum series length before the detector produces anything
    fn min_bars(&self) -> usize;

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &MarketContext,
    ) -> Option<Self::Output>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// ANALYZER
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub validate_data: bool,
}

/// Full result of analyzing one series
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Analysis {
    pub setups: Vec<EnrichedSetup>,
    pub zones: Vec<Zone>,
    pub funnel: Funnel,
}

use calendar::{EventCalendar, MacroCalendar};
use detectors::{Funnel, InsideBarDetector, Setup, Zone, ZoneDetector, ZoneMatcher};
use enrich::{EnrichedSetup, SetupEnricher};
use params::AnalysisParams;

/// Main analysis engine: zones, setups, enrichment for one series at a time
pub struct Analyzer<C: ContextProvider = AtrContextProvider> {
    params: AnalysisParams,
    setup_detector: InsideBarDetector,
    zone_detector: ZoneDetector,
    zone_matcher: ZoneMatcher,
    context_provider: C,
    calendar: Box<dyn EventCalendar>,
    config: EngineConfig,
}

impl<C: ContextProvider> Analyzer<C> {
    pub fn params(&self) -> &AnalysisParams {
        &self.params
    }

    /// Precompute volatility contexts for all bars.
    #[inline]
    pub fn compute_contexts<T: OHLCV>(&self, bars: &[T]) -> Vec<MarketContext> {
        self.context_provider.compute_all(bars)
    }

    /// Supply/demand zones for the whole series.
    pub fn detect_zones<T: OHLCV>(&self, bars: &[T], contexts: &[MarketContext]) -> Vec<Zone> {
        if bars.len() < self.zone_detector.min_bars() {
            tracing::debug!(
                detector = self.zone_detector.id(),
                bars = bars.len(),
                "series too short"
            );
            return Vec::new();
        }
        self.zone_detector.scan(bars, contexts)
    }

    /// Raw setups plus the stage funnel of the same pass.
    pub fn detect_setups<T: OHLCV>(
        &self,
        bars: &[T],
        contexts: &[MarketContext],
    ) -> (Vec<Setup>, Funnel) {
        if bars.len() < self.setup_detector.min_bars() {
            tracing::debug!(
                detector = self.setup_detector.id(),
                bars = bars.len(),
                "series too short"
            );
            return (Vec::new(), Funnel::default());
        }
        self.setup_detector.scan(bars, contexts)
    }

    /// Attach zone, session, news and calendar context to raw setups.
    pub fn enrich<T: OHLCV>(
        &self,
        bars: &[T],
        setups: Vec<Setup>,
        zones: &[Zone],
    ) -> Vec<EnrichedSetup> {
        SetupEnricher::new(&self.zone_matcher, self.calendar.as_ref()).enrich(bars, setups, zones)
    }

    /// Run the full pipeline over one series.
    pub fn analyze<T: OHLCV>(&self, bars: &[T]) -> Result<Analysis> {
        if self.config.validate_data {
            self.validate_bars(bars)?;
        }

        let contexts = self.compute_contexts(bars);
        let zones = self.detect_zones(bars, &contexts);
        let (setups, funnel) = self.detect_setups(bars, &contexts);
        let setups = self.enrich(bars, setups, &zones);

        tracing::info!(
            bars = bars.len(),
            zones = zones.len(),
            setups = setups.len(),
            scanned = funnel.total_scanned,
            "analysis complete"
        );

        Ok(Analysis {
            setups,
            zones,
            funnel,
        })
    }

    fn validate_bars<T: OHLCV>(&self, bars: &[T]) -> Result<()> {
        for (i, bar) in bars.iter().enumerate() {
            bar.validate().map_err(|e| match e {
                AnalysisError::InvalidOHLCV { reason, .. } => {
                    AnalysisError::InvalidOHLCV { index: i, reason }
                }
                other => other,
            })?;
        }
        for (i, pair) in bars.windows(2).enumerate() {
            if pair[1].timestamp() <= pair[0].timestamp() {
                return Err(AnalysisError::NonMonotonicTimestamp { index: i + 1 });
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.params.validate()?;
        self.setup_detector.validate_config()?;
        self.zone_detector.validate_config()?;
        self.zone_matcher.validate_config()?;
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating Analyzer instances
///
/// Defaults: [`AnalysisParams::default`], a 14-bar [`AtrContextProvider`],
/// an empty event calendar and no data validation.
pub struct AnalyzerBuilder<C: ContextProvider = AtrContextProvider> {
    params: AnalysisParams,
    context_provider: C,
    calendar: Box<dyn EventCalendar>,
    config: EngineConfig,
}

impl Default for AnalyzerBuilder<AtrContextProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerBuilder<AtrContextProvider> {
    pub fn new() -> Self {
        Self {
            params: AnalysisParams::default(),
            context_provider: AtrContextProvider::default(),
            calendar: Box::new(MacroCalendar::empty()),
            config: EngineConfig::default(),
        }
    }
}

impl<C: ContextProvider> AnalyzerBuilder<C> {
    /// Change context provider
    pub fn context_provider<C2: ContextProvider>(self, provider: C2) -> AnalyzerBuilder<C2> {
        AnalyzerBuilder {
            params: self.params,
            context_provider: provider,
            calendar: self.calendar,
            config: self.config,
        }
    }

    /// Replace the whole parameter set
    pub fn params(mut self, params: AnalysisParams) -> Self {
        self.params = params;
        self
    }

    /// Inject the set of major macro-event dates
    pub fn calendar<E: EventCalendar + 'static>(mut self, calendar: E) -> Self {
        self.calendar = Box::new(calendar);
        self
    }

    /// Enable/disable data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Build the analyzer
    pub fn build(self) -> Result<Analyzer<C>> {
        let analyzer = Analyzer {
            setup_detector: InsideBarDetector::from_params(&self.params),
            zone_detector: ZoneDetector::from_params(&self.params),
            zone_matcher: ZoneMatcher::from_params(&self.params),
            params: self.params,
            context_provider: self.context_provider,
            calendar: self.calendar,
            config: self.config,
        };
        analyzer.validate()?;
        Ok(analyzer)
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Result of analyzing a single instrument/timeframe series
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    pub analysis: Analysis,
}

/// Error from analyzing a single instrument/timeframe series
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: AnalysisError,
}

/// Parallel analysis of independent series.
///
/// Each series is analyzed on its own; nothing is shared between them but the
/// read-only analyzer.
pub fn scan_parallel<'a, T, I, C>(
    analyzer: &Analyzer<C>,
    instruments: I,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
    C: ContextProvider + Sync,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            analyzer
                .analyze(bars)
                .map(|analysis| ScanResult {
                    symbol: symbol.to_string(),
                    analysis,
                })
                .map_err(|error| {
                    tracing::warn!(symbol, %error, "series rejected");
                    ScanError {
                        symbol: symbol.to_string(),
                        error,
                    }
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

/// Default analyzer with the 14-bar ATR provider
pub type DefaultAnalyzer = Analyzer<AtrContextProvider>;

// ============================================================
// TESTS
// ============================================================
