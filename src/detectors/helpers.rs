//! Constants and small numeric helpers shared across detector modules.

// ============================================================
// WINDOWS
// ============================================================

/// Rolling window of the volatility estimator
pub const ATR_PERIOD: usize = 14;
/// First bar index that may anchor a setup (ATR is needed on the anchor)
pub const FIRST_ANCHOR: usize = 14;
/// First bar index that may originate a zone (ATR warm-up plus margin)
pub const ZONE_WARMUP: usize = 20;
/// Series shorter than this produce no setups at all
pub const MIN_SERIES_BARS: usize = 20;
/// Bars that must exist after an anchor: C2, C3 and three follow-through candles, plus one
pub const BARS_AFTER_ANCHOR: usize = 6;
/// Follow-through candles tracked individually after the breakout bar
pub const FOLLOW_THROUGH: usize = 3;
/// Outcome simulation window, counted from the first bar after the breakout
pub const LOOKAHEAD: usize = 20;

// ============================================================
// OUTCOME LEVELS (in risk units)
// ============================================================

pub const TARGET_1R: f64 = 1.0;
pub const TARGET_1_5R: f64 = 1.5;
pub const TARGET_2R: f64 = 2.0;

// ============================================================
// WICK THRESHOLDS (percent of range)
// ============================================================

/// Body below this is a doji
pub const DOJI_BODY_PCT: f64 = 10.0;
/// Both wicks above this: wicks both sides
pub const BOTH_WICKS_PCT: f64 = 30.0;
/// A heavy wick must exceed this and be twice the other one
pub const HEAVY_WICK_PCT: f64 = 20.0;
/// Body above this is a full body
pub const FULL_BODY_PCT: f64 = 75.0;
/// Margin one wick needs over the other to be "slight"
pub const SLIGHT_WICK_MARGIN_PCT: f64 = 5.0;

// ============================================================
// HELPER FUNCTIONS
// ============================================================

/// `part` as a percentage of `whole`. Caller guarantees `whole > 0`.
#[inline]
pub fn pct(part: f64, whole: f64) -> f64 {
    part / whole * 100.0
}

/// Linear-interpolated quantile (0.0..=1.0) of an unsorted sample.
/// Returns None for an empty sample.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}
