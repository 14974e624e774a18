//! Inside-bar breakout detector
//!
//! Setup at anchor `i`:
//! - **C1** (`i`): big candle, body/range >= `body_ratio_threshold` and
//!   body >= `atr_multiplier` x ATR
//! - **C2** (`i+1`): inside bar, fully within C1's high/low
//! - **C3** (`i+2`): closes strictly beyond C2's range, which sets the direction
//!
//! Entry is C3's close, the stop is the opposite extreme of C2 and one risk
//! unit (R) is the distance between them. The outcome is simulated over the
//! bars after C3.
//!
//! Gate evaluation happens once per anchor; the stage funnel is derived from
//! the same evaluation so the two can never disagree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
  helpers::{
    BARS_AFTER_ANCHOR, FIRST_ANCHOR, FOLLOW_THROUGH, LOOKAHEAD, MIN_SERIES_BARS, TARGET_1R,
    TARGET_1_5R, TARGET_2R,
  },
  wick::{WickBucket, WickProfile},
};
use crate::{
  params::AnalysisParams, Candle, Detector, Direction, MarketContext, Multiple, OHLCVExt, Period,
  Ratio, Result, OHLCV,
};

// ============================================================
// SETUP RECORD
// ============================================================

/// How far C3 closed beyond C2's range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakoutMargin {
  pub absolute: f64,
  /// Percent of entry price
  pub pct: f64,
  /// In risk units
  pub r: f64,
}

/// One follow-through candle (C4, C5 or C6) measured from entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandleOutcome {
  pub candle: Candle,
  /// Close in risk units, positive in the breakout direction
  pub close_r: f64,
  /// This candle's own favorable excursion, floored at zero
  pub mfe_r: f64,
  /// This candle's own adverse excursion, floored at zero
  pub mae_r: f64,
  /// Close progressed beyond entry in the breakout direction
  pub followed: bool,
}

impl CandleOutcome {
  pub fn measure(candle: Candle, direction: Direction, entry: f64, risk: f64) -> Self {
    let close_r = direction.gain(entry, candle.close) / risk;
    let mfe_r = (direction.gain(entry, direction.favorable_extreme(&candle)) / risk).max(0.0);
    let mae_r = (-direction.gain(entry, direction.adverse_extreme(&candle)) / risk).max(0.0);

    Self { candle, close_r, mfe_r, mae_r, followed: close_r > 0.0 }
  }
}

/// Which of stop-loss or 1R was touched first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FirstHit {
  StopLoss,
  OneR,
}

/// Path-dependent result over the lookahead window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
  pub hit_sl: bool,
  pub hit_1r: bool,
  pub hit_1_5r: bool,
  pub hit_2r: bool,
  pub first_hit: Option<FirstHit>,
  /// Maximum favorable excursion in R, floored at zero
  pub mfe_r: f64,
  /// Maximum adverse excursion in R, floored at zero
  pub mae_r: f64,
  /// Bars actually simulated
  pub bars: usize,
}

/// One accepted big-candle / inside-bar / breakout setup.
///
/// Identity is the C1 timestamp. Nothing here changes after detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setup {
  pub timestamp: DateTime<Utc>,
  /// Index of C1 in the series
  pub index: usize,

  pub c1: Candle,
  pub c1_wick: WickProfile,
  pub c1_body: f64,
  pub c1_range: f64,
  pub c1_body_ratio: f64,
  pub c1_atr: f64,

  pub c2: Candle,
  pub c2_wick: WickProfile,

  pub c3: Candle,
  pub c3_bullish: bool,

  pub direction: Direction,
  pub entry: f64,
  pub stop_loss: f64,
  pub risk: f64,
  /// Risk as a percent of entry
  pub risk_pct: f64,
  pub breakout: BreakoutMargin,

  /// C4, C5, C6; `None` past the end of the series
  pub follow_through: [Option<CandleOutcome>; FOLLOW_THROUGH],
  pub follow_count: usize,

  pub outcome: Outcome,
  pub win: bool,
}

impl Setup {
  #[inline]
  pub fn c1_bullish(&self) -> bool {
    self.c1_wick.bullish
  }

  #[inline]
  pub fn c2_bullish(&self) -> bool {
    self.c2_wick.bullish
  }

  /// C1's own direction matches the breakout
  #[inline]
  pub fn c1_direction_match(&self) -> bool {
    Direction::of_candle(self.c1_bullish()) == self.direction
  }

  /// e.g. `C1:Green/Full Body -> C2:Red/Lower Wick`
  pub fn scenario_key(&self) -> String {
    fn color(bullish: bool) -> &'static str {
      if bullish {
        "Green"
      } else {
        "Red"
      }
    }
    let c1: WickBucket = self.c1_wick.label.bucket();
    let c2: WickBucket = self.c2_wick.label.bucket();
    format!(
      "C1:{}/{} -> C2:{}/{}",
      color(self.c1_bullish()),
      c1,
      color(self.c2_bullish()),
      c2
    )
  }

  /// +1R for a win, -1R for a loss
  #[inline]
  pub fn pnl_r(&self) -> f64 {
    if self.win {
      1.0
    } else {
      -1.0
    }
  }

  /// Price of the level `r` risk units from entry in the trade's direction
  #[inline]
  pub fn target(&self, r: f64) -> f64 {
    self.direction.level(self.entry, self.risk, r)
  }
}

// ============================================================
// FUNNEL
// ============================================================

/// Why an anchor did not produce a setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
  /// Not scanned: ATR unavailable or zero
  NoAtr,
  /// Not scanned: too close to the end of the series
  Incomplete,
  /// C1 failed one or both big-candle gates
  BigCandle { ratio_ok: bool, size_ok: bool },
  NotInside,
  NoBreakout,
  NonPositiveRisk,
}

/// Cumulative count of anchors passing each stage of one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Funnel {
  pub total_scanned: usize,
  pub pass_body_ratio: usize,
  pub pass_body_atr: usize,
  pub pass_both_c1: usize,
  pub pass_inside_bar: usize,
  pub pass_c3_breakout: usize,
  pub pass_valid_risk: usize,
}

impl Funnel {
  /// Count one anchor's evaluation.
  pub fn record(&mut self, evaluation: &core::result::Result<Setup, Rejection>) {
    let (ratio_ok, size_ok) = match evaluation {
      Err(Rejection::NoAtr | Rejection::Incomplete) => return,
      Err(Rejection::BigCandle { ratio_ok, size_ok }) => (*ratio_ok, *size_ok),
      _ => (true, true),
    };

    self.total_scanned += 1;
    self.pass_body_ratio += ratio_ok as usize;
    self.pass_body_atr += size_ok as usize;
    if !(ratio_ok && size_ok) {
      return;
    }
    self.pass_both_c1 += 1;

    match evaluation {
      Err(Rejection::NotInside) => {},
      Err(Rejection::NoBreakout) => self.pass_inside_bar += 1,
      Err(Rejection::NonPositiveRisk) => {
        self.pass_inside_bar += 1;
        self.pass_c3_breakout += 1;
      },
      Ok(_) => {
        self.pass_inside_bar += 1;
        self.pass_c3_breakout += 1;
        self.pass_valid_risk += 1;
      },
      Err(_) => {},
    }
  }

  /// Stage name -> count, in pipeline order
  pub fn stages(&self) -> [(&'static str, usize); 7] {
    [
      ("total_scanned", self.total_scanned),
      ("pass_body_ratio", self.pass_body_ratio),
      ("pass_body_atr", self.pass_body_atr),
      ("pass_both_c1", self.pass_both_c1),
      ("pass_inside_bar", self.pass_inside_bar),
      ("pass_c3_breakout", self.pass_c3_breakout),
      ("pass_valid_risk", self.pass_valid_risk),
    ]
  }
}

// ============================================================
// DETECTOR
// ============================================================

/// Big candle -> inside bar -> confirmed breakout
#[derive(Debug, Clone)]
pub struct InsideBarDetector {
  pub body_ratio_threshold: Ratio,
  pub atr_multiplier: Multiple,
  /// Outcome simulation window after the breakout bar
  pub lookahead: Period,
}

impl Default for InsideBarDetector {
  fn default() -> Self {
    Self {
      body_ratio_threshold: Ratio::new_const(0.65),
      atr_multiplier: Multiple::new_const(1.3),
      lookahead: Period::new_const(LOOKAHEAD),
    }
  }
}

impl InsideBarDetector {
  pub fn from_params(params: &AnalysisParams) -> Self {
    Self {
      body_ratio_threshold: params.body_ratio_threshold,
      atr_multiplier: params.atr_multiplier,
      ..Self::default()
    }
  }

  /// Anchor indices considered for a series of `len` bars
  pub fn anchors(len: usize) -> std::ops::Range<usize> {
    if len < MIN_SERIES_BARS {
      return 0..0;
    }
    FIRST_ANCHOR..len.saturating_sub(BARS_AFTER_ANCHOR)
  }

  /// Scan every anchor. Anchors are independent: overlapping setups from
  /// adjacent anchors are all kept.
  pub fn scan<T: OHLCV>(&self, bars: &[T], contexts: &[MarketContext]) -> (Vec<Setup>, Funnel) {
    let mut setups = Vec::new();
    let mut funnel = Funnel::default();

    for i in Self::anchors(bars.len()) {
      let Some(ctx) = contexts.get(i) else {
        break;
      };
      let evaluation = self.evaluate(bars, i, ctx);
      funnel.record(&evaluation);
      if let Ok(setup) = evaluation {
        tracing::trace!(index = i, direction = %setup.direction, win = setup.win, "setup");
        setups.push(setup);
      }
    }

    tracing::debug!(
      bars = bars.len(),
      scanned = funnel.total_scanned,
      setups = setups.len(),
      "inside-bar scan"
    );

    (setups, funnel)
  }

  /// Run every gate at anchor `index` and, if all pass, build the setup.
  pub fn evaluate<T: OHLCV>(
    &self,
    bars: &[T],
    index: usize,
    ctx: &MarketContext,
  ) -> core::result::Result<Setup, Rejection> {
    if bars.len() <= index + BARS_AFTER_ANCHOR {
      return Err(Rejection::Incomplete);
    }
    let atr = ctx.usable_atr().ok_or(Rejection::NoAtr)?;
    let c1 = &bars[index];
    let c2 = &bars[index + 1];
    let c3 = &bars[index + 2];

    // C1: big candle
    let body = c1.body();
    let ratio_ok = c1.body_ratio().is_some_and(|r| r >= self.body_ratio_threshold.get());
    let size_ok = body >= atr * self.atr_multiplier.get();
    if !(ratio_ok && size_ok) {
      return Err(Rejection::BigCandle { ratio_ok, size_ok });
    }

    // C2: inside bar
    if !(c2.high() <= c1.high() && c2.low() >= c1.low()) {
      return Err(Rejection::NotInside);
    }

    // C3: close strictly beyond C2's range
    let direction = if c3.close() > c2.high() {
      Direction::Long
    } else if c3.close() < c2.low() {
      Direction::Short
    } else {
      return Err(Rejection::NoBreakout);
    };

    let entry = c3.close();
    let stop_loss = match direction {
      Direction::Long => c2.low(),
      Direction::Short => c2.high(),
    };
    let risk = direction.gain(stop_loss, entry);
    if risk <= 0.0 {
      return Err(Rejection::NonPositiveRisk);
    }

    let boundary = match direction {
      Direction::Long => c2.high(),
      Direction::Short => c2.low(),
    };
    let margin = direction.gain(boundary, entry);

    let mut follow_through = [None; FOLLOW_THROUGH];
    for (k, slot) in follow_through.iter_mut().enumerate() {
      *slot = bars
        .get(index + 3 + k)
        .map(|bar| CandleOutcome::measure(Candle::of(bar), direction, entry, risk));
    }
    let follow_count = follow_through.iter().flatten().filter(|c| c.followed).count();

    let outcome = self.simulate(bars, index + 3, direction, entry, stop_loss, risk);
    let win = match outcome.first_hit {
      Some(FirstHit::OneR) => true,
      Some(FirstHit::StopLoss) => false,
      // Neither level touched in the window: fall back to C4 finishing in profit
      None => follow_through[0].is_some_and(|c4| c4.close_r > 0.0),
    };

    Ok(Setup {
      timestamp: c1.timestamp(),
      index,
      c1: Candle::of(c1),
      c1_wick: WickProfile::of(c1),
      c1_body: body,
      c1_range: c1.range(),
      c1_body_ratio: c1.body_ratio().unwrap_or(0.0),
      c1_atr: atr,
      c2: Candle::of(c2),
      c2_wick: WickProfile::of(c2),
      c3: Candle::of(c3),
      c3_bullish: c3.is_bullish(),
      direction,
      entry,
      stop_loss,
      risk,
      risk_pct: risk / entry * 100.0,
      breakout: BreakoutMargin { absolute: margin, pct: margin / entry * 100.0, r: margin / risk },
      follow_through,
      follow_count,
      outcome,
      win,
    })
  }

  /// Walk bars `start..start + lookahead` tracking excursions and level touches.
  ///
  /// On each bar the stop is checked before 1R, so a bar touching both counts
  /// as a stop-out when neither was hit earlier.
  pub fn simulate<T: OHLCV>(
    &self,
    bars: &[T],
    start: usize,
    direction: Direction,
    entry: f64,
    stop_loss: f64,
    risk: f64,
  ) -> Outcome {
    let end = (start + self.lookahead.get()).min(bars.len());
    let target_1r = direction.level(entry, risk, TARGET_1R);
    let target_1_5r = direction.level(entry, risk, TARGET_1_5R);
    let target_2r = direction.level(entry, risk, TARGET_2R);

    let mut out = Outcome::default();

    for bar in bars.get(start..end).unwrap_or_default() {
      let candle = Candle::of(bar);
      let favorable = direction.favorable_extreme(&candle);
      let adverse = direction.adverse_extreme(&candle);

      out.mfe_r = out.mfe_r.max(direction.gain(entry, favorable) / risk);
      out.mae_r = out.mae_r.max(-direction.gain(entry, adverse) / risk);

      if !out.hit_sl && direction.at_or_beyond(stop_loss, adverse) {
        out.hit_sl = true;
        out.first_hit.get_or_insert(FirstHit::StopLoss);
      }
      if !out.hit_1r && direction.at_or_beyond(favorable, target_1r) {
        out.hit_1r = true;
        out.first_hit.get_or_insert(FirstHit::OneR);
      }
      out.hit_1_5r |= direction.at_or_beyond(favorable, target_1_5r);
      out.hit_2r |= direction.at_or_beyond(favorable, target_2r);
      out.bars += 1;
    }

    out
  }
}

impl Detector for InsideBarDetector {
  type Output = Setup;

  fn id(&self) -> &'static str {
    "INSIDE_BAR_BREAKOUT"
  }

  fn min_bars(&self) -> usize {
    MIN_SERIES_BARS
  }

  fn detect<T: OHLCV>(&self, bars: &[T], index: usize, ctx: &MarketContext) -> Option<Setup> {
    if bars.len() < MIN_SERIES_BARS || index < FIRST_ANCHOR {
      return None;
    }
    self.evaluate(bars, index, ctx).ok()
  }

  fn validate_config(&self) -> Result<()> {
    if self.lookahead.get() < FOLLOW_THROUGH {
      return Err(crate::AnalysisError::InvalidConfig(format!(
        "lookahead {} shorter than the {FOLLOW_THROUGH} follow-through candles",
        self.lookahead.get()
      )));
    }
    Ok(())
  }
}
