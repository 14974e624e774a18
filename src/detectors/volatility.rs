//! Volatility estimator: true range and its simple rolling mean (ATR).

use crate::OHLCV;

/// True range of every bar. The first bar has no previous close, so its true
/// range is its own high - low.
pub fn true_ranges<T: OHLCV>(bars: &[T]) -> Vec<f64> {
  let mut out = Vec::with_capacity(bars.len());
  let mut prev_close: Option<f64> = None;

  for bar in bars {
    let hl = bar.high() - bar.low();
    let tr = match prev_close {
      Some(pc) => hl.max((bar.high() - pc).abs()).max((bar.low() - pc).abs()),
      None => hl,
    };
    out.push(tr);
    prev_close = Some(bar.close());
  }

  out
}

/// Simple rolling mean over `period` values. The first `period - 1` entries are
/// `None`; an unavailable value is never reported as zero.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<Option<f64>> {
  if period == 0 {
    return vec![None; values.len()];
  }
  (0..values.len())
    .map(|i| {
      (i + 1 >= period).then(|| {
        let window = &values[i + 1 - period..=i];
        window.iter().sum::<f64>() / period as f64
      })
    })
    .collect()
}
