//! Benchmarks for the inside-bar analysis pipeline.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use insidebar::prelude::*;

/// Deterministic hourly bars with occasional large candles and inside bars
fn generate_bars(n: usize) -> Vec<PriceBar> {
  let start = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();
  let mut bars = Vec::with_capacity(n);
  let mut price = 100.0;

  for i in 0..n {
    let change = ((i * 7 + 13) % 100) as f64 / 50.0 - 1.0; // Deterministic "random"
    let burst = if i % 37 == 0 { 4.0 } else { 1.0 };
    let volatility = 2.0 + ((i * 3) % 10) as f64 / 5.0;

    let o = price;
    let c = price + change * burst;
    let h = o.max(c) + volatility * 0.3;
    let l = o.min(c) - volatility * 0.3;

    bars.push(PriceBar::new(start + Duration::hours(i as i64), o, h, l, c, 1000.0));
    price = c;
  }

  bars
}

fn analyzer() -> DefaultAnalyzer {
  AnalyzerBuilder::new().calendar(MacroCalendar::standard()).build().unwrap()
}

fn bench_analyze(c: &mut Criterion) {
  let bars = generate_bars(1000);
  let engine = analyzer();

  c.bench_function("analyze_1000_bars", |b| {
    b.iter(|| {
      let _ = black_box(engine.analyze(black_box(&bars)));
    })
  });
}

fn bench_scaling(c: &mut Criterion) {
  let engine = analyzer();

  let mut group = c.benchmark_group("scaling");

  for size in [100, 500, 1000, 5000, 10000].iter() {
    let bars = generate_bars(*size);

    group.bench_with_input(BenchmarkId::new("analyze", size), size, |b, _| {
      b.iter(|| {
        let _ = black_box(engine.analyze(black_box(&bars)));
      })
    });
  }

  group.finish();
}

fn bench_parallel_scan(c: &mut Criterion) {
  let bars1 = generate_bars(1000);
  let bars2 = generate_bars(1000);
  let bars3 = generate_bars(1000);
  let bars4 = generate_bars(1000);

  let engine = analyzer();

  let instruments: Vec<(&str, &[PriceBar])> =
    vec![("SYM1", &bars1), ("SYM2", &bars2), ("SYM3", &bars3), ("SYM4", &bars4)];

  c.bench_function("parallel_scan_4_instruments", |b| {
    b.iter(|| {
      let _ = black_box(scan_parallel(black_box(&engine), black_box(instruments.clone())));
    })
  });
}

fn bench_stages(c: &mut Criterion) {
  let bars = generate_bars(5000);
  let engine = analyzer();
  let contexts = engine.compute_contexts(&bars);
  let zones = engine.detect_zones(&bars, &contexts);

  c.bench_function("compute_contexts_5000_bars", |b| {
    b.iter(|| black_box(engine.compute_contexts(black_box(&bars))))
  });

  c.bench_function("detect_setups_5000_bars", |b| {
    b.iter(|| black_box(engine.detect_setups(black_box(&bars), black_box(&contexts))))
  });

  let (setups, _) = engine.detect_setups(&bars, &contexts);
  c.bench_function("enrich_5000_bars", |b| {
    b.iter(|| black_box(engine.enrich(black_box(&bars), setups.clone(), black_box(&zones))))
  });
}

fn bench_zone_matching(c: &mut Criterion) {
  let bars = generate_bars(5000);
  let engine = analyzer();
  let contexts = engine.compute_contexts(&bars);
  let zones = engine.detect_zones(&bars, &contexts);
  let matcher = ZoneMatcher::default();
  let query = &bars[4000];

  c.bench_function("classify_zone", |b| {
    b.iter(|| black_box(matcher.classify(black_box(query.timestamp), query.close, &zones)))
  });
}

criterion_group!(
  benches,
  bench_analyze,
  bench_scaling,
  bench_parallel_scan,
  bench_stages,
  bench_zone_matching,
);

criterion_main!(benches);
