//! Property tests over generated price series.

use chrono::{DateTime, Duration, TimeZone, Utc};
use insidebar::prelude::*;
use proptest::prelude::*;

// ============================================================
// TestBar + OHLCV impl
// ============================================================

#[derive(Debug, Clone, Copy)]
struct TestBar {
    t: DateTime<Utc>,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
}

impl OHLCV for TestBar {
    fn timestamp(&self) -> DateTime<Utc> {
        self.t
    }

    fn open(&self) -> f64 {
        self.o
    }

    fn high(&self) -> f64 {
        self.h
    }

    fn low(&self) -> f64 {
        self.l
    }

    fn close(&self) -> f64 {
        self.c
    }

    fn volume(&self) -> f64 {
        1000.0
    }
}

/// (close change, upper wick, lower wick) per bar
fn moves() -> impl Strategy<Value = Vec<(f64, f64, f64)>> {
    prop::collection::vec((-4.0f64..4.0, 0.0f64..2.0, 0.0f64..2.0), 20..160)
}

fn build(moves: &[(f64, f64, f64)]) -> Vec<TestBar> {
    let start = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
    let mut price = 500.0;
    moves
        .iter()
        .enumerate()
        .map(|(i, &(change, up, down))| {
            let o = price;
            let c = (price + change).max(1.0);
            price = c;
            TestBar {
                t: start + Duration::hours(i as i64),
                o,
                h: o.max(c) + up,
                l: o.min(c) - down,
                c,
            }
        })
        .collect()
}

fn engine() -> DefaultAnalyzer {
    AnalyzerBuilder::new().validate_data(true).build().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_accepted_setups_hold_invariants(moves in moves()) {
        let bars = build(&moves);
        let analysis = engine().analyze(&bars).unwrap();

        for s in &analysis.setups {
            prop_assert!(s.c2.high <= s.c1.high && s.c2.low >= s.c1.low);
            prop_assert!(s.risk > 0.0);
            let beyond = match s.direction {
                Direction::Long => s.c3.close > s.c2.high,
                Direction::Short => s.c3.close < s.c2.low,
            };
            prop_assert!(beyond);
            prop_assert_eq!(s.entry, s.c3.close);
            prop_assert!(s.outcome.mfe_r >= 0.0 && s.outcome.mae_r >= 0.0);
            prop_assert!(s.outcome.bars <= 20);
            if s.outcome.hit_2r {
                prop_assert!(s.outcome.hit_1_5r && s.outcome.hit_1r);
            }
            let followed = s.follow_through.iter().flatten().filter(|c| c.followed).count();
            prop_assert_eq!(s.follow_count, followed);
        }
    }

    #[test]
    fn prop_funnel_is_monotone_and_matches_output(moves in moves()) {
        let bars = build(&moves);
        let analysis = engine().analyze(&bars).unwrap();
        let f = analysis.funnel;

        prop_assert!(f.pass_body_ratio <= f.total_scanned);
        prop_assert!(f.pass_body_atr <= f.total_scanned);
        prop_assert!(f.pass_both_c1 <= f.pass_body_ratio.min(f.pass_body_atr));
        prop_assert!(f.pass_inside_bar <= f.pass_both_c1);
        prop_assert!(f.pass_c3_breakout <= f.pass_inside_bar);
        prop_assert!(f.pass_valid_risk <= f.pass_c3_breakout);
        prop_assert_eq!(f.pass_valid_risk, analysis.setups.len());

        let stages = f.stages();
        prop_assert_eq!(stages[0], ("total_scanned", f.total_scanned));
        prop_assert_eq!(stages[6].1, analysis.setups.len());
    }

    #[test]
    fn prop_analysis_is_deterministic(moves in moves()) {
        let bars = build(&moves);
        let engine = engine();
        let first = engine.analyze(&bars).unwrap();
        let second = engine.analyze(&bars).unwrap();

        prop_assert_eq!(&first.setups, &second.setups);
        prop_assert_eq!(&first.zones, &second.zones);
        prop_assert_eq!(first.funnel, second.funnel);
    }

    #[test]
    fn prop_cumulative_pnl_is_running_sum(moves in moves()) {
        let bars = build(&moves);
        let setups = engine().analyze(&bars).unwrap().setups;

        let mut running = 0.0;
        for pair in setups.windows(2) {
            prop_assert!(pair[0].timestamp < pair[1].timestamp);
        }
        for s in &setups {
            running += s.pnl_r;
            prop_assert_eq!(s.cumulative_r, running);
            prop_assert_eq!(s.pnl_r, if s.win { 1.0 } else { -1.0 });
        }
    }

    #[test]
    fn prop_zones_respect_warmup_and_strength(moves in moves()) {
        let bars = build(&moves);
        let analysis = engine().analyze(&bars).unwrap();
        let minimum = engine().params().zone_strength_minimum.get();

        for z in &analysis.zones {
            prop_assert!(z.top >= z.bottom);
            prop_assert!(z.strength >= minimum - 1e-9);
            prop_assert!(z.origin >= bars[20].t);
        }
    }
}
