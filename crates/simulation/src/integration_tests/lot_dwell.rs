//! Lot dwell and conversion: restricted mass must sit out the minimum
//! dwell before the clearance queue converts it.
//!
//! Dwell windows are scaled down from the production ~36/54/72 h so the
//! suite stays fast; the ordering and eligibility semantics are identical.

use crate::test_harness::TestCorridor;

const MIN_WAIT_S: f32 = 1_800.0;

fn corridor() -> TestCorridor {
    TestCorridor::new(32, 100.0)
        .with_seed(21)
        .with_highway(1, 16, 30, 16)
        .with_highway(6, 12, 6, 16)
        .with_lot(1, 4, 8, 8, 11)
        .with_gate(1, 16)
        .with_source(1, 30, 16, 1.0)
        .with_flat_scenario(10_000.0, 50_000.0)
        .with_params(|p| {
            p.sources.restricted_fraction = 0.65;
            p.clearance.min_wait_s = MIN_WAIT_S;
            p.clearance.target_dwell_s = 2_700.0;
            p.clearance.max_wait_s = 3_600.0;
        })
        .attach()
}

#[test]
fn test_no_conversion_before_minimum_dwell() {
    let mut c = corridor();
    // Arrivals can be no older than the run itself, so before one minimum
    // dwell has elapsed nothing can clear.
    c.run_sim_seconds(f64::from(MIN_WAIT_S) * 0.95);
    assert_eq!(c.stats().converted_total_kg, 0.0);
    assert_eq!(c.queue().serviced, 0);
}

#[test]
fn test_conversion_starts_and_respects_dwell() {
    let mut c = corridor();
    c.run_sim_hours(4.0);
    let queue = c.queue();
    assert!(queue.serviced > 0, "no truck cleared after 4 h");
    assert!(
        queue.min_observed_dwell_s >= f64::from(MIN_WAIT_S),
        "a truck cleared after only {:.0} s",
        queue.min_observed_dwell_s
    );
    assert_eq!(queue.order_violations, 0);
    let stats = c.stats();
    assert!(stats.converted_total_kg > 0.0);
    // Conversion can never outrun restricted arrivals.
    assert!(stats.converted_total_kg <= stats.injected_restricted_kg);
}

#[test]
fn test_lot_fill_stays_below_threshold_fraction() {
    let mut c = corridor();
    c.run_sim_hours(4.0);
    for lot in &c.lots().lots {
        assert!(
            lot.fill_fraction() < 0.95,
            "lot {} fill {:.2}",
            lot.id,
            lot.fill_fraction()
        );
    }
    assert_eq!(c.violations().lot_over_capacity, 0);
}

#[test]
fn test_cleared_share_flows_straight_to_gate() {
    let mut c = corridor();
    c.run_sim_hours(1.0);
    let stats = c.stats();
    // The 35% pre-cleared share drains without waiting for any dwell.
    assert!(stats.drained_total_kg > 0.0);
    assert!(stats.injected_cleared_kg > 0.0);
    // Exported mass can only come from the pre-cleared share plus whatever
    // the queue has converted so far.
    assert!(stats.drained_total_kg <= stats.injected_cleared_kg + stats.converted_total_kg + 1.0);
}
