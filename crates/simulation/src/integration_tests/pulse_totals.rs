//! Pulse texture preserves scheduled totals: shaped injection still sums
//! to the hourly schedule.

use crate::test_harness::TestCorridor;

#[test]
fn test_hourly_injection_totals_survive_pulse() {
    let mut c = TestCorridor::new(32, 100.0)
        .with_seed(61)
        .with_highway(1, 16, 30, 16)
        .with_gate(1, 16)
        .with_source(1, 30, 16, 1.0)
        .with_flat_scenario(30_000.0, 200_000.0)
        .with_params(|p| p.sources.restricted_fraction = 0.0)
        .attach();

    let mut hourly = Vec::new();
    let mut last_total = c.stats().injected_total_kg;
    for _ in 0..4 {
        c.run_sim_hours(1.0);
        let total = c.stats().injected_total_kg;
        hourly.push(total - last_total);
        last_total = total;
    }

    for (hour, injected) in hourly.iter().enumerate() {
        let deviation = (injected - 30_000.0).abs() / 30_000.0;
        assert!(
            deviation < 0.035,
            "hour {hour}: injected {injected:.0} kg deviates {:.1}%",
            deviation * 100.0
        );
    }
}

#[test]
fn test_day_total_tight() {
    let mut c = TestCorridor::new(24, 100.0)
        .with_seed(62)
        .with_highway(1, 12, 22, 12)
        .with_gate(1, 12)
        .with_source(1, 22, 12, 1.0)
        .with_flat_scenario(30_000.0, 400_000.0)
        .with_params(|p| p.sources.restricted_fraction = 0.0)
        .attach();
    // Run a full simulated day at 6x (just under the dt clamp) so the
    // test stays quick.
    c.clock_mut().set_speed(6.0);
    c.run_sim_hours(24.0);
    let injected = c.stats().injected_total_kg;
    let expected = 24.0 * 30_000.0;
    assert!(
        (injected - expected).abs() < 0.01 * expected,
        "day total {injected:.0} kg vs {expected:.0}"
    );
}
