//! Hard capacity ceiling: an undersized lot pegs at its threshold and the
//! surplus backs up on the road.

use crate::test_harness::TestCorridor;

fn corridor() -> TestCorridor {
    TestCorridor::new(32, 100.0)
        .with_seed(31)
        .with_highway(1, 16, 30, 16)
        .with_highway(10, 12, 10, 16)
        // Two cells at 10 000 m² each, 1 kg/m² => 20 000 kg capacity.
        .with_lot(1, 10, 11, 11, 11)
        .with_gate(1, 16)
        .with_source(1, 30, 16, 1.0)
        .with_flat_scenario(50_000.0, 50_000.0)
        .with_params(|p| {
            p.sources.restricted_fraction = 1.0;
            p.lots.kg_per_m2 = 1.0;
        })
        .attach()
}

#[test]
fn test_lot_pegs_at_threshold_and_road_backs_up() {
    let mut c = corridor();
    c.run_sim_hours(3.0);

    let lot = &c.lots().lots[0];
    let ceiling = 0.9 * lot.capacity_kg;
    assert!(
        lot.mass_kg <= ceiling + 1.0,
        "lot stores {:.0} kg over ceiling {:.0}",
        lot.mass_kg,
        ceiling
    );
    // With 50 000 kg/h of restricted inflow the 18 000 kg ceiling is hit
    // well within the run.
    assert!(
        lot.mass_kg > 0.95 * ceiling,
        "lot only reached {:.0} of {:.0} kg",
        lot.mass_kg,
        ceiling
    );

    // Everything that could not be admitted is still mobile on the road.
    let on_road = c.densities().restricted_mass();
    let stats = c.stats();
    assert!(
        on_road > stats.injected_restricted_kg * 0.5,
        "expected a road backlog, found {on_road} kg"
    );
    assert_eq!(c.violations().lot_over_capacity, 0);
    assert_eq!(c.violations().negative_density, 0);
}

#[test]
fn test_backlog_keeps_growing_while_lot_is_pegged() {
    let mut c = corridor();
    c.run_sim_hours(2.0);
    let early = c.densities().restricted_mass();
    c.run_sim_hours(1.0);
    let later = c.densities().restricted_mass();
    assert!(
        later > early + 10_000.0,
        "road backlog should grow: {early} -> {later} kg"
    );
}
