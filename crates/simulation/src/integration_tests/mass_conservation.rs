//! Closed-system conservation: no injection, no drain, hundreds of frames.

use bevy::prelude::Vec2;

use crate::config::TRUCK_KG;
use crate::density::{CargoClass, DensityGrids};
use crate::test_harness::TestCorridor;
use crate::trucks::TruckFleet;

#[test]
fn test_total_mass_constant_over_600_frames() {
    let mut c = TestCorridor::new(32, 100.0)
        .with_seed(11)
        .with_highway(1, 16, 30, 16)
        .with_highway(20, 10, 20, 16)
        .with_lot(1, 19, 7, 21, 9)
        .with_gate(1, 16)
        // Zero inflow, zero gate capacity: a closed system.
        .with_flat_scenario(0.0, 0.0)
        .attach();

    // Preload five trucks of each class mid-road, with matching tokens so
    // the parity monitor stays quiet.
    let (restricted_cell, cleared_cell) = {
        let grid = c.grid();
        (grid.idx(28, 16), grid.idx(10, 16))
    };
    {
        let world = c.world_mut();
        {
            let mut densities = world.resource_mut::<DensityGrids>();
            densities.restricted[restricted_cell] = 5.0 * TRUCK_KG;
            densities.cleared[cleared_cell] = 5.0 * TRUCK_KG;
        }
        let restricted_pos;
        let cleared_pos;
        {
            let grid = world.resource::<crate::grid::CorridorGrid>();
            restricted_pos = grid.cell_center(restricted_cell);
            cleared_pos = grid.cell_center(cleared_cell);
        }
        let mut fleet = world.resource_mut::<TruckFleet>();
        for i in 0..5 {
            fleet.spawn(
                restricted_pos + Vec2::splat(i as f32),
                CargoClass::Restricted,
                restricted_cell as u32,
                0.5,
            );
            fleet.spawn(
                cleared_pos + Vec2::splat(i as f32),
                CargoClass::Cleared,
                cleared_cell as u32,
                0.5,
            );
        }
    }

    let initial = c.total_mass();
    assert!((initial - 10.0 * TRUCK_KG).abs() < 1e-6);

    for _ in 0..600 {
        c.tick();
    }
    let after = c.total_mass();
    assert!(
        (after - initial).abs() <= 1.0e-6 * initial,
        "mass drifted from {initial} to {after} kg"
    );
    assert_eq!(c.violations().negative_density, 0);
    assert_eq!(c.violations().lot_over_capacity, 0);
    // Cleared mass pooled at the capacity-zero gate instead of leaving.
    assert_eq!(c.stats().drained_total_kg, 0.0);
}
