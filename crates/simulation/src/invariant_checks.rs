//! Runtime invariant guards for the mass-transport core.
//!
//! Validates the structural invariants of the density fields, lots, and
//! routing tables at frame boundaries. Violations are logged with enough
//! context to reproduce and counted for the test suite; the release build
//! never panics (the `strict-invariants` feature turns violations into
//! panics for debugging runs). Checks run every frame in debug builds and
//! on a slow cadence in release.

use bevy::prelude::*;

use crate::config::TRUCK_KG;
use crate::density::DensityGrids;
use crate::grid::{CorridorGrid, Region};
use crate::lots::LotRegistry;
use crate::params::SimParams;
use crate::routing::RoutingTables;
use crate::sim_clock::SimClock;
use crate::sources::SourceRegistry;
use crate::staging::StagingBuckets;
use crate::trucks::{parity_gap, TruckFleet};

/// Mass below this is treated as floating-point noise, kg.
const MASS_EPSILON: f64 = 1.0e-3;

/// Slack on the lot capacity ceiling, kg.
const CAPACITY_EPSILON: f64 = 1.0;

/// Release-build check cadence, frames.
const RELEASE_CHECK_INTERVAL: u64 = 30;

/// Violation counters for the last validation pass. Integration tests
/// assert these stay zero.
#[derive(Resource, Default, Debug, Clone)]
pub struct InvariantViolations {
    pub negative_density: u32,
    pub restricted_on_lot: u32,
    pub staging_on_lot: u32,
    pub stored_outside_lot: u32,
    pub lot_over_capacity: u32,
    pub hop_not_descending: u32,
    pub staging_ledger: u32,
    pub token_parity: u32,
}

impl InvariantViolations {
    pub fn total(&self) -> u32 {
        self.negative_density
            + self.restricted_on_lot
            + self.staging_on_lot
            + self.stored_outside_lot
            + self.lot_over_capacity
            + self.hop_not_descending
            + self.staging_ledger
            + self.token_parity
    }
}

fn fail(kind: &str, detail: String) {
    warn!("invariant violation ({kind}): {detail}");
    #[cfg(feature = "strict-invariants")]
    panic!("invariant violation ({kind}): {detail}");
}

/// `PostSim` validation pass.
#[allow(clippy::too_many_arguments)]
pub fn validate_frame(
    clock: Res<SimClock>,
    params: Res<SimParams>,
    grid: Res<CorridorGrid>,
    routing: Res<RoutingTables>,
    lots: Res<LotRegistry>,
    buckets: Res<StagingBuckets>,
    sources: Res<SourceRegistry>,
    fleet: Res<TruckFleet>,
    densities: Res<DensityGrids>,
    mut violations: ResMut<InvariantViolations>,
) {
    if grid.is_empty() {
        return;
    }
    if !cfg!(debug_assertions) && !clock.frame.is_multiple_of(RELEASE_CHECK_INTERVAL) {
        return;
    }
    *violations = InvariantViolations::default();

    // Non-negativity across every field. The frame-final clamp should have
    // removed drift already, so anything here is a real defect.
    for (name, field) in [
        ("restricted", &densities.restricted),
        ("staging", &densities.staging),
        ("lot_stored", &densities.lot_stored),
        ("park_wait", &densities.park_wait),
        ("cleared", &densities.cleared),
    ] {
        for (idx, &v) in field.iter().enumerate() {
            if v < -MASS_EPSILON {
                let (x, y) = grid.xy(idx);
                fail(
                    "non-negative",
                    format!("{name}[{x},{y}] = {v:.4} kg"),
                );
                violations.negative_density += 1;
            }
        }
    }

    // Field placement: mobile restricted and staged mass live on roads,
    // stored mass lives in lots.
    for idx in 0..grid.len() {
        let is_lot = grid.region[idx] == Region::Lot;
        if is_lot && densities.restricted[idx] > MASS_EPSILON {
            let (x, y) = grid.xy(idx);
            fail(
                "restricted-on-lot",
                format!("restricted {:.2} kg on lot cell ({x},{y})", densities.restricted[idx]),
            );
            violations.restricted_on_lot += 1;
        }
        if is_lot && densities.staging[idx] > MASS_EPSILON {
            let (x, y) = grid.xy(idx);
            fail(
                "staging-on-lot",
                format!("staged {:.2} kg on lot cell ({x},{y})", densities.staging[idx]),
            );
            violations.staging_on_lot += 1;
        }
        if !is_lot && densities.lot_stored[idx] > MASS_EPSILON {
            let (x, y) = grid.xy(idx);
            fail(
                "stored-outside-lot",
                format!("stored {:.2} kg outside any lot at ({x},{y})", densities.lot_stored[idx]),
            );
            violations.stored_outside_lot += 1;
        }
    }

    // Capacity ceiling per lot.
    for lot in &lots.lots {
        let stored: f64 = lot
            .cells
            .iter()
            .map(|&c| densities.lot_stored[c as usize])
            .sum();
        let ceiling =
            f64::from(params.lots.capacity_threshold) * lot.capacity_kg + CAPACITY_EPSILON;
        if stored > ceiling {
            fail(
                "lot-capacity",
                format!(
                    "lot {} stores {:.0} kg over ceiling {:.0} kg",
                    lot.id, stored, ceiling
                ),
            );
            violations.lot_over_capacity += 1;
        }
    }

    // Potential monotonicity: every hop descends its own table.
    if routing.version > 0 {
        for &cell in &grid.road_cells {
            let i = cell as usize;
            let hop = routing.hop_gate[i];
            if hop >= 0 && routing.dist_gate[hop as usize] >= routing.dist_gate[i] {
                fail(
                    "descent",
                    format!("gate hop {i} -> {hop} does not descend"),
                );
                violations.hop_not_descending += 1;
            }
            let hop = routing.hop_lots[i];
            if hop >= 0 && routing.dist_lots[hop as usize] >= routing.dist_lots[i] {
                fail(
                    "descent",
                    format!("lots hop {i} -> {hop} does not descend"),
                );
                violations.hop_not_descending += 1;
            }
        }
    }

    // Staging ledger: the ring and the density field must agree.
    let staged = densities.staging_mass();
    let ledger = buckets.live_total();
    let tolerance = 1.0e-3 * staged.abs().max(1.0);
    if (staged - ledger).abs() > tolerance {
        fail(
            "staging-ledger",
            format!("staging field {staged:.3} kg vs bucket ledger {ledger:.3} kg"),
        );
        violations.staging_ledger += 1;
    }

    // Token parity: each source holds up to one sub-truck remainder, and
    // gate arrival quantizes token death against a continuous drain.
    let gap = parity_gap(&fleet, &densities);
    let tolerance = sources.sources.len() as i64 + 2;
    if gap.abs() > tolerance {
        fail(
            "token-parity",
            format!(
                "{} tokens vs {:.1} trucks of mass (gap {gap})",
                fleet.alive_count(),
                densities.total_mass() / TRUCK_KG
            ),
        );
        violations.token_parity += 1;
    }
}
