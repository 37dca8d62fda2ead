//! Export gate drain.
//!
//! Cleared mass sitting on sink cells leaves the corridor, bounded per
//! frame by the scheduled gate capacity. Restricted mass is never drained;
//! it can only leave a sink cell by flowing to a neighbor.

use bevy::prelude::*;

use crate::density::DensityGrids;
use crate::grid::CorridorGrid;
use crate::scenario::HourlySchedule;
use crate::sim_clock::SimClock;
use crate::stats::CorridorStats;

/// Drain up to the frame budget from the sink cells, in stable cell order.
/// Returns the kg exported.
pub fn drain(
    grid: &CorridorGrid,
    cap_kg_per_hour: f64,
    dt_sim: f32,
    densities: &mut DensityGrids,
) -> f64 {
    let mut budget = cap_kg_per_hour * f64::from(dt_sim) / 3_600.0;
    if budget <= 0.0 {
        return 0.0;
    }
    let mut exported = 0.0;
    for &cell in &grid.sink_cells {
        if budget <= 0.0 {
            break;
        }
        let c = cell as usize;
        let avail = densities.cleared[c];
        if avail <= 0.0 {
            continue;
        }
        let take = avail.min(budget);
        densities.cleared[c] -= take;
        budget -= take;
        exported += take;
    }
    exported
}

/// Frame-level drain, after clearance service.
pub fn drain_gate(
    clock: Res<SimClock>,
    grid: Res<CorridorGrid>,
    schedule: Res<HourlySchedule>,
    mut densities: ResMut<DensityGrids>,
    mut stats: ResMut<CorridorStats>,
) {
    if clock.dt_sim <= 0.0 || grid.is_empty() {
        return;
    }
    let exported = drain(
        &grid,
        schedule.gate_cap_kg_per_hour,
        clock.dt_sim,
        &mut densities,
    );
    stats.drained_total_kg += exported;
}
