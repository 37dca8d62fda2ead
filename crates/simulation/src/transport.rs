//! Class-conditioned graph flux: the per-substep mass mover.
//!
//! Each substep moves a fixed fraction of every road cell's mass one hop
//! along its class routing table, modulated by local congestion. Restricted
//! mass additionally passes through the lot admission pipeline: proximity
//! capture into adjacent lots with headroom, the roadside staging split,
//! soft occupancy-scaled acceptance against the hard live-acceptance budget,
//! and a bounded breadth-first fallback search when the targeted lot cannot
//! take a full truck.
//!
//! The pass is double-buffered: outflows are computed against the
//! pre-substep field while deposits accumulate in scratch, then the scratch
//! is written back. Iteration follows the grid's stable road-cell order, and
//! the only randomness (the proximity-capture scan order) derives from one
//! seed drawn per substep, so runs are bit-reproducible.

use std::time::{Duration, Instant};

use bevy::prelude::*;
use pathfinding::prelude::bfs_reach;
use rand::Rng;

use crate::config::PHYSICS_SUBSTEPS;
use crate::density::DensityGrids;
use crate::grid::{CorridorGrid, Region, NEIGHBOR8_OFFSETS};
use crate::lots::{can_take_truck, LotRegistry};
use crate::params::SimParams;
use crate::routing::RoutingTables;
use crate::sim_clock::SimClock;
use crate::sim_rng::{shuffled_neighbor_order, SimRng};
use crate::staging::StagingBuckets;
use crate::trucks::{step_trucks, TruckFleet};
use crate::clearance::ClearanceQueue;

/// How often rejected-admission totals are reported.
const OVERFLOW_REPORT_WINDOW: Duration = Duration::from_secs(2);

/// Throughput multiplier from mobile on-road mass. Lots are exempt; staged
/// and stored mass is excluded so parked trucks don't choke the road they
/// sit beside.
#[inline]
pub fn congestion_factor(
    params: &SimParams,
    grid: &CorridorGrid,
    densities: &DensityGrids,
    idx: usize,
) -> f64 {
    if !params.congestion.enabled || grid.region[idx] == Region::Lot {
        return 1.0;
    }
    let rho = densities.restricted[idx] + densities.cleared[idx];
    1.0 / (1.0
        + (rho / params.congestion.rho_half_kg).powf(f64::from(params.congestion.exponent)))
}

// ---------------------------------------------------------------------------
// Overflow diagnostics
// ---------------------------------------------------------------------------

/// Sliding-window tally of rejected admission attempts per lot.
#[derive(Resource)]
pub struct OverflowDiagnostics {
    window_started: Instant,
    rejected_kg: Vec<f64>,
}

impl Default for OverflowDiagnostics {
    fn default() -> Self {
        Self {
            window_started: Instant::now(),
            rejected_kg: Vec::new(),
        }
    }
}

impl OverflowDiagnostics {
    pub fn configure(&mut self, lot_count: usize) {
        self.rejected_kg.clear();
        self.rejected_kg.resize(lot_count, 0.0);
        self.window_started = Instant::now();
    }

    #[inline]
    pub fn record(&mut self, lot_idx: usize, kg: f64) {
        if lot_idx < self.rejected_kg.len() {
            self.rejected_kg[lot_idx] += kg;
        }
    }

    /// Log the worst offenders once per window, then reset.
    pub fn flush_if_due(&mut self, lots: &LotRegistry) {
        if self.window_started.elapsed() < OVERFLOW_REPORT_WINDOW {
            return;
        }
        self.window_started = Instant::now();
        let mut offenders: Vec<(usize, f64)> = self
            .rejected_kg
            .iter()
            .copied()
            .enumerate()
            .filter(|&(_, kg)| kg > 0.0)
            .collect();
        if offenders.is_empty() {
            return;
        }
        offenders.sort_by(|a, b| b.1.total_cmp(&a.1));
        for &(idx, kg) in offenders.iter().take(5) {
            let lot = &lots.lots[idx];
            warn!(
                "lot {} rejected {:.0} kg of admissions (stored {:.0}/{:.0} kg)",
                lot.id, kg, lot.mass_kg, lot.capacity_kg
            );
        }
        self.rejected_kg.iter_mut().for_each(|kg| *kg = 0.0);
    }
}

/// `PostSim`: periodic overflow report.
pub fn report_overflow(lots: Res<LotRegistry>, mut diag: ResMut<OverflowDiagnostics>) {
    diag.flush_if_due(&lots);
}

// ---------------------------------------------------------------------------
// Fallback lot search
// ---------------------------------------------------------------------------

/// Breadth-first search outward from `start` through traversable cells,
/// bounded by `radius` steps, for the first lot that can still take a full
/// truck. Neighbor expansion order is fixed, so the result is deterministic.
pub fn fallback_lot_search(
    grid: &CorridorGrid,
    params: &SimParams,
    lots: &LotRegistry,
    start: usize,
    skip_lot: usize,
) -> Option<usize> {
    let radius = params.lots.fallback_search_radius;
    let k_threshold = params.flow.k_threshold;
    bfs_reach((start, 0u32), |&(cell, depth)| {
        let mut next = Vec::new();
        if depth < radius {
            let (neighbors, count) = grid.neighbors8(cell);
            for &nb in &neighbors[..count] {
                if grid.traversable(nb, k_threshold) {
                    next.push((nb, depth + 1));
                }
            }
        }
        next
    })
    .find_map(|(cell, _)| {
        let lot = grid.cell_to_lot[cell];
        if lot >= 0 && lot as usize != skip_lot && can_take_truck(lots, lot as usize) {
            Some(lot as usize)
        } else {
            None
        }
    })
}

// ---------------------------------------------------------------------------
// Flux passes
// ---------------------------------------------------------------------------

/// One restricted-mass substep over the road cells.
#[allow(clippy::too_many_arguments)]
pub fn flux_substep_restricted(
    grid: &CorridorGrid,
    params: &SimParams,
    routing: &RoutingTables,
    lots: &mut LotRegistry,
    buckets: &mut StagingBuckets,
    diag: &mut OverflowDiagnostics,
    densities: &mut DensityGrids,
    shuffle_seed: u64,
) {
    let hops = &routing.hop_lots;
    // Outflows read the pre-substep field; deposits build up in scratch.
    let congestion: Vec<f64> = grid
        .road_cells
        .iter()
        .map(|&c| congestion_factor(params, grid, densities, c as usize))
        .collect();

    {
        let DensityGrids {
            restricted,
            scratch_restricted,
            ..
        } = &mut *densities;
        scratch_restricted.copy_from_slice(restricted);
    }

    let attempt_frac = f64::from(params.staging.lot_attempt_fraction.clamp(0.0, 1.0));

    for (road_pos, &cell) in grid.road_cells.iter().enumerate() {
        let i = cell as usize;
        let m = densities.restricted[i];
        if m <= 0.0 {
            continue;
        }

        let mut hop = hops[i];

        // Proximity capture: any adjacent lot with a truck of headroom wins
        // over the global descent direction. Scan order is shuffled per
        // substep so load spreads instead of funneling into one entry cell.
        if grid.region[i] != Region::Lot {
            for &slot in &shuffled_neighbor_order(shuffle_seed, cell) {
                let (dx, dy) = NEIGHBOR8_OFFSETS[slot as usize];
                let Some(nb) = grid.offset_neighbor(i, dx, dy) else {
                    continue;
                };
                let lot = grid.cell_to_lot[nb];
                if lot >= 0 && can_take_truck(lots, lot as usize) {
                    hop = nb as i32;
                    break;
                }
            }
        }

        // Dead end: mass holds in place, no loss.
        if hop < 0 {
            continue;
        }
        let nb = hop as usize;

        let out = m * f64::from(params.flow.flow_frac) * congestion[road_pos];
        if out <= 0.0 {
            continue;
        }

        if grid.region[nb] != Region::Lot {
            densities.scratch_restricted[i] -= out;
            densities.scratch_restricted[nb] += out;
            continue;
        }

        // Admission pipeline for a lot-bound hop.
        let target_lot = grid.cell_to_lot[nb];
        if target_lot < 0 {
            continue;
        }
        let target_lot = target_lot as usize;

        let hold = (1.0 - attempt_frac) * out;
        if hold > 0.0 {
            densities.scratch_restricted[i] -= hold;
            densities.staging[i] += hold;
            buckets.schedule(
                cell,
                hold,
                params.staging.min_hold_s,
                params.staging.max_hold_s,
                params.staging.bucket_width_s,
            );
        }

        let attempt = attempt_frac * out;
        if attempt <= 0.0 {
            continue;
        }

        if can_take_truck(lots, target_lot) {
            let fill = lots.lots[target_lot].fill_fraction().clamp(0.0, 1.0);
            let desired = (1.0 - fill).max(0.0) * attempt;
            let accepted = lots.reserve(target_lot, desired);
            if accepted > 0.0 {
                densities.scratch_restricted[i] -= accepted;
                lots.scatter_deposit(
                    target_lot,
                    accepted,
                    &mut densities.lot_stored,
                    params.lots.scatter_max_cells,
                );
            }
            let rejected = attempt - accepted;
            if rejected > 0.0 {
                diag.record(target_lot, rejected);
            }
        } else if let Some(alt) = fallback_lot_search(grid, params, lots, i, target_lot) {
            let accepted = lots.reserve(alt, attempt);
            if accepted > 0.0 {
                densities.scratch_restricted[i] -= accepted;
                lots.scatter_deposit(
                    alt,
                    accepted,
                    &mut densities.lot_stored,
                    params.lots.scatter_max_cells,
                );
            }
            let rejected = attempt - accepted;
            if rejected > 0.0 {
                diag.record(alt, rejected);
            }
        } else {
            // Nothing admits a truck within the search radius; the whole
            // attempt stays on the road.
            diag.record(target_lot, attempt);
        }
    }

    let DensityGrids {
        restricted,
        scratch_restricted,
        ..
    } = &mut *densities;
    restricted.copy_from_slice(scratch_restricted);
}

/// One cleared-mass substep over the road cells.
pub fn flux_substep_cleared(
    grid: &CorridorGrid,
    params: &SimParams,
    routing: &RoutingTables,
    densities: &mut DensityGrids,
) {
    let hops = &routing.hop_gate;
    let congestion: Vec<f64> = grid
        .road_cells
        .iter()
        .map(|&c| congestion_factor(params, grid, densities, c as usize))
        .collect();

    {
        let DensityGrids {
            cleared,
            scratch_cleared,
            ..
        } = &mut *densities;
        scratch_cleared.copy_from_slice(cleared);
    }

    for (road_pos, &cell) in grid.road_cells.iter().enumerate() {
        let i = cell as usize;
        let m = densities.cleared[i];
        if m <= 0.0 {
            continue;
        }
        let hop = hops[i];
        if hop < 0 {
            continue;
        }
        let out = m * f64::from(params.flow.flow_frac) * congestion[road_pos];
        if out <= 0.0 {
            continue;
        }
        densities.scratch_cleared[i] -= out;
        densities.scratch_cleared[hop as usize] += out;
    }

    let DensityGrids {
        cleared,
        scratch_cleared,
        ..
    } = &mut *densities;
    cleared.copy_from_slice(scratch_cleared);
}

// ---------------------------------------------------------------------------
// Substep orchestration
// ---------------------------------------------------------------------------

/// `Simulation` phase: run the fixed substep loop (live-acceptance reset,
/// restricted flux, cleared flux, truck-token step) and leave injection,
/// clearance service, and the gate drain to the frame-level systems.
#[allow(clippy::too_many_arguments)]
pub fn run_transport_substeps(
    clock: Res<SimClock>,
    params: Res<SimParams>,
    grid: Res<CorridorGrid>,
    routing: Res<RoutingTables>,
    mut lots: ResMut<LotRegistry>,
    mut buckets: ResMut<StagingBuckets>,
    mut densities: ResMut<DensityGrids>,
    mut diag: ResMut<OverflowDiagnostics>,
    mut fleet: ResMut<TruckFleet>,
    mut queue: ResMut<ClearanceQueue>,
    mut rng: ResMut<SimRng>,
) {
    if clock.dt_sim <= 0.0 || grid.is_empty() {
        return;
    }
    let sub_dt = clock.dt_sim / PHYSICS_SUBSTEPS as f32;
    for _ in 0..PHYSICS_SUBSTEPS {
        lots.rebuild_live_acceptance(params.lots.capacity_threshold);
        let shuffle_seed: u64 = rng.0.gen();
        flux_substep_restricted(
            &grid,
            &params,
            &routing,
            &mut lots,
            &mut buckets,
            &mut diag,
            &mut densities,
            shuffle_seed,
        );
        flux_substep_cleared(&grid, &params, &routing, &mut densities);
        step_trucks(
            sub_dt,
            clock.sim_time_s,
            &grid,
            &params,
            &routing,
            &lots,
            &densities,
            &mut fleet,
            &mut queue,
            &mut rng,
        );
    }
}
