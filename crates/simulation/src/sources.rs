//! Mass sources: pulsed hourly injection and truck-token minting.
//!
//! Each source injects its weighted share of the scheduled hourly inflow,
//! shaped by a deterministic multi-period pulse whose long-run mean is 1 so
//! hourly totals survive the texture. Mass enters the density fields
//! continuously; tokens mint whenever a source's accumulator crosses one
//! truck quantum, with the class drawn per token. Industrial-park sources
//! deposit their restricted share straight into the park wait zone and
//! enqueue the matching tokens immediately.

use std::f32::consts::TAU;

use bevy::prelude::*;
use rand::Rng;

use crate::clearance::{ClearanceQueue, QueueTicket};
use crate::config::{DIST_UNREACHED, NO_HOP, TRUCK_KG};
use crate::density::{CargoClass, DensityGrids};
use crate::grid::CorridorGrid;
use crate::lots::ParkRegistry;
use crate::params::SimParams;
use crate::routing::RoutingTables;
use crate::scenario::HourlySchedule;
use crate::sim_clock::SimClock;
use crate::sim_rng::SimRng;
use crate::stats::CorridorStats;
use crate::trucks::TruckFleet;

/// Pulse component periods, sim-seconds. Four incommensurate periods keep
/// the beat pattern from repeating within a day.
pub const PULSE_PERIODS_S: [f32; 4] = [47.0 * 60.0, 31.0 * 60.0, 19.0 * 60.0, 11.0 * 60.0];

/// Pulse component amplitudes. Kept small so any one-hour window
/// integrates to within a few percent of the mean: the residual of a
/// component over a window T is bounded by `w * P / (pi * T)`.
pub const PULSE_WEIGHTS: [f32; 4] = [0.05, 0.05, 0.04, 0.04];

/// Floor of the pulse multiplier.
pub const PULSE_FLOOR: f32 = 0.12;

/// Deterministic injection multiplier at a sim time, per source.
pub fn pulse(sim_time_s: f64, phase: f32, jitter: f32) -> f32 {
    let t = sim_time_s as f32;
    let mut v = 1.0;
    for (k, (&period, &weight)) in PULSE_PERIODS_S.iter().zip(PULSE_WEIGHTS.iter()).enumerate() {
        let component_phase = phase + jitter * (k as f32 + 1.0);
        v += weight * (TAU * t / period + component_phase).sin();
    }
    v.max(PULSE_FLOOR)
}

/// Whether a source feeds the road directly or an industrial park.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Road,
    /// Index into the park registry.
    Park(usize),
}

/// One injection site.
#[derive(Debug, Clone)]
pub struct MassSource {
    pub id: u32,
    pub cell: u32,
    /// Share of the scheduled inflow relative to the weight total.
    pub weight: f32,
    pub kind: SourceKind,
    pub phase: f32,
    pub jitter: f32,
    /// Sub-truck remainder carried between frames for token minting.
    accum_kg: f64,
}

impl MassSource {
    pub fn new(id: u32, cell: u32, weight: f32, kind: SourceKind, phase: f32, jitter: f32) -> Self {
        Self {
            id,
            cell,
            weight,
            kind,
            phase,
            jitter,
            accum_kg: 0.0,
        }
    }
}

#[derive(Resource, Default)]
pub struct SourceRegistry {
    pub sources: Vec<MassSource>,
    last_routing_version: u64,
}

impl SourceRegistry {
    pub fn total_weight(&self) -> f32 {
        self.sources.iter().map(|s| s.weight).sum()
    }
}

/// Frame-level injection, after the transport substeps.
#[allow(clippy::too_many_arguments)]
pub fn inject_sources(
    clock: Res<SimClock>,
    params: Res<SimParams>,
    schedule: Res<HourlySchedule>,
    grid: Res<CorridorGrid>,
    parks: Res<ParkRegistry>,
    mut sources: ResMut<SourceRegistry>,
    mut densities: ResMut<DensityGrids>,
    mut fleet: ResMut<TruckFleet>,
    mut queue: ResMut<ClearanceQueue>,
    mut rng: ResMut<SimRng>,
    mut stats: ResMut<CorridorStats>,
) {
    if clock.dt_sim <= 0.0 || grid.is_empty() || sources.sources.is_empty() {
        return;
    }
    let total_weight = sources.total_weight();
    if total_weight <= 0.0 {
        return;
    }

    let restricted_fraction = params.sources.restricted_fraction.clamp(0.0, 1.0);
    let restricted_share = f64::from(restricted_fraction);

    for src in &mut sources.sources {
        let rate = schedule.source_rate_kg_s * f64::from(src.weight / total_weight);
        let multiplier = pulse(clock.sim_time_s, src.phase, src.jitter);
        let injected = rate * f64::from(clock.dt_sim) * f64::from(multiplier);
        if injected <= 0.0 {
            continue;
        }

        let restricted_kg = injected * restricted_share;
        let cleared_kg = injected - restricted_kg;

        match src.kind {
            SourceKind::Road => {
                densities.restricted[src.cell as usize] += restricted_kg;
            }
            SourceKind::Park(park_idx) => {
                // Park production waits in the zone instead of driving to a
                // lot; it enters the same clearance queue on arrival.
                let park = &parks.parks[park_idx];
                let share = restricted_kg / park.cells.len().max(1) as f64;
                for &cell in &park.cells {
                    densities.park_wait[cell as usize] += share;
                }
            }
        }
        densities.cleared[src.cell as usize] += cleared_kg;

        stats.injected_total_kg += injected;
        stats.injected_restricted_kg += restricted_kg;
        stats.injected_cleared_kg += cleared_kg;

        // Token minting: one truck per quantum crossed, class drawn per
        // token so the visual split matches the mass split in expectation.
        src.accum_kg += injected;
        while src.accum_kg >= TRUCK_KG {
            src.accum_kg -= TRUCK_KG;
            let is_restricted = rng.0.gen::<f32>() < restricted_fraction;
            let staging_key: f32 = rng.0.gen();
            match (is_restricted, src.kind) {
                (true, SourceKind::Park(park_idx)) => {
                    let park = &parks.parks[park_idx];
                    let pick = rng.0.gen_range(0..park.cells.len().max(1));
                    let cell = park.cells.get(pick).copied().unwrap_or(src.cell);
                    let id = fleet.spawn(
                        grid.cell_center(cell as usize),
                        CargoClass::Restricted,
                        src.cell,
                        staging_key,
                    );
                    if let Some(truck) = fleet.get_mut(id) {
                        truck.waiting_in_park = true;
                        truck.park_idx = park_idx as i32;
                        truck.lot_arrival_sim_s = clock.sim_time_s;
                    }
                    queue.push(QueueTicket {
                        truck_id: id,
                        arrival_sim_s: clock.sim_time_s,
                        lot_idx: -1,
                        park_idx: park_idx as i32,
                    });
                }
                (true, SourceKind::Road) => {
                    fleet.spawn(
                        grid.cell_center(src.cell as usize),
                        CargoClass::Restricted,
                        src.cell,
                        staging_key,
                    );
                }
                (false, _) => {
                    fleet.spawn(
                        grid.cell_center(src.cell as usize),
                        CargoClass::Cleared,
                        src.cell,
                        staging_key,
                    );
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Source relocation
// ---------------------------------------------------------------------------

/// True when `cell` is at least `radius` cells (Chebyshev) from every lot.
fn outside_lot_capture(grid: &CorridorGrid, cell: usize, radius: i32) -> bool {
    let (x, y) = grid.xy(cell);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let nx = x as i64 + i64::from(dx);
            let ny = y as i64 + i64::from(dy);
            if grid.in_bounds(nx, ny) && grid.cell_to_lot[grid.idx(nx as usize, ny as usize)] >= 0
            {
                return false;
            }
        }
    }
    true
}

/// Walk along `escape_hops` from `start` until a cell routes on
/// `needed_hops` and sits outside the lot capture radius.
fn relocation_walk(
    grid: &CorridorGrid,
    needed_hops: &[i32],
    escape_hops: &[i32],
    start: usize,
    max_steps: usize,
    capture_radius: i32,
) -> Option<usize> {
    let mut cur = start;
    for _ in 0..max_steps {
        if needed_hops[cur] != NO_HOP && outside_lot_capture(grid, cur, capture_radius) {
            return Some(cur);
        }
        let next = escape_hops[cur];
        if next < 0 {
            return None;
        }
        cur = next as usize;
    }
    None
}

/// After each routing commit: move road sources whose cell can no longer
/// route to their sink. A source stuck with no escape path is an input-
/// consistency problem and is reported, not repaired.
pub fn relocate_unreachable_sources(
    grid: Res<CorridorGrid>,
    params: Res<SimParams>,
    routing: Res<RoutingTables>,
    mut sources: ResMut<SourceRegistry>,
) {
    if grid.is_empty() || routing.version == sources.last_routing_version {
        return;
    }
    sources.last_routing_version = routing.version;

    // A table with no reachable cell at all (e.g. a lot-free world) makes
    // every source "unreachable"; that is a scenario property, not a stuck
    // source.
    let lots_exist = routing.dist_lots.iter().any(|&d| d < DIST_UNREACHED);
    let gate_exists = routing.dist_gate.iter().any(|&d| d < DIST_UNREACHED);
    let radius = params.routing.lot_capture_exclusion_radius;
    let max_steps = params.routing.relocation_max_steps;

    for src in &mut sources.sources {
        if src.kind != SourceKind::Road {
            continue;
        }
        let cell = src.cell as usize;

        if lots_exist && routing.hop_lots[cell] == NO_HOP {
            match relocation_walk(&grid, &routing.hop_lots, &routing.hop_gate, cell, max_steps, radius)
            {
                Some(new_cell) => {
                    info!(
                        "source {} relocated {} -> {} to regain a lot route",
                        src.id, cell, new_cell
                    );
                    src.cell = new_cell as u32;
                }
                None => error!(
                    "source {} at cell {} cannot reach any lot and no relocation exists",
                    src.id, cell
                ),
            }
        }
        let cell = src.cell as usize;
        if gate_exists && routing.hop_gate[cell] == NO_HOP && grid.g_sink[cell] <= 0.0 {
            match relocation_walk(&grid, &routing.hop_gate, &routing.hop_lots, cell, max_steps, radius)
            {
                Some(new_cell) => {
                    info!(
                        "source {} relocated {} -> {} to regain a gate route",
                        src.id, cell, new_cell
                    );
                    src.cell = new_cell as u32;
                }
                None => error!(
                    "source {} at cell {} cannot reach the gate and no relocation exists",
                    src.id, cell
                ),
            }
        }
    }
}
