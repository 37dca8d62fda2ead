//! Dual geodesic potentials and next-hop routing.
//!
//! Two potentials drive all mass movement: distance-to-gate (cleared mass)
//! and distance-to-admitting-lot (restricted mass). Both are solved with a
//! binary-heap Dijkstra over the rasterized road graph, then reduced to
//! per-cell next-hop tables (steepest-descent neighbor).
//!
//! Rebuilds run on the `AsyncComputeTaskPool` against an immutable snapshot
//! of the grid and lot occupancy, the same pattern the rest of the engine's
//! lineage uses for async pathfinding: spawn a `Task`, poll it with
//! `poll_once` each frame, and publish the result in a single resource swap.
//! Transport keeps reading the previous tables until that swap; no partially
//! written table is ever observable.
//!
//! Requests are coalesced through one pending flag. Occupancy-driven
//! requests (a lot filling up or draining below threshold) are debounced by
//! a wall-clock window; geometry- and control-driven requests start at the
//! next frame boundary.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use bevy::prelude::*;
use bevy::tasks::{block_on, AsyncComputeTaskPool, Task};

use crate::config::{DIST_UNREACHED, NO_HOP};
use crate::density::CargoClass;
use crate::grid::{CorridorGrid, Region, RoadClass};
use crate::lots::LotRegistry;
use crate::params::SimParams;

/// Which potential a solve run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PotentialKind {
    /// Distance to the export gate. Lot cells absorb: they receive a
    /// distance from their road neighbors but never expand, so through-
    /// routing across lots is impossible.
    Gate,
    /// Distance to the nearest admitting lot. Full lots are obstacles.
    Lots,
}

// ---------------------------------------------------------------------------
// Live tables
// ---------------------------------------------------------------------------

/// The committed routing state read by transport and truck tokens.
/// Replaced wholesale at commit; never mutated in place during a frame.
#[derive(Resource, Default)]
pub struct RoutingTables {
    /// Geodesic distance to the gate, meters.
    pub dist_gate: Vec<f32>,
    /// Geodesic distance to the nearest admitting lot, meters.
    pub dist_lots: Vec<f32>,
    /// Next hop toward the gate, or `NO_HOP`.
    pub hop_gate: Vec<i32>,
    /// Next hop toward the lots, or `NO_HOP`.
    pub hop_lots: Vec<i32>,
    /// Bumped once per commit. A frame observes exactly one version.
    pub version: u64,
}

impl RoutingTables {
    pub fn resize(&mut self, len: usize) {
        self.dist_gate.clear();
        self.dist_gate.resize(len, DIST_UNREACHED);
        self.dist_lots.clear();
        self.dist_lots.resize(len, DIST_UNREACHED);
        self.hop_gate.clear();
        self.hop_gate.resize(len, NO_HOP);
        self.hop_lots.clear();
        self.hop_lots.resize(len, NO_HOP);
    }

    /// Routing authority for a cargo class: restricted mass moves on the
    /// lots table, cleared mass on the gate table.
    #[inline]
    pub fn hops(&self, class: CargoClass) -> &[i32] {
        match class {
            CargoClass::Restricted => &self.hop_lots,
            CargoClass::Cleared => &self.hop_gate,
        }
    }
}

// ---------------------------------------------------------------------------
// Build input snapshot
// ---------------------------------------------------------------------------

/// Self-contained copy of everything a rebuild needs, taken at request time
/// so the solve can run off-thread without touching ECS resources.
pub struct RoutingBuildInput {
    n: usize,
    cell_size: f32,
    k_threshold: f32,
    k_xx: Vec<f32>,
    k_yy: Vec<f32>,
    region: Vec<Region>,
    road_class: Vec<RoadClass>,
    road_cells: Vec<u32>,
    sink_cells: Vec<u32>,
    cell_to_lot: Vec<i32>,
    /// Per-lot: excluded from the lots run (full at snapshot time).
    lot_excluded: Vec<bool>,
    /// Per-lot occupancy fraction for the soft entry penalty.
    lot_fill: Vec<f32>,
    /// Seed cells for the lots run: members of non-excluded lots.
    lot_open_cells: Vec<u32>,
    city_cost_mult: f32,
    lot_traversal_cost_mult: f32,
    soft_capacity_alpha: f32,
    soft_capacity_beta: f32,
}

impl RoutingBuildInput {
    pub fn snapshot(grid: &CorridorGrid, lots: &LotRegistry, params: &SimParams) -> Self {
        let lot_excluded: Vec<bool> = lots.lots.iter().map(|l| l.is_full).collect();
        let lot_fill: Vec<f32> = lots
            .lots
            .iter()
            .map(|l| l.fill_fraction().clamp(0.0, 1.0) as f32)
            .collect();
        let mut lot_open_cells = Vec::new();
        for lot in &lots.lots {
            if !lot.is_full {
                lot_open_cells.extend_from_slice(&lot.cells);
            }
        }
        Self {
            n: grid.n,
            cell_size: grid.cell_size,
            k_threshold: params.flow.k_threshold,
            k_xx: grid.k_xx.clone(),
            k_yy: grid.k_yy.clone(),
            region: grid.region.clone(),
            road_class: grid.road_class.clone(),
            road_cells: grid.road_cells.clone(),
            sink_cells: grid.sink_cells.clone(),
            cell_to_lot: grid.cell_to_lot.clone(),
            lot_excluded,
            lot_fill,
            lot_open_cells,
            city_cost_mult: params.routing.city_cost_mult,
            lot_traversal_cost_mult: params.routing.lot_traversal_cost_mult,
            soft_capacity_alpha: params.routing.soft_capacity_alpha,
            soft_capacity_beta: params.routing.soft_capacity_beta,
        }
    }

    #[inline]
    fn traversable(&self, idx: usize) -> bool {
        self.k_xx[idx].max(self.k_yy[idx]) > self.k_threshold || self.region[idx] == Region::Lot
    }

    fn neighbors4(&self, idx: usize) -> ([usize; 4], usize) {
        let x = idx % self.n;
        let y = idx / self.n;
        let mut result = [0usize; 4];
        let mut count = 0;
        if x > 0 {
            result[count] = idx - 1;
            count += 1;
        }
        if x + 1 < self.n {
            result[count] = idx + 1;
            count += 1;
        }
        if y > 0 {
            result[count] = idx - self.n;
            count += 1;
        }
        if y + 1 < self.n {
            result[count] = idx + self.n;
            count += 1;
        }
        (result, count)
    }

    /// Cost of stepping into `to` from `from`, meters.
    fn edge_cost(&self, kind: PotentialKind, from: usize, to: usize) -> f32 {
        let mut cost = self.cell_size;
        if self.road_class[to] == RoadClass::City {
            cost *= self.city_cost_mult;
        }
        if self.region[to] == Region::Lot {
            cost *= self.lot_traversal_cost_mult;
        }
        // Lot entries get progressively more expensive as the lot fills,
        // without removing the lot as a destination until the hard
        // exclusion kicks in. The penalty lives on the road↔lot boundary
        // edge; the solve runs backward from the lot seeds, so it is
        // charged whichever direction the edge is relaxed in.
        if kind == PotentialKind::Lots {
            let from_lot = self.region[from] == Region::Lot;
            let to_lot = self.region[to] == Region::Lot;
            let boundary_lot = match (from_lot, to_lot) {
                (false, true) => self.cell_to_lot[to],
                (true, false) => self.cell_to_lot[from],
                _ => -1,
            };
            if boundary_lot >= 0 {
                let util = self.lot_fill[boundary_lot as usize];
                cost *= 1.0 + self.soft_capacity_alpha * util.powf(self.soft_capacity_beta);
            }
        }
        cost
    }
}

// ---------------------------------------------------------------------------
// Solve
// ---------------------------------------------------------------------------

/// Min-heap entry ordered by distance, cell index as a deterministic
/// tie-break.
struct HeapEntry {
    dist: f32,
    cell: u32,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the nearest cell first.
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.cell.cmp(&self.cell))
    }
}

/// Rebuild diagnostics carried alongside the tables to the commit step.
#[derive(Debug, Clone, Default)]
pub struct BuildDiagnostics {
    pub road_cells: usize,
    /// Road cells with no gate hop (excluding the gate itself).
    pub unreachable_gate: usize,
    /// Road cells with no lots hop (excluding lot interiors).
    pub unreachable_lots: usize,
    pub build_time: Duration,
}

/// A finished solve, ready for the single-swap commit.
pub struct BuiltRouting {
    pub tables: RoutingTables,
    pub diagnostics: BuildDiagnostics,
}

fn solve_potential(input: &RoutingBuildInput, kind: PotentialKind) -> Vec<f32> {
    let len = input.n * input.n;
    let mut dist = vec![DIST_UNREACHED; len];
    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();

    let seeds: &[u32] = match kind {
        PotentialKind::Gate => &input.sink_cells,
        PotentialKind::Lots => &input.lot_open_cells,
    };
    for &s in seeds {
        dist[s as usize] = 0.0;
        heap.push(HeapEntry { dist: 0.0, cell: s });
    }

    while let Some(HeapEntry { dist: d, cell }) = heap.pop() {
        let i = cell as usize;
        if d > dist[i] {
            continue;
        }
        // Gate run: a settled lot cell absorbs. It keeps the distance its
        // road neighbor gave it but spreads no further, so the gate
        // potential never tunnels through a lot.
        if kind == PotentialKind::Gate && is_lot_cell(input, i) && d > 0.0 {
            continue;
        }
        let (neighbors, count) = input.neighbors4(i);
        for &nb in &neighbors[..count] {
            if !input.traversable(nb) {
                continue;
            }
            if is_lot_cell(input, nb) {
                let lot = input.cell_to_lot[nb];
                // Full lots are obstacles for the lots run: not relaxed,
                // not expanded.
                if kind == PotentialKind::Lots
                    && lot >= 0
                    && input.lot_excluded[lot as usize]
                {
                    continue;
                }
            }
            let nd = d + input.edge_cost(kind, i, nb);
            if nd < dist[nb] {
                dist[nb] = nd;
                heap.push(HeapEntry {
                    dist: nd,
                    cell: nb as u32,
                });
            }
        }
    }
    dist
}

#[inline]
fn is_lot_cell(input: &RoutingBuildInput, idx: usize) -> bool {
    input.region[idx] == Region::Lot
}

fn derive_hops(input: &RoutingBuildInput, dist: &[f32], kind: PotentialKind) -> (Vec<i32>, usize) {
    let len = input.n * input.n;
    let mut hops = vec![NO_HOP; len];
    let mut unreachable = 0usize;

    for &cell in &input.road_cells {
        let i = cell as usize;
        if dist[i] >= DIST_UNREACHED {
            unreachable += 1;
            continue;
        }
        let mut best: Option<usize> = None;
        let mut best_dist = dist[i];
        let (neighbors, count) = input.neighbors4(i);
        for &nb in &neighbors[..count] {
            if !input.traversable(nb) {
                continue;
            }
            // Cleared mass never hops from a road into a lot; the only
            // legal lot exits are lot→road descents.
            if kind == PotentialKind::Gate
                && is_lot_cell(input, nb)
                && !is_lot_cell(input, i)
            {
                continue;
            }
            if dist[nb] < best_dist {
                best_dist = dist[nb];
                best = Some(nb);
            }
        }
        match best {
            Some(nb) => hops[i] = nb as i32,
            // Seeds legitimately have no descent; everything else reachable
            // but descent-less is a dead end worth counting.
            None if dist[i] > 0.0 => unreachable += 1,
            None => {}
        }
    }
    (hops, unreachable)
}

/// Run both potential solves and hop derivations. Pure function of the
/// snapshot; safe to run on a worker.
pub fn build_routing(input: &RoutingBuildInput) -> BuiltRouting {
    let started = Instant::now();
    let dist_gate = solve_potential(input, PotentialKind::Gate);
    let dist_lots = solve_potential(input, PotentialKind::Lots);
    let (hop_gate, unreachable_gate) = derive_hops(input, &dist_gate, PotentialKind::Gate);
    let (hop_lots, unreachable_lots) = derive_hops(input, &dist_lots, PotentialKind::Lots);

    BuiltRouting {
        tables: RoutingTables {
            dist_gate,
            dist_lots,
            hop_gate,
            hop_lots,
            version: 0,
        },
        diagnostics: BuildDiagnostics {
            road_cells: input.road_cells.len(),
            unreachable_gate,
            unreachable_lots,
            build_time: started.elapsed(),
        },
    }
}

// ---------------------------------------------------------------------------
// Rebuild scheduling
// ---------------------------------------------------------------------------

/// Why a rebuild was requested; decides the coalescing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    /// Road/lot geometry changed. Starts at the next frame.
    Geometry,
    /// The full-lot set changed. Debounced.
    Occupancy,
    /// A runtime control (capacity retarget) asked for it. Starts at the
    /// next frame.
    Control,
}

/// Rebuild scheduler: at most one solve in flight, one pending flag for
/// requests that arrive mid-build, and a debounce window for occupancy
/// churn.
#[derive(Resource)]
pub struct RoutingRebuild {
    task: Option<Task<BuiltRouting>>,
    dirty: bool,
    pending: bool,
    debounce_deadline: Option<Instant>,
    pub debounce: Duration,
    pub completed_builds: u64,
}

impl Default for RoutingRebuild {
    fn default() -> Self {
        Self {
            task: None,
            dirty: false,
            pending: false,
            debounce_deadline: None,
            debounce: Duration::from_millis(1_500),
            completed_builds: 0,
        }
    }
}

impl RoutingRebuild {
    pub fn in_flight(&self) -> bool {
        self.task.is_some()
    }

    pub fn request(&mut self, reason: RebuildReason) {
        if self.in_flight() {
            self.pending = true;
            return;
        }
        match reason {
            RebuildReason::Geometry | RebuildReason::Control => self.dirty = true,
            RebuildReason::Occupancy => {
                if self.debounce_deadline.is_none() {
                    self.debounce_deadline = Some(Instant::now() + self.debounce);
                }
            }
        }
    }

    fn due(&self) -> bool {
        if self.dirty {
            return true;
        }
        matches!(self.debounce_deadline, Some(deadline) if Instant::now() >= deadline)
    }

    fn clear_requests(&mut self) {
        self.dirty = false;
        self.debounce_deadline = None;
    }
}

fn commit(tables: &mut RoutingTables, built: BuiltRouting, warn_fraction: f32) {
    let BuiltRouting {
        tables: mut fresh,
        diagnostics,
    } = built;
    fresh.version = tables.version + 1;
    *tables = fresh;

    if diagnostics.road_cells > 0 {
        let frac = diagnostics.unreachable_gate as f32 / diagnostics.road_cells as f32;
        if frac > warn_fraction {
            warn!(
                "routing: {}/{} road cells ({:.1}%) cannot reach the gate",
                diagnostics.unreachable_gate,
                diagnostics.road_cells,
                frac * 100.0
            );
        }
        let frac = diagnostics.unreachable_lots as f32 / diagnostics.road_cells as f32;
        if frac > warn_fraction {
            warn!(
                "routing: {}/{} road cells ({:.1}%) cannot reach any admitting lot",
                diagnostics.unreachable_lots,
                diagnostics.road_cells,
                frac * 100.0
            );
        }
    }
    debug!(
        "routing committed v{} in {:?}",
        tables.version, diagnostics.build_time
    );
}

/// `PreSim`: poll the in-flight solve; on completion, publish the new tables
/// in one swap and restart if another request arrived mid-build.
pub fn poll_routing_rebuild(
    params: Res<SimParams>,
    mut rebuild: ResMut<RoutingRebuild>,
    mut tables: ResMut<RoutingTables>,
) {
    let Some(task) = rebuild.task.as_mut() else {
        return;
    };
    let Some(built) = block_on(futures_lite::future::poll_once(task)) else {
        return;
    };
    rebuild.task = None;
    commit(
        &mut tables,
        built,
        params.routing.unreachable_warn_fraction,
    );
    rebuild.completed_builds += 1;
    if rebuild.pending {
        rebuild.pending = false;
        rebuild.dirty = true;
    }
}

/// `PreSim`: start a solve if one is due and none is in flight.
pub fn kick_routing_rebuild(
    params: Res<SimParams>,
    grid: Res<CorridorGrid>,
    lots: Res<LotRegistry>,
    mut rebuild: ResMut<RoutingRebuild>,
) {
    if grid.is_empty() || rebuild.in_flight() || !rebuild.due() {
        return;
    }
    rebuild.clear_requests();
    let input = RoutingBuildInput::snapshot(&grid, &lots, &params);
    let task = AsyncComputeTaskPool::get().spawn(async move { build_routing(&input) });
    rebuild.task = Some(task);
}

/// Runtime control: solve synchronously on the calling thread and commit.
/// Cancels any in-flight background solve first; its result would be stale.
pub fn force_rebuild(
    grid: &CorridorGrid,
    lots: &LotRegistry,
    params: &SimParams,
    tables: &mut RoutingTables,
    rebuild: &mut RoutingRebuild,
) {
    rebuild.task = None;
    rebuild.pending = false;
    rebuild.clear_requests();
    if grid.is_empty() {
        return;
    }
    let input = RoutingBuildInput::snapshot(grid, lots, params);
    let built = build_routing(&input);
    commit(tables, built, params.routing.unreachable_warn_fraction);
    rebuild.completed_builds += 1;
}
