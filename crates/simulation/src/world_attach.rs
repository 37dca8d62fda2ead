//! Attach contract: turning a collaborator-supplied rasterized context into
//! live engine resources.
//!
//! Projection and rasterization happen upstream: the context arrives with
//! the conductance tensors, road classes, and sink falloff already stamped
//! into dense arrays, plus lot polygons reduced to cell lists. Attach
//! validates the bundle, derives everything the engine precomputes (sparse
//! lists, lot capacities and egress cells, park release cells, source
//! phases), resets the dynamic state, and schedules the first routing
//! build. The engine is memoryless across attaches.

use std::fmt;

use bevy::prelude::*;
use pathfinding::prelude::bfs_reach;
use rand::Rng;

use crate::density::DensityGrids;
use crate::grid::{CorridorGrid, Region, RoadClass};
use crate::lots::{Lot, LotRegistry, Park, ParkRegistry};
use crate::params::SimParams;
use crate::routing::{RebuildReason, RoutingRebuild, RoutingTables};
use crate::scenario::HourlySchedule;
use crate::sim_clock::SimClock;
use crate::sim_rng::SimRng;
use crate::sources::{MassSource, SourceKind, SourceRegistry};
use crate::staging::StagingBuckets;
use crate::stats::CorridorStats;
use crate::transport::OverflowDiagnostics;
use crate::trucks::TruckFleet;
use crate::clearance::ClearanceQueue;

/// How a stamped polygon participates in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LotClass {
    /// Staging lot: stores restricted mass until clearance.
    Conversion,
    /// Industrial park: wait zone + source area.
    IndustrialPark,
}

/// One rasterized polygon from the collaborator.
#[derive(Debug, Clone)]
pub struct LotSpec {
    pub id: u32,
    pub class: LotClass,
    pub cells: Vec<u32>,
}

/// One injection site from the collaborator.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub id: u32,
    pub cell: u32,
    pub weight: f32,
    /// Set when the source feeds an industrial park instead of the road.
    pub park_id: Option<u32>,
}

/// The full attach bundle.
pub struct CorridorContext {
    pub n: usize,
    pub cell_size_m: f32,
    pub origin_x_m: f32,
    pub origin_y_m: f32,
    pub k_xx: Vec<f32>,
    pub k_yy: Vec<f32>,
    pub k_xy: Vec<f32>,
    pub g_sink: Vec<f32>,
    pub road_class: Vec<RoadClass>,
    pub lots: Vec<LotSpec>,
    pub sources: Vec<SourceSpec>,
}

/// Attach-time contract violations. The frame path never errors; only
/// attach can reject its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachError {
    EmptyGrid,
    DimensionMismatch { field: &'static str, expected: usize, got: usize },
    NoSink,
    CellOutOfBounds { what: &'static str, id: u32, cell: u32 },
    UnknownPark { source_id: u32, park_id: u32 },
    NoRoadAccess { lot_id: u32 },
}

impl fmt::Display for AttachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachError::EmptyGrid => write!(f, "context grid is empty"),
            AttachError::DimensionMismatch { field, expected, got } => {
                write!(f, "field {field} has {got} cells, expected {expected}")
            }
            AttachError::NoSink => write!(f, "context has no sink cell (g_sink is all zero)"),
            AttachError::CellOutOfBounds { what, id, cell } => {
                write!(f, "{what} {id} references out-of-bounds cell {cell}")
            }
            AttachError::UnknownPark { source_id, park_id } => {
                write!(f, "source {source_id} references unknown park {park_id}")
            }
            AttachError::NoRoadAccess { lot_id } => {
                write!(f, "lot {lot_id} has no road-adjacent egress cell")
            }
        }
    }
}

fn validate(ctx: &CorridorContext) -> Result<(), AttachError> {
    if ctx.n == 0 {
        return Err(AttachError::EmptyGrid);
    }
    let expected = ctx.n * ctx.n;
    for (field, len) in [
        ("k_xx", ctx.k_xx.len()),
        ("k_yy", ctx.k_yy.len()),
        ("k_xy", ctx.k_xy.len()),
        ("g_sink", ctx.g_sink.len()),
        ("road_class", ctx.road_class.len()),
    ] {
        if len != expected {
            return Err(AttachError::DimensionMismatch {
                field,
                expected,
                got: len,
            });
        }
    }
    if !ctx.g_sink.iter().any(|&g| g > 0.0) {
        return Err(AttachError::NoSink);
    }
    for lot in &ctx.lots {
        for &cell in &lot.cells {
            if cell as usize >= expected {
                return Err(AttachError::CellOutOfBounds {
                    what: "lot",
                    id: lot.id,
                    cell,
                });
            }
        }
    }
    for src in &ctx.sources {
        if src.cell as usize >= expected {
            return Err(AttachError::CellOutOfBounds {
                what: "source",
                id: src.id,
                cell: src.cell,
            });
        }
    }
    Ok(())
}

/// Nearest traversable non-lot cell reachable from a polygon: direct
/// 4-neighbor scan first, then a breadth-first expansion.
fn find_road_access(grid: &CorridorGrid, cells: &[u32], k_threshold: f32) -> Option<u32> {
    let in_polygon = |idx: usize| cells.contains(&(idx as u32));
    for &cell in cells {
        let (neighbors, count) = grid.neighbors4(cell as usize);
        for &nb in &neighbors[..count] {
            if grid.region[nb] != Region::Lot
                && !in_polygon(nb)
                && grid.traversable(nb, k_threshold)
            {
                return Some(nb as u32);
            }
        }
    }
    let Some(&start) = cells.first() else {
        return None;
    };
    bfs_reach(start as usize, |&cell| {
        let (neighbors, count) = grid.neighbors8(cell);
        neighbors[..count].to_vec()
    })
    .find(|&cell| {
        grid.region[cell] != Region::Lot && !in_polygon(cell) && grid.traversable(cell, k_threshold)
    })
    .map(|cell| cell as u32)
}

/// Apply a context to the world, replacing all engine state.
pub fn attach(world: &mut World, ctx: CorridorContext) -> Result<(), AttachError> {
    validate(&ctx)?;
    let params = world.resource::<SimParams>().clone();

    // Dense grid.
    let mut grid = CorridorGrid::new(ctx.n, ctx.cell_size_m, ctx.origin_x_m, ctx.origin_y_m);
    grid.k_xx = ctx.k_xx;
    grid.k_yy = ctx.k_yy;
    grid.k_xy = ctx.k_xy;
    grid.g_sink = ctx.g_sink;
    grid.road_class = ctx.road_class;

    // Stamp regions. Conversion lots become `Region::Lot`; park zones stay
    // corridor cells with a park mapping.
    let mut park_specs = Vec::new();
    let mut lot_specs = Vec::new();
    for spec in &ctx.lots {
        match spec.class {
            LotClass::Conversion => {
                let lot_idx = lot_specs.len() as i32;
                for &cell in &spec.cells {
                    grid.region[cell as usize] = Region::Lot;
                    grid.cell_to_lot[cell as usize] = lot_idx;
                }
                lot_specs.push(spec.clone());
            }
            LotClass::IndustrialPark => {
                let park_idx = park_specs.len() as i32;
                for &cell in &spec.cells {
                    grid.cell_to_park[cell as usize] = park_idx;
                }
                park_specs.push(spec.clone());
            }
        }
    }
    grid.rebuild_sparse_lists(params.flow.k_threshold);

    // Lots: capacity from area, egress from road access.
    let cell_area = f64::from(grid.cell_size) * f64::from(grid.cell_size);
    let mut registry = LotRegistry::default();
    for spec in &lot_specs {
        let egress = find_road_access(&grid, &spec.cells, params.flow.k_threshold)
            .ok_or(AttachError::NoRoadAccess { lot_id: spec.id })?;
        let area_m2 = spec.cells.len() as f64 * cell_area;
        registry.lots.push(Lot {
            id: spec.id,
            cells: spec.cells.clone(),
            area_m2,
            capacity_kg: area_m2 * params.lots.kg_per_m2,
            mass_kg: 0.0,
            is_full: false,
            scatter_cursor: 0,
            egress_cell: egress,
        });
    }

    // Parks: release cell from road access.
    let mut parks = ParkRegistry::default();
    for spec in &park_specs {
        let release = find_road_access(&grid, &spec.cells, params.flow.k_threshold)
            .ok_or(AttachError::NoRoadAccess { lot_id: spec.id })?;
        parks.parks.push(Park {
            id: spec.id,
            cells: spec.cells.clone(),
            release_cell: release,
        });
    }

    // Sources, with deterministic pulse phases drawn from the sim stream.
    let mut sources = SourceRegistry::default();
    {
        let mut rng = world.resource_mut::<SimRng>();
        for spec in &ctx.sources {
            let kind = match spec.park_id {
                Some(park_id) => {
                    let park_idx = parks
                        .parks
                        .iter()
                        .position(|p| p.id == park_id)
                        .ok_or(AttachError::UnknownPark {
                            source_id: spec.id,
                            park_id,
                        })?;
                    SourceKind::Park(park_idx)
                }
                None => SourceKind::Road,
            };
            let phase: f32 = rng.0.gen_range(0.0..std::f32::consts::TAU);
            let jitter: f32 = rng.0.gen_range(0.0..0.5);
            sources.sources.push(MassSource::new(
                spec.id, spec.cell, spec.weight, kind, phase, jitter,
            ));
        }
    }

    // Buffers and derived state.
    let mut densities = DensityGrids::default();
    densities.resize(grid.len());
    let mut tables = RoutingTables::default();
    tables.resize(grid.len());
    let mut buckets = StagingBuckets::default();
    buckets.configure(params.staging.bucket_count);
    let mut diag = OverflowDiagnostics::default();
    diag.configure(registry.lots.len());
    let mut stats = CorridorStats::default();
    stats.configure_backlog_cells(&grid, params.trucks.gate_backlog_radius);
    let mut rebuild = RoutingRebuild::default();
    rebuild.debounce = std::time::Duration::from_millis(params.routing.rebuild_debounce_ms);
    rebuild.request(RebuildReason::Geometry);

    info!(
        "corridor attached: {}x{} cells, {} road cells, {} lots, {} parks, {} sources",
        grid.n,
        grid.n,
        grid.road_cells.len(),
        registry.lots.len(),
        parks.parks.len(),
        sources.sources.len()
    );

    world.insert_resource(grid);
    world.insert_resource(densities);
    world.insert_resource(registry);
    world.insert_resource(parks);
    world.insert_resource(sources);
    world.insert_resource(tables);
    world.insert_resource(rebuild);
    world.insert_resource(buckets);
    world.insert_resource(diag);
    world.insert_resource(stats);
    world.insert_resource(TruckFleet::default());
    world.insert_resource(ClearanceQueue::default());
    world.insert_resource(SimClock::default());
    world.insert_resource(HourlySchedule::default());
    Ok(())
}

/// Drop all engine state; the next attach starts from nothing.
pub fn detach(world: &mut World) {
    world.insert_resource(CorridorGrid::default());
    world.insert_resource(DensityGrids::default());
    world.insert_resource(LotRegistry::default());
    world.insert_resource(ParkRegistry::default());
    world.insert_resource(SourceRegistry::default());
    world.insert_resource(RoutingTables::default());
    world.insert_resource(RoutingRebuild::default());
    world.insert_resource(StagingBuckets::default());
    world.insert_resource(OverflowDiagnostics::default());
    world.insert_resource(CorridorStats::default());
    world.insert_resource(TruckFleet::default());
    world.insert_resource(ClearanceQueue::default());
    world.insert_resource(SimClock::default());
    world.insert_resource(HourlySchedule::default());
}
