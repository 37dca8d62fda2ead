//! # TestCorridor: headless harness for integration tests and drivers.
//!
//! Wraps `bevy::app::App` + [`crate::CorridorSimPlugin`] behind a fluent
//! builder that stamps simple synthetic geometry (axis-aligned road
//! segments, rectangular lots and parks) into an attach context, then runs
//! the engine frame by frame with a fixed real-dt so runs are reproducible.
//!
//! The harness commits routing synchronously at attach and raises the
//! occupancy-rebuild debounce to an hour, so tests control exactly when
//! tables change; the asynchronous rebuild path is exercised explicitly by
//! the tests that cover it.

use std::time::Duration;

use bevy::app::App;
use bevy::prelude::*;

use crate::clearance::ClearanceQueue;
use crate::config::SIM_TIME_SCALE;
use crate::density::DensityGrids;
use crate::grid::{CorridorGrid, RoadClass};
use crate::invariant_checks::InvariantViolations;
use crate::lots::LotRegistry;
use crate::params::SimParams;
use crate::routing::{force_rebuild, RoutingRebuild, RoutingTables};
use crate::scenario::ScenarioBundle;
use crate::sim_clock::SimClock;
use crate::sim_rng::SimRng;
use crate::sources::SourceRegistry;
use crate::stats::CorridorStats;
use crate::trucks::TruckFleet;
use crate::world_attach::{attach, CorridorContext, LotClass, LotSpec, SourceSpec};
use crate::CorridorSimPlugin;

/// A headless corridor under test.
pub struct TestCorridor {
    app: App,
    ctx: CorridorContext,
}

impl TestCorridor {
    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Empty n×n world, `cell_size_m` meters per cell, origin at (0, 0).
    pub fn new(n: usize, cell_size_m: f32) -> Self {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_plugins(CorridorSimPlugin);
        let len = n * n;
        let ctx = CorridorContext {
            n,
            cell_size_m,
            origin_x_m: 0.0,
            origin_y_m: 0.0,
            k_xx: vec![0.0; len],
            k_yy: vec![0.0; len],
            k_xy: vec![0.0; len],
            g_sink: vec![0.0; len],
            road_class: vec![RoadClass::Highway; len],
            lots: Vec::new(),
            sources: Vec::new(),
        };
        Self { app, ctx }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.app
            .world_mut()
            .insert_resource(SimRng::from_seed_u64(seed));
        self
    }

    pub fn with_params(mut self, tweak: impl FnOnce(&mut SimParams)) -> Self {
        let mut params = self.app.world_mut().resource_mut::<SimParams>();
        tweak(&mut params);
        self
    }

    /// Flat scenario: constant inflow and gate capacity all day.
    pub fn with_flat_scenario(mut self, inflow_kg_per_hour: f64, gate_cap_kg_per_hour: f64) -> Self {
        self.app
            .world_mut()
            .insert_resource(ScenarioBundle::flat(inflow_kg_per_hour, gate_cap_kg_per_hour));
        self
    }

    pub fn with_scenario(mut self, bundle: ScenarioBundle) -> Self {
        self.app.world_mut().insert_resource(bundle);
        self
    }

    // -----------------------------------------------------------------------
    // Geometry stamping (axis-aligned shapes only; real rasterization is a
    // collaborator concern)
    // -----------------------------------------------------------------------

    fn idx(&self, x: usize, y: usize) -> usize {
        y * self.ctx.n + x
    }

    fn stamp_segment(&mut self, x0: usize, y0: usize, x1: usize, y1: usize, class: RoadClass) {
        assert!(
            x0 == x1 || y0 == y1,
            "harness roads are axis-aligned; split diagonal segments"
        );
        for y in y0.min(y1)..=y0.max(y1) {
            for x in x0.min(x1)..=x0.max(x1) {
                let idx = self.idx(x, y);
                self.ctx.k_xx[idx] = 1.0;
                self.ctx.k_yy[idx] = 1.0;
                self.ctx.road_class[idx] = class;
            }
        }
    }

    pub fn with_highway(mut self, x0: usize, y0: usize, x1: usize, y1: usize) -> Self {
        self.stamp_segment(x0, y0, x1, y1, RoadClass::Highway);
        self
    }

    pub fn with_city_street(mut self, x0: usize, y0: usize, x1: usize, y1: usize) -> Self {
        self.stamp_segment(x0, y0, x1, y1, RoadClass::City);
        self
    }

    /// Gate cell; also stamps road under it so the sink is reachable.
    pub fn with_gate(mut self, x: usize, y: usize) -> Self {
        let idx = self.idx(x, y);
        self.ctx.k_xx[idx] = 1.0;
        self.ctx.k_yy[idx] = 1.0;
        self.ctx.g_sink[idx] = 1.0;
        self
    }

    fn rect_cells(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> Vec<u32> {
        let mut cells = Vec::new();
        for y in y0.min(y1)..=y0.max(y1) {
            for x in x0.min(x1)..=x0.max(x1) {
                cells.push(self.idx(x, y) as u32);
            }
        }
        cells
    }

    pub fn with_lot(mut self, id: u32, x0: usize, y0: usize, x1: usize, y1: usize) -> Self {
        let cells = self.rect_cells(x0, y0, x1, y1);
        self.ctx.lots.push(LotSpec {
            id,
            class: LotClass::Conversion,
            cells,
        });
        self
    }

    pub fn with_park(mut self, id: u32, x0: usize, y0: usize, x1: usize, y1: usize) -> Self {
        let cells = self.rect_cells(x0, y0, x1, y1);
        self.ctx.lots.push(LotSpec {
            id,
            class: LotClass::IndustrialPark,
            cells,
        });
        self
    }

    pub fn with_source(mut self, id: u32, x: usize, y: usize, weight: f32) -> Self {
        let cell = self.idx(x, y) as u32;
        self.ctx.sources.push(SourceSpec {
            id,
            cell,
            weight,
            park_id: None,
        });
        self
    }

    pub fn with_park_source(mut self, id: u32, x: usize, y: usize, weight: f32, park_id: u32) -> Self {
        let cell = self.idx(x, y) as u32;
        self.ctx.sources.push(SourceSpec {
            id,
            cell,
            weight,
            park_id: Some(park_id),
        });
        self
    }

    // -----------------------------------------------------------------------
    // Attach & run
    // -----------------------------------------------------------------------

    /// Apply the drafted context, commit routing synchronously, and pin the
    /// frame dt so subsequent ticks are deterministic.
    pub fn attach(mut self) -> Self {
        let ctx = std::mem::replace(
            &mut self.ctx,
            CorridorContext {
                n: 0,
                cell_size_m: 1.0,
                origin_x_m: 0.0,
                origin_y_m: 0.0,
                k_xx: Vec::new(),
                k_yy: Vec::new(),
                k_xy: Vec::new(),
                g_sink: Vec::new(),
                road_class: Vec::new(),
                lots: Vec::new(),
                sources: Vec::new(),
            },
        );
        let world = self.app.world_mut();
        attach(world, ctx).expect("harness context must attach");

        // Deterministic tests: no background solve racing the frame loop.
        world.resource_scope(|world, mut rebuild: Mut<RoutingRebuild>| {
            rebuild.debounce = Duration::from_secs(3_600);
            world.resource_scope(|world, mut tables: Mut<RoutingTables>| {
                let grid = world.resource::<CorridorGrid>();
                let lots = world.resource::<LotRegistry>();
                let params = world.resource::<SimParams>();
                force_rebuild(grid, lots, params, &mut tables, &mut rebuild);
            });
        });

        world.resource_mut::<SimClock>().fixed_frame_dt = Some(1.0 / 60.0);
        // One warm-up pass so startup systems settle before measurements.
        self.app.update();
        self
    }

    /// Rebuild routing synchronously right now (occupancy changes applied).
    pub fn force_rebuild_now(&mut self) {
        let world = self.app.world_mut();
        world.resource_scope(|world, mut rebuild: Mut<RoutingRebuild>| {
            world.resource_scope(|world, mut tables: Mut<RoutingTables>| {
                let grid = world.resource::<CorridorGrid>();
                let lots = world.resource::<LotRegistry>();
                let params = world.resource::<SimParams>();
                force_rebuild(grid, lots, params, &mut tables, &mut rebuild);
            });
        });
    }

    /// Advance one frame at the pinned real dt.
    pub fn tick(&mut self) {
        self.app.update();
    }

    /// Real seconds per frame currently pinned on the clock.
    pub fn frame_real_dt(&self) -> f32 {
        self.app
            .world()
            .resource::<SimClock>()
            .fixed_frame_dt
            .unwrap_or(1.0 / 60.0)
    }

    /// Sim seconds one frame advances at the current speed.
    pub fn frame_sim_dt(&self) -> f32 {
        let clock = self.app.world().resource::<SimClock>();
        (self.frame_real_dt() * SIM_TIME_SCALE * clock.speed).min(120.0)
    }

    /// Run whole frames until at least `sim_seconds` have elapsed.
    pub fn run_sim_seconds(&mut self, sim_seconds: f64) {
        let start = self.clock().sim_time_s;
        while self.clock().sim_time_s - start < sim_seconds {
            self.tick();
        }
    }

    pub fn run_sim_hours(&mut self, hours: f64) {
        self.run_sim_seconds(hours * 3_600.0);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn world(&self) -> &World {
        self.app.world()
    }

    pub fn world_mut(&mut self) -> &mut World {
        self.app.world_mut()
    }

    pub fn clock(&self) -> &SimClock {
        self.app.world().resource::<SimClock>()
    }

    pub fn clock_mut(&mut self) -> Mut<'_, SimClock> {
        self.app.world_mut().resource_mut::<SimClock>()
    }

    pub fn grid(&self) -> &CorridorGrid {
        self.app.world().resource::<CorridorGrid>()
    }

    pub fn densities(&self) -> &DensityGrids {
        self.app.world().resource::<DensityGrids>()
    }

    pub fn stats(&self) -> &CorridorStats {
        self.app.world().resource::<CorridorStats>()
    }

    pub fn routing(&self) -> &RoutingTables {
        self.app.world().resource::<RoutingTables>()
    }

    pub fn lots(&self) -> &LotRegistry {
        self.app.world().resource::<LotRegistry>()
    }

    pub fn fleet(&self) -> &TruckFleet {
        self.app.world().resource::<TruckFleet>()
    }

    pub fn queue(&self) -> &ClearanceQueue {
        self.app.world().resource::<ClearanceQueue>()
    }

    pub fn sources(&self) -> &SourceRegistry {
        self.app.world().resource::<SourceRegistry>()
    }

    pub fn violations(&self) -> &InvariantViolations {
        self.app.world().resource::<InvariantViolations>()
    }

    pub fn total_mass(&self) -> f64 {
        self.densities().total_mass()
    }
}
