//! Flux solver benchmark: one restricted + one cleared substep over a
//! loaded 256x256 corridor.

use criterion::{criterion_group, criterion_main, Criterion};

use simulation::density::DensityGrids;
use simulation::grid::{CorridorGrid, Region};
use simulation::lots::{Lot, LotRegistry};
use simulation::params::SimParams;
use simulation::routing::{build_routing, RoutingBuildInput};
use simulation::staging::StagingBuckets;
use simulation::transport::{flux_substep_cleared, flux_substep_restricted, OverflowDiagnostics};

fn build_world() -> (
    CorridorGrid,
    LotRegistry,
    SimParams,
    simulation::routing::RoutingTables,
    DensityGrids,
) {
    let params = SimParams::default();
    let n = 256;
    let mut grid = CorridorGrid::new(n, 100.0, 0.0, 0.0);

    // Road lattice every 16 rows/columns.
    for line in (8..n).step_by(16) {
        for i in 0..n {
            let h = grid.idx(i, line);
            grid.k_xx[h] = 1.0;
            let v = grid.idx(line, i);
            grid.k_yy[v] = 1.0;
        }
    }
    grid.g_sink[grid.idx(8, 8)] = 1.0;

    // A handful of lots along one corridor.
    let mut registry = LotRegistry::default();
    for (lot_idx, x0) in (40..200).step_by(48).enumerate() {
        let mut cells = Vec::new();
        for y in 9..13usize {
            for x in x0..x0 + 4 {
                let idx = grid.idx(x, y);
                grid.region[idx] = Region::Lot;
                grid.cell_to_lot[idx] = lot_idx as i32;
                cells.push(idx as u32);
            }
        }
        registry.lots.push(Lot {
            id: lot_idx as u32,
            cells,
            area_m2: 160_000.0,
            capacity_kg: 4.0e7,
            mass_kg: 0.0,
            is_full: false,
            scatter_cursor: 0,
            egress_cell: grid.idx(x0, 8) as u32,
        });
    }
    grid.rebuild_sparse_lists(params.flow.k_threshold);

    let tables = build_routing(&RoutingBuildInput::snapshot(&grid, &registry, &params)).tables;

    let mut densities = DensityGrids::default();
    densities.resize(grid.len());
    for (i, &cell) in grid.road_cells.iter().enumerate() {
        let c = cell as usize;
        if grid.region[c] == Region::Lot {
            continue;
        }
        densities.restricted[c] = 500.0 + (i % 17) as f64 * 100.0;
        densities.cleared[c] = 300.0 + (i % 11) as f64 * 80.0;
    }
    (grid, registry, params, tables, densities)
}

fn bench_flux(c: &mut Criterion) {
    let (grid, mut registry, params, tables, mut densities) = build_world();
    let mut buckets = StagingBuckets::default();
    buckets.configure(params.staging.bucket_count);
    let mut diag = OverflowDiagnostics::default();
    diag.configure(registry.lots.len());

    c.bench_function("flux_substep_restricted_256", |b| {
        b.iter(|| {
            registry.rebuild_live_acceptance(params.lots.capacity_threshold);
            flux_substep_restricted(
                &grid,
                &params,
                &tables,
                &mut registry,
                &mut buckets,
                &mut diag,
                &mut densities,
                0x5eed,
            );
        })
    });

    c.bench_function("flux_substep_cleared_256", |b| {
        b.iter(|| {
            flux_substep_cleared(&grid, &params, &tables, &mut densities);
        })
    });
}

criterion_group!(benches, bench_flux);
criterion_main!(benches);
