//! Corridor-wide metrics: cumulative totals, live mass, and windowed rates.
//!
//! `CorridorStats` is the engine's public metrics surface. Cumulative
//! counters are bumped by the systems that own the corresponding flows
//! (injection, clearance service, gate drain); the live totals, gate
//! backlog, and hourly rates are recomputed here each frame from the
//! density fields.

use std::collections::VecDeque;

use bevy::prelude::*;
use serde::Serialize;

use crate::density::DensityGrids;
use crate::grid::CorridorGrid;
use crate::sim_clock::SimClock;

/// Seconds of sim time between rate samples (0.1 h).
const SAMPLE_INTERVAL_S: f64 = 360.0;

/// Sim seconds of history kept for the rate window.
const SAMPLE_HORIZON_S: f64 = 2.0 * 3_600.0;

/// Minimum window age before a rate is reported instead of 0.
const MIN_RATE_WINDOW_S: f64 = 600.0;

#[derive(Debug, Clone, Copy)]
struct RateSample {
    sim_time_s: f64,
    injected_kg: f64,
    drained_kg: f64,
    converted_kg: f64,
}

/// Metrics resource; `Serialize` so callers can ship it as a report.
#[derive(Resource, Debug, Clone, Default, Serialize)]
pub struct CorridorStats {
    // Cumulative flows.
    pub injected_total_kg: f64,
    pub injected_restricted_kg: f64,
    pub injected_cleared_kg: f64,
    pub drained_total_kg: f64,
    pub converted_total_kg: f64,

    // Live mass, recomputed each frame.
    pub restricted_kg: f64,
    pub staging_kg: f64,
    pub lot_stored_kg: f64,
    pub park_wait_kg: f64,
    pub cleared_kg: f64,
    pub total_kg: f64,
    /// Mobile mass within the configured radius of the gate.
    pub backlog_near_gate_kg: f64,

    // Windowed rates over roughly the last hour.
    pub inflow_kg_per_hr: f64,
    pub throughput_kg_per_hr: f64,
    pub conversion_kg_per_hr: f64,

    #[serde(skip)]
    near_gate_cells: Vec<u32>,
    #[serde(skip)]
    samples: VecDeque<RateSample>,
}

impl CorridorStats {
    /// Precompute the backlog footprint: every cell within `radius`
    /// (Chebyshev) of a sink cell. Called once at attach.
    pub fn configure_backlog_cells(&mut self, grid: &CorridorGrid, radius: i32) {
        self.near_gate_cells.clear();
        for idx in 0..grid.len() {
            let near = grid
                .sink_cells
                .iter()
                .any(|&s| grid.chebyshev(idx, s as usize) <= i64::from(radius));
            if near {
                self.near_gate_cells.push(idx as u32);
            }
        }
    }

    fn push_sample(&mut self, sim_time_s: f64) {
        let due = match self.samples.back() {
            Some(last) => sim_time_s - last.sim_time_s >= SAMPLE_INTERVAL_S,
            None => true,
        };
        if !due {
            return;
        }
        self.samples.push_back(RateSample {
            sim_time_s,
            injected_kg: self.injected_total_kg,
            drained_kg: self.drained_total_kg,
            converted_kg: self.converted_total_kg,
        });
        while let Some(front) = self.samples.front() {
            if sim_time_s - front.sim_time_s > SAMPLE_HORIZON_S {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn refresh_rates(&mut self, sim_time_s: f64) {
        // Reference sample: the one closest to an hour old.
        let target = sim_time_s - 3_600.0;
        let reference = self
            .samples
            .iter()
            .min_by(|a, b| {
                (a.sim_time_s - target)
                    .abs()
                    .total_cmp(&(b.sim_time_s - target).abs())
            })
            .copied();
        let Some(reference) = reference else {
            return;
        };
        let window_s = sim_time_s - reference.sim_time_s;
        if window_s < MIN_RATE_WINDOW_S {
            self.inflow_kg_per_hr = 0.0;
            self.throughput_kg_per_hr = 0.0;
            self.conversion_kg_per_hr = 0.0;
            return;
        }
        let hours = window_s / 3_600.0;
        self.inflow_kg_per_hr = (self.injected_total_kg - reference.injected_kg) / hours;
        self.throughput_kg_per_hr = (self.drained_total_kg - reference.drained_kg) / hours;
        self.conversion_kg_per_hr = (self.converted_total_kg - reference.converted_kg) / hours;
    }
}

/// `PostSim` refresh of live totals, backlog, and rates.
pub fn update_stats(
    clock: Res<SimClock>,
    densities: Res<DensityGrids>,
    mut stats: ResMut<CorridorStats>,
) {
    stats.restricted_kg = densities.restricted_mass();
    stats.staging_kg = densities.staging_mass();
    stats.lot_stored_kg = densities.lot_mass();
    stats.park_wait_kg = densities.park_mass();
    stats.cleared_kg = densities.cleared_mass();
    stats.total_kg = stats.restricted_kg
        + stats.staging_kg
        + stats.lot_stored_kg
        + stats.park_wait_kg
        + stats.cleared_kg;

    let mut backlog = 0.0f64;
    for &cell in &stats.near_gate_cells {
        let c = cell as usize;
        backlog += densities.restricted[c] + densities.cleared[c];
    }
    stats.backlog_near_gate_kg = backlog;

    stats.push_sample(clock.sim_time_s);
    stats.refresh_rates(clock.sim_time_s);
}
