//! Scenario bundle contract: hourly inflow and gate capacity.
//!
//! Loading, validation, and baseline/alternative interpolation happen in the
//! collaborator that owns scenario files; this module only defines the
//! lookup surface the engine consumes, plus the per-hour schedule resource
//! refreshed when the simulated hour rolls over. Maps are `BTreeMap` so
//! summation order is deterministic across runs.

use std::collections::BTreeMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::sim_clock::SimClock;

/// Hourly schedule tables, keyed by hour of the simulated day (0..24).
/// A missing hour yields 0; absent data means no flow, not an error.
#[derive(Resource, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioBundle {
    /// Hour → HS-code → inflow kg for that hour.
    pub inflow_kg: BTreeMap<u32, BTreeMap<String, f64>>,
    /// Hour → gate drain capacity, kg per hour.
    pub gate_capacity_kg_per_hour: BTreeMap<u32, f64>,
}

impl ScenarioBundle {
    /// Total inflow for an hour of day, summed over commodity codes.
    pub fn inflow_kg(&self, hour_of_day: u32) -> f64 {
        self.inflow_kg
            .get(&hour_of_day)
            .map(|codes| codes.values().sum())
            .unwrap_or(0.0)
    }

    /// Gate drain capacity for an hour of day, kg per hour.
    pub fn gate_capacity(&self, hour_of_day: u32) -> f64 {
        self.gate_capacity_kg_per_hour
            .get(&hour_of_day)
            .copied()
            .unwrap_or(0.0)
    }

    /// Flat-rate helper used by drivers and tests: the same inflow and gate
    /// capacity for all 24 hours.
    pub fn flat(inflow_kg_per_hour: f64, gate_capacity_kg_per_hour: f64) -> Self {
        let mut bundle = Self::default();
        for hour in 0..24 {
            bundle
                .inflow_kg
                .entry(hour)
                .or_default()
                .insert("all".to_string(), inflow_kg_per_hour);
            bundle
                .gate_capacity_kg_per_hour
                .insert(hour, gate_capacity_kg_per_hour);
        }
        bundle
    }
}

/// Values the engine reads every frame, refreshed once per simulated hour.
#[derive(Resource, Debug, Clone)]
pub struct HourlySchedule {
    last_hour: i64,
    /// Aggregate source injection rate, kg per sim-second.
    pub source_rate_kg_s: f64,
    /// Gate drain cap, kg per hour.
    pub gate_cap_kg_per_hour: f64,
}

impl Default for HourlySchedule {
    fn default() -> Self {
        Self {
            last_hour: -1,
            source_rate_kg_s: 0.0,
            gate_cap_kg_per_hour: 0.0,
        }
    }
}

impl HourlySchedule {
    /// Force a refresh on the next frame (used after swapping bundles).
    pub fn invalidate(&mut self) {
        self.last_hour = -1;
    }
}

/// `PreSim` system: reload the hourly values when the sim hour rolls over.
pub fn update_hourly_schedule(
    clock: Res<SimClock>,
    bundle: Res<ScenarioBundle>,
    mut schedule: ResMut<HourlySchedule>,
) {
    let hour = clock.sim_hour();
    if hour == schedule.last_hour {
        return;
    }
    schedule.last_hour = hour;
    let hour_of_day = clock.hour_of_day();
    schedule.source_rate_kg_s = bundle.inflow_kg(hour_of_day) / 3_600.0;
    schedule.gate_cap_kg_per_hour = bundle.gate_capacity(hour_of_day);
}
