//! Roadside staging: a bucketed delay ring for restricted mass held
//! upstream of lot entries.
//!
//! Instead of per-parcel timers, held mass is written into a ring of
//! sim-time buckets. A deposit spreads equally across every bucket whose
//! offset from the head spans the configured hold window, which yields a
//! uniform release distribution over `[min_hold_s, max_hold_s]`. As sim
//! time passes, matured buckets are emptied back into the mobile restricted
//! field at the cell the mass was held on.

use std::collections::BTreeMap;

use bevy::prelude::*;

use crate::density::DensityGrids;
use crate::params::SimParams;
use crate::sim_clock::SimClock;

/// The delay ring. One bucket spans `bucket_width_s` of sim time; the head
/// bucket is the next to mature.
#[derive(Resource, Default)]
pub struct StagingBuckets {
    /// cell → pending kg. `BTreeMap` keeps release order deterministic.
    buckets: Vec<BTreeMap<u32, f64>>,
    head: usize,
    accum_s: f32,
    live_total: f64,
}

impl StagingBuckets {
    /// Reset the ring to `count` empty buckets.
    pub fn configure(&mut self, count: usize) {
        self.buckets.clear();
        self.buckets.resize_with(count, BTreeMap::new);
        self.head = 0;
        self.accum_s = 0.0;
        self.live_total = 0.0;
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Held kg across the whole ring. Must equal the `staging` field total.
    pub fn live_total(&self) -> f64 {
        self.live_total
    }

    /// Sum over all buckets, recomputed. Diagnostic counterpart of
    /// `live_total`.
    pub fn recomputed_total(&self) -> f64 {
        self.buckets.iter().flat_map(|b| b.values()).sum()
    }

    /// Schedule `kg` held at `cell` for release across the hold window.
    pub fn schedule(&mut self, cell: u32, kg: f64, min_hold_s: f32, max_hold_s: f32, width_s: f32) {
        if kg <= 0.0 || self.buckets.is_empty() {
            return;
        }
        let count = self.buckets.len();
        let first = ((min_hold_s / width_s).floor() as usize).max(1);
        let last = ((max_hold_s / width_s).ceil() as usize).min(count - 1);
        let last = last.max(first);
        let spread = last - first + 1;
        let share = kg / spread as f64;
        for offset in first..=last {
            let slot = (self.head + offset) % count;
            *self.buckets[slot].entry(cell).or_insert(0.0) += share;
        }
        self.live_total += kg;
    }

    /// Advance sim time; each elapsed bucket width matures one bucket,
    /// moving its entries from the staging field back into mobile
    /// restricted mass.
    pub fn advance(
        &mut self,
        dt_sim: f32,
        width_s: f32,
        restricted: &mut [f64],
        staging: &mut [f64],
    ) {
        if self.buckets.is_empty() || width_s <= 0.0 {
            return;
        }
        self.accum_s += dt_sim;
        while self.accum_s >= width_s {
            self.accum_s -= width_s;
            let count = self.buckets.len();
            let bucket = std::mem::take(&mut self.buckets[self.head]);
            for (cell, kg) in bucket {
                let c = cell as usize;
                restricted[c] += kg;
                staging[c] = (staging[c] - kg).max(0.0);
                self.live_total -= kg;
            }
            self.head = (self.head + 1) % count;
        }
    }
}

/// `Simulation` phase: mature staged mass before the transport substeps.
pub fn advance_staging(
    clock: Res<SimClock>,
    params: Res<SimParams>,
    mut buckets: ResMut<StagingBuckets>,
    mut densities: ResMut<DensityGrids>,
) {
    if clock.dt_sim <= 0.0 {
        return;
    }
    let DensityGrids {
        restricted,
        staging,
        ..
    } = &mut *densities;
    buckets.advance(
        clock.dt_sim,
        params.staging.bucket_width_s,
        restricted,
        staging,
    );
}
