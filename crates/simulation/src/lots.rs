//! Staging lots and industrial parks.
//!
//! A lot is a disjoint set of grid cells with a capacity derived from its
//! area. Admission is gated two ways each substep: a per-lot *live
//! acceptance* budget (the hard ceiling) decremented by every deposit, and
//! the soft acceptance factor the flux solver computes from occupancy.
//! When the set of full lots changes, routing must be rebuilt so the lots
//! potential stops (or resumes) treating them as obstacles.

use bevy::prelude::*;

use crate::config::TRUCK_KG;
use crate::density::DensityGrids;
use crate::params::SimParams;
use crate::routing::{RebuildReason, RoutingRebuild};
use crate::sim_clock::SimClock;

/// One staging lot.
#[derive(Debug, Clone)]
pub struct Lot {
    /// Stable id from the attach context.
    pub id: u32,
    /// Member cell indices, row-major order.
    pub cells: Vec<u32>,
    pub area_m2: f64,
    pub capacity_kg: f64,
    /// Stored restricted mass, recomputed each frame from the density field.
    pub mass_kg: f64,
    pub is_full: bool,
    /// Round-robin cursor for scatter deposits.
    pub scatter_cursor: usize,
    /// Nearest non-lot road cell; cleared mass re-enters the road here.
    pub egress_cell: u32,
}

impl Lot {
    /// Occupancy fraction of nominal capacity.
    pub fn fill_fraction(&self) -> f64 {
        if self.capacity_kg > 0.0 {
            self.mass_kg / self.capacity_kg
        } else {
            1.0
        }
    }
}

/// One industrial park: a wait zone that feeds the clearance queue directly.
#[derive(Debug, Clone)]
pub struct Park {
    pub id: u32,
    pub cells: Vec<u32>,
    /// Road-adjacent cell where serviced mass is released.
    pub release_cell: u32,
}

#[derive(Resource, Default)]
pub struct LotRegistry {
    pub lots: Vec<Lot>,
    /// Per-lot remaining admission budget for the current substep, kg.
    pub live_acceptance: Vec<f64>,
    /// Fingerprint of the full/not-full set at the last occupancy pass.
    last_full_fingerprint: u64,
}

#[derive(Resource, Default)]
pub struct ParkRegistry {
    pub parks: Vec<Park>,
}

impl LotRegistry {
    /// Registry over a fixed lot list; acceptance budgets start empty.
    pub fn with_lots(lots: Vec<Lot>) -> Self {
        Self {
            lots,
            live_acceptance: Vec::new(),
            last_full_fingerprint: 0,
        }
    }

    /// Reset the live acceptance budgets from current occupancy. Called at
    /// the start of every transport substep.
    pub fn rebuild_live_acceptance(&mut self, capacity_threshold: f32) {
        let threshold = f64::from(capacity_threshold);
        self.live_acceptance.clear();
        self.live_acceptance.extend(
            self.lots
                .iter()
                .map(|lot| (threshold * lot.capacity_kg - lot.mass_kg).max(0.0)),
        );
    }

    /// Reserve up to `kg` from a lot's budget; returns the amount granted.
    pub fn reserve(&mut self, lot_idx: usize, kg: f64) -> f64 {
        let remaining = &mut self.live_acceptance[lot_idx];
        let granted = kg.min(*remaining);
        *remaining -= granted;
        granted
    }

    /// Deposit `kg` into a lot's storage field, scattered across up to
    /// `max_cells` member cells from the round-robin cursor.
    pub fn scatter_deposit(
        &mut self,
        lot_idx: usize,
        kg: f64,
        lot_stored: &mut [f64],
        max_cells: usize,
    ) {
        let lot = &mut self.lots[lot_idx];
        let spread = lot.cells.len().min(max_cells).max(1);
        let share = kg / spread as f64;
        for _ in 0..spread {
            let cell = lot.cells[lot.scatter_cursor % lot.cells.len()] as usize;
            lot_stored[cell] += share;
            lot.scatter_cursor = (lot.scatter_cursor + 1) % lot.cells.len();
        }
        lot.mass_kg += kg;
    }

    /// Withdraw up to `kg` from a lot's cells, greedily in member order.
    /// Returns the amount actually withdrawn.
    pub fn withdraw(&mut self, lot_idx: usize, kg: f64, lot_stored: &mut [f64]) -> f64 {
        let lot = &mut self.lots[lot_idx];
        let mut remaining = kg;
        for &cell in &lot.cells {
            if remaining <= 0.0 {
                break;
            }
            let avail = lot_stored[cell as usize];
            let take = avail.min(remaining);
            lot_stored[cell as usize] -= take;
            remaining -= take;
        }
        let withdrawn = kg - remaining;
        lot.mass_kg = (lot.mass_kg - withdrawn).max(0.0);
        withdrawn
    }

    /// Bit fingerprint of the full-lot set (64 lots fold into one word).
    pub fn full_set_fingerprint(&self) -> u64 {
        let mut bits = 0u64;
        for (i, lot) in self.lots.iter().enumerate() {
            if lot.is_full {
                bits ^= 1u64.rotate_left((i % 64) as u32);
            }
        }
        bits
    }

    /// Total stored restricted mass across all lots, kg.
    pub fn total_stored_kg(&self) -> f64 {
        self.lots.iter().map(|l| l.mass_kg).sum()
    }
}

/// Per-frame occupancy refresh. Recomputes each lot's stored mass from the
/// density field, flags full lots, and schedules a debounced routing rebuild
/// when the full set changes.
pub fn update_lot_occupancy(
    clock: Res<SimClock>,
    params: Res<SimParams>,
    densities: Res<DensityGrids>,
    mut registry: ResMut<LotRegistry>,
    mut rebuild: ResMut<RoutingRebuild>,
) {
    if clock.dt_sim <= 0.0 {
        return;
    }
    for lot in &mut registry.lots {
        let mut mass = 0.0f64;
        for &cell in &lot.cells {
            mass += densities.lot_stored[cell as usize];
        }
        lot.mass_kg = mass;
        lot.is_full =
            lot.mass_kg >= f64::from(params.lots.capacity_threshold) * lot.capacity_kg;
    }

    let fingerprint = registry.full_set_fingerprint();
    if fingerprint != registry.last_full_fingerprint {
        registry.last_full_fingerprint = fingerprint;
        rebuild.request(RebuildReason::Occupancy);
    }
}

/// Runtime control: retarget every lot's capacity from a new areal density.
/// A lot's enforced capacity never drops below its current stored mass; the
/// clamp is logged so scenario authors see the mismatch.
pub fn set_lot_capacity(
    registry: &mut LotRegistry,
    rebuild: &mut RoutingRebuild,
    kg_per_m2: f64,
) {
    for lot in &mut registry.lots {
        let target = lot.area_m2 * kg_per_m2;
        if target < lot.mass_kg {
            warn!(
                "lot {} capacity {:.0} kg below stored {:.0} kg; clamping to stored mass",
                lot.id, target, lot.mass_kg
            );
            lot.capacity_kg = lot.mass_kg;
        } else {
            lot.capacity_kg = target;
        }
    }
    rebuild.request(RebuildReason::Control);
}

/// True when the lot can still admit at least one full truck this substep.
#[inline]
pub fn can_take_truck(registry: &LotRegistry, lot_idx: usize) -> bool {
    registry.live_acceptance[lot_idx] >= TRUCK_KG
}
