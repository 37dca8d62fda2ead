//! Truck tokens: the render population slaved to the field.
//!
//! One token stands for one truck quantum of mass. Tokens have no agency:
//! every substep they sample the committed routing table at their cell and
//! integrate toward the next-hop center at a congestion-scaled visual speed,
//! with the step clamped to the hop center so turns never drift off-road.
//! Restricted tokens park on lot arrival and register in the clearance
//! queue; cleared tokens die at the gate. The fleet is a dense array
//! compacted in place each step.

use std::collections::HashMap;

use bevy::prelude::*;
use rand::Rng;

use crate::clearance::{ClearanceQueue, QueueTicket};
use crate::config::TRUCK_KG;
use crate::density::{CargoClass, DensityGrids};
use crate::grid::{CorridorGrid, Region};
use crate::lots::{can_take_truck, LotRegistry};
use crate::params::SimParams;
use crate::routing::RoutingTables;
use crate::sim_rng::SimRng;
use crate::transport::congestion_factor;

/// One truck token.
#[derive(Debug, Clone)]
pub struct Truck {
    pub id: u64,
    pub pos: Vec2,
    pub prev_pos: Vec2,
    pub age_s: f32,
    pub class: CargoClass,
    /// Provenance only; never read by movement.
    pub source_cell: u32,
    /// Stable key in [0,1) compared against the cell's staged fraction, so
    /// the roadside-hold decision doesn't flicker frame to frame.
    pub staging_key: f32,
    pub waiting_in_lot: bool,
    pub waiting_in_park: bool,
    pub lot_idx: i32,
    pub park_idx: i32,
    pub lot_arrival_sim_s: f64,
    pub alive: bool,
}

/// Dense fleet with stable-id lookup. Dead trucks are compacted out in
/// place at the end of every step.
#[derive(Resource, Default)]
pub struct TruckFleet {
    pub trucks: Vec<Truck>,
    index_of: HashMap<u64, usize>,
    next_id: u64,
    pub exited_at_gate: u64,
    pub destroyed_out_of_bounds: u64,
}

impl TruckFleet {
    pub fn spawn(
        &mut self,
        pos: Vec2,
        class: CargoClass,
        source_cell: u32,
        staging_key: f32,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.trucks.push(Truck {
            id,
            pos,
            prev_pos: pos,
            age_s: 0.0,
            class,
            source_cell,
            staging_key,
            waiting_in_lot: false,
            waiting_in_park: false,
            lot_idx: -1,
            park_idx: -1,
            lot_arrival_sim_s: 0.0,
            alive: true,
        });
        self.index_of.insert(id, self.trucks.len() - 1);
        id
    }

    pub fn get(&self, id: u64) -> Option<&Truck> {
        self.index_of.get(&id).map(|&i| &self.trucks[i])
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Truck> {
        let &i = self.index_of.get(&id)?;
        Some(&mut self.trucks[i])
    }

    pub fn alive_count(&self) -> usize {
        self.trucks.len()
    }

    /// In-place two-pointer compaction, then index rebuild.
    pub fn compact(&mut self) {
        let mut write = 0;
        for read in 0..self.trucks.len() {
            if self.trucks[read].alive {
                if write != read {
                    self.trucks.swap(write, read);
                }
                write += 1;
            }
        }
        self.trucks.truncate(write);
        self.index_of.clear();
        for (i, truck) in self.trucks.iter().enumerate() {
            self.index_of.insert(truck.id, i);
        }
    }
}

/// Signed gap between the fleet size and the mass it should represent:
/// `round(total_mass / TRUCK_KG) - alive`. Sub-truck source accumulators
/// keep this within the source count; anything larger points at a leak.
pub fn parity_gap(fleet: &TruckFleet, densities: &DensityGrids) -> i64 {
    let expected = (densities.total_mass() / TRUCK_KG).round() as i64;
    expected - fleet.alive_count() as i64
}

/// One token integration substep.
#[allow(clippy::too_many_arguments)]
pub fn step_trucks(
    dt: f32,
    sim_time_s: f64,
    grid: &CorridorGrid,
    params: &SimParams,
    routing: &RoutingTables,
    lots: &LotRegistry,
    densities: &DensityGrids,
    fleet: &mut TruckFleet,
    queue: &mut ClearanceQueue,
    rng: &mut SimRng,
) {
    for slot in 0..fleet.trucks.len() {
        let truck = &mut fleet.trucks[slot];
        if !truck.alive {
            continue;
        }
        truck.age_s += dt;

        // Park tokens hold position until the clearance queue services them.
        if truck.waiting_in_park {
            continue;
        }

        let Some(cell) = grid.world_to_cell(truck.pos.x, truck.pos.y) else {
            warn!(
                "truck {} left the world at ({:.1}, {:.1}); destroying",
                truck.id, truck.pos.x, truck.pos.y
            );
            truck.alive = false;
            fleet.destroyed_out_of_bounds += 1;
            continue;
        };

        // Restricted token standing on a lot cell: park (and register) once.
        if truck.class == CargoClass::Restricted && grid.region[cell] == Region::Lot {
            if !truck.waiting_in_lot {
                let intended = match grid.world_to_cell(truck.prev_pos.x, truck.prev_pos.y) {
                    Some(prev) => {
                        routing.hop_lots[prev] == cell as i32 || grid.region[prev] == Region::Lot
                    }
                    None => false,
                };
                if !intended {
                    // Drifted onto a lot it was not routed into: snap back.
                    truck.pos = truck.prev_pos;
                    continue;
                }
                let lot_idx = grid.cell_to_lot[cell];
                truck.waiting_in_lot = true;
                truck.lot_idx = lot_idx;
                truck.lot_arrival_sim_s = sim_time_s;
                queue.push(QueueTicket {
                    truck_id: truck.id,
                    arrival_sim_s: sim_time_s,
                    lot_idx,
                    park_idx: -1,
                });
                // Visual only: scatter the parked truck somewhere inside
                // the lot so queues don't stack on the entry cell.
                if lot_idx >= 0 {
                    let lot = &lots.lots[lot_idx as usize];
                    if !lot.cells.is_empty() {
                        let pick = rng.0.gen_range(0..lot.cells.len());
                        truck.pos = grid.cell_center(lot.cells[pick] as usize);
                        truck.prev_pos = truck.pos;
                    }
                }
            }
            continue;
        }

        // Cleared token at the gate: exit.
        if truck.class == CargoClass::Cleared
            && grid.g_sink[cell] > 0.0
            && routing.hop_gate[cell] < 0
        {
            truck.alive = false;
            fleet.exited_at_gate += 1;
            continue;
        }

        // Roadside staging: the token freezes while its key falls inside
        // the staged fraction of its cell.
        if truck.class == CargoClass::Restricted && grid.region[cell] != Region::Lot {
            let staged = densities.staging[cell];
            let denom = densities.restricted[cell] + staged;
            if denom > 0.0 && f64::from(truck.staging_key) < staged / denom {
                truck.prev_pos = truck.pos;
                continue;
            }
        }

        let hop = routing.hops(truck.class)[cell];
        if hop < 0 {
            truck.prev_pos = truck.pos;
            continue;
        }
        let hop = hop as usize;

        // A restricted token headed into a lot with no headroom waits at
        // the fence rather than clipping through a full lot.
        if truck.class == CargoClass::Restricted && grid.region[hop] == Region::Lot {
            let lot = grid.cell_to_lot[hop];
            if lot >= 0 && !can_take_truck(lots, lot as usize) {
                truck.prev_pos = truck.pos;
                continue;
            }
        }

        let speed =
            params.trucks.visual_speed_ms * congestion_factor(params, grid, densities, cell) as f32;
        let target = grid.cell_center(hop);
        let to_target = target - truck.pos;
        let dist = to_target.length();
        let step = speed * dt;
        truck.prev_pos = truck.pos;
        // Clamp to the hop center so a fast step can't cut a corner into
        // a zero-conductance cell.
        if step >= dist || dist <= f32::EPSILON {
            truck.pos = target;
        } else {
            truck.pos += to_target / dist * step;
        }
    }

    fleet.compact();
}
