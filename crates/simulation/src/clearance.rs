//! Global clearance FIFO: lot-parked restricted mass becomes cleared mass.
//!
//! A single queue spans every lot and park, so a truck that arrived later
//! anywhere in the corridor can never clear before an earlier-arriving
//! eligible truck. Service is budgeted: the instantaneous rate is the queue
//! population divided by the target dwell, accumulated into a kg budget that
//! is spent one truck quantum at a time. A head ticket that has not reached
//! the minimum dwell blocks the whole queue; skipping it would reorder
//! clearances.

use bevy::prelude::*;

use crate::config::TRUCK_KG;
use crate::density::{CargoClass, DensityGrids};
use crate::grid::CorridorGrid;
use crate::lots::{LotRegistry, ParkRegistry};
use crate::params::SimParams;
use crate::sim_clock::SimClock;
use crate::stats::CorridorStats;
use crate::trucks::TruckFleet;

/// One queue entry, created when a restricted truck parks in a lot or
/// spawns into a park wait zone.
#[derive(Debug, Clone, Copy)]
pub struct QueueTicket {
    pub truck_id: u64,
    pub arrival_sim_s: f64,
    /// Lot the truck waits in, or -1 for park tickets.
    pub lot_idx: i32,
    /// Park the truck waits in, or -1 for lot tickets.
    pub park_idx: i32,
}

/// The global FIFO. Tickets are only pushed at arrival and only consumed
/// from the head; a cursor avoids shifting, with periodic compaction to
/// bound memory.
#[derive(Resource)]
pub struct ClearanceQueue {
    tickets: Vec<QueueTicket>,
    head: usize,
    budget_kg: f64,
    pub serviced: u64,
    /// Arrival stamp of the most recently serviced ticket; service order is
    /// monotone in this value.
    pub last_serviced_arrival_s: f64,
    /// Shortest observed dwell of any serviced ticket, sim-seconds.
    pub min_observed_dwell_s: f64,
    /// Count of services whose arrival preceded the previous one. Stays 0.
    pub order_violations: u64,
}

impl Default for ClearanceQueue {
    fn default() -> Self {
        Self {
            tickets: Vec::new(),
            head: 0,
            budget_kg: 0.0,
            serviced: 0,
            last_serviced_arrival_s: 0.0,
            min_observed_dwell_s: f64::INFINITY,
            order_violations: 0,
        }
    }
}

impl ClearanceQueue {
    pub fn push(&mut self, ticket: QueueTicket) {
        self.tickets.push(ticket);
    }

    pub fn queued_len(&self) -> usize {
        self.tickets.len() - self.head
    }

    pub fn head_ticket(&self) -> Option<QueueTicket> {
        self.tickets.get(self.head).copied()
    }

    pub fn budget_kg(&self) -> f64 {
        self.budget_kg
    }

    fn advance_head(&mut self) {
        self.head += 1;
    }

    fn compact_if_needed(&mut self, threshold: usize) {
        if self.head >= threshold && self.head * 2 >= self.tickets.len() {
            self.tickets.drain(..self.head);
            self.head = 0;
        }
    }
}

/// Withdraw up to `kg` from a park's wait zone, greedily in cell order.
fn withdraw_park(cells: &[u32], kg: f64, park_wait: &mut [f64]) -> f64 {
    let mut remaining = kg;
    for &cell in cells {
        if remaining <= 0.0 {
            break;
        }
        let take = park_wait[cell as usize].min(remaining);
        park_wait[cell as usize] -= take;
        remaining -= take;
    }
    kg - remaining
}

/// Frame-level service pass, after the transport substeps.
#[allow(clippy::too_many_arguments)]
pub fn service_clearance_queue(
    clock: Res<SimClock>,
    params: Res<SimParams>,
    grid: Res<CorridorGrid>,
    parks: Res<ParkRegistry>,
    mut queue: ResMut<ClearanceQueue>,
    mut lots: ResMut<LotRegistry>,
    mut densities: ResMut<DensityGrids>,
    mut fleet: ResMut<TruckFleet>,
    mut stats: ResMut<CorridorStats>,
) {
    if clock.dt_sim <= 0.0 || grid.is_empty() {
        return;
    }

    // Rate calibration: with every queued truck waiting the target dwell on
    // average, service keeps pace with arrivals.
    let rate_kg_s =
        queue.queued_len() as f64 * TRUCK_KG / f64::from(params.clearance.target_dwell_s);
    queue.budget_kg += rate_kg_s * f64::from(clock.dt_sim);

    while queue.budget_kg >= TRUCK_KG {
        let Some(ticket) = queue.head_ticket() else {
            break;
        };

        // Stale tickets (truck already gone or no longer waiting) are
        // dropped without consuming budget.
        let valid = fleet
            .get(ticket.truck_id)
            .map(|t| {
                t.class == CargoClass::Restricted && (t.waiting_in_lot || t.waiting_in_park)
            })
            .unwrap_or(false);
        if !valid {
            queue.advance_head();
            continue;
        }

        // The head gates the entire queue: servicing anything younger first
        // would violate global FIFO order.
        if clock.sim_time_s - ticket.arrival_sim_s < f64::from(params.clearance.min_wait_s) {
            break;
        }

        let release_cell: u32;
        let moved_kg: f64;
        if ticket.park_idx >= 0 {
            let park = &parks.parks[ticket.park_idx as usize];
            let withdrawn = withdraw_park(&park.cells, TRUCK_KG, &mut densities.park_wait);
            if withdrawn + 1.0 < TRUCK_KG {
                // Under-massed zone (rounding); return the remainder and
                // drop the ticket.
                if withdrawn > 0.0 {
                    densities.park_wait[park.cells[0] as usize] += withdrawn;
                }
                queue.advance_head();
                continue;
            }
            release_cell = park.release_cell;
            moved_kg = withdrawn;
        } else {
            let lot_idx = ticket.lot_idx as usize;
            if lots.lots[lot_idx].mass_kg < TRUCK_KG {
                // Shouldn't happen outside rounding drift; skip rather
                // than over-withdraw.
                queue.advance_head();
                continue;
            }
            moved_kg = lots.withdraw(lot_idx, TRUCK_KG, &mut densities.lot_stored);
            release_cell = lots.lots[lot_idx].egress_cell;
        }

        // Deposit exactly what was withdrawn so no crumbs are minted.
        densities.cleared[release_cell as usize] += moved_kg;

        if let Some(truck) = fleet.get_mut(ticket.truck_id) {
            truck.class = CargoClass::Cleared;
            truck.waiting_in_lot = false;
            truck.waiting_in_park = false;
            truck.lot_idx = -1;
            truck.park_idx = -1;
            truck.pos = grid.cell_center(release_cell as usize);
            truck.prev_pos = truck.pos;
        }

        if queue.serviced > 0 && ticket.arrival_sim_s < queue.last_serviced_arrival_s {
            queue.order_violations += 1;
        }
        let dwell = clock.sim_time_s - ticket.arrival_sim_s;
        queue.min_observed_dwell_s = queue.min_observed_dwell_s.min(dwell);
        queue.budget_kg -= TRUCK_KG;
        queue.serviced += 1;
        queue.last_serviced_arrival_s = ticket.arrival_sim_s;
        queue.advance_head();
        stats.converted_total_kg += moved_kg;
    }

    queue.compact_if_needed(params.clearance.compact_threshold);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lots::Lot;

    fn ticket(id: u64, arrival: f64, lot: i32) -> QueueTicket {
        QueueTicket {
            truck_id: id,
            arrival_sim_s: arrival,
            lot_idx: lot,
            park_idx: -1,
        }
    }

    #[test]
    fn test_queue_cursor_and_len() {
        let mut q = ClearanceQueue::default();
        q.push(ticket(1, 0.0, 0));
        q.push(ticket(2, 1.0, 0));
        assert_eq!(q.queued_len(), 2);
        assert_eq!(q.head_ticket().map(|t| t.truck_id), Some(1));
        q.advance_head();
        assert_eq!(q.queued_len(), 1);
        assert_eq!(q.head_ticket().map(|t| t.truck_id), Some(2));
    }

    #[test]
    fn test_compaction_bounds_memory() {
        let mut q = ClearanceQueue::default();
        for i in 0..100 {
            q.push(ticket(i, i as f64, 0));
        }
        for _ in 0..80 {
            q.advance_head();
        }
        q.compact_if_needed(64);
        assert_eq!(q.queued_len(), 20);
        assert_eq!(q.head, 0);
        assert_eq!(q.head_ticket().map(|t| t.truck_id), Some(80));
    }

    #[test]
    fn test_compaction_skipped_below_threshold() {
        let mut q = ClearanceQueue::default();
        for i in 0..10 {
            q.push(ticket(i, i as f64, 0));
        }
        for _ in 0..5 {
            q.advance_head();
        }
        q.compact_if_needed(64);
        assert_eq!(q.head, 5);
    }

    #[test]
    fn test_withdraw_park_greedy() {
        let cells = vec![0u32, 1, 2];
        let mut wait = vec![5_000.0f64, 3_000.0, 2_000.0];
        let got = withdraw_park(&cells, TRUCK_KG, &mut wait);
        assert!((got - TRUCK_KG).abs() < 1e-2);
        assert_eq!(wait[0], 0.0);
        assert_eq!(wait[1], 0.0);
        assert!((wait[2] - 1_000.0).abs() < 1e-2);
    }

    /// Full-system service behavior (budget pacing, dwell gate, FIFO order
    /// across lots) is covered by the integration tests; here we exercise
    /// the lot withdrawal plumbing directly.
    #[test]
    fn test_lot_withdraw_feeds_egress() {
        let mut lots = LotRegistry::with_lots(vec![Lot {
            id: 9,
            cells: vec![3, 4],
            area_m2: 1_000.0,
            capacity_kg: 100_000.0,
            mass_kg: 2.0 * TRUCK_KG,
            is_full: false,
            scatter_cursor: 0,
            egress_cell: 7,
        }]);
        let mut stored = vec![0.0f64; 16];
        stored[3] = TRUCK_KG;
        stored[4] = TRUCK_KG;
        let got = lots.withdraw(0, TRUCK_KG, &mut stored);
        assert!((got - TRUCK_KG).abs() < 1e-2);
        assert!((lots.lots[0].mass_kg - TRUCK_KG).abs() < 1e-2);
    }
}
