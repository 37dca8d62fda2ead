//! Deterministic frame ordering via `SystemSet` phases.
//!
//! The per-frame contract is a strict chain on the `Update` schedule:
//!
//! ```text
//! PreSim  →  Simulation  →  PostSim
//! ```
//!
//! * **PreSim** – clock advance (dt computation, pause, rebuild freeze),
//!   hourly schedule refresh, routing rebuild polling/commit and kick-off.
//! * **Simulation** – the physics pass: staging release, lot occupancy,
//!   transport substeps (flux + truck tokens), source injection, FIFO
//!   clearance service, gate drain, non-negativity clamp. The whole phase
//!   is gated off while a routing rebuild is in flight so transport never
//!   observes half-written tables.
//! * **PostSim** – read-only aggregation: stats, invariant monitor, state
//!   hash. Systems here never mutate physics state.

use bevy::prelude::*;

/// Ordered phases for the corridor engine, configured as a chain.
/// Plugins register systems with `.in_set(SimulationSet::X)` and add
/// fine-grained `.after()` constraints within a phase where needed.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SimulationSet {
    /// Clock, hourly schedule, routing rebuild management.
    PreSim,
    /// The physics pass (frozen during routing rebuilds).
    Simulation,
    /// Stats, invariant checks, state hash.
    PostSim,
}
