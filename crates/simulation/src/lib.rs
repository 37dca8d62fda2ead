//! Border-corridor freight transport engine.
//!
//! A headless, deterministic mass-transport simulation: industrial sources
//! inject truck mass into a rasterized road corridor, restricted mass dwells
//! in capacity-gated staging lots until a global FIFO clears it, and cleared
//! mass drains at the export gate. A truck-token fleet slaved to the field
//! carries the visual population.
//!
//! Everything runs inside [`CorridorSimPlugin`] on the `Update` schedule in
//! three chained phases (see [`simulation_sets`]); one `App::update()` pass
//! advances exactly one frame.

use bevy::prelude::*;

pub mod clearance;
pub mod config;
pub mod density;
pub mod gate;
pub mod grid;
pub mod invariant_checks;
pub mod lots;
pub mod params;
pub mod routing;
pub mod scenario;
pub mod sim_clock;
pub mod sim_rng;
pub mod simulation_sets;
pub mod sources;
pub mod staging;
pub mod state_hash;
pub mod stats;
pub mod test_harness;
pub mod transport;
pub mod trucks;
pub mod world_attach;


pub use simulation_sets::SimulationSet;

/// The whole engine as one plugin.
pub struct CorridorSimPlugin;

impl Plugin for CorridorSimPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<params::SimParams>()
            .init_resource::<sim_rng::SimRng>()
            .init_resource::<sim_clock::SimClock>()
            .init_resource::<grid::CorridorGrid>()
            .init_resource::<density::DensityGrids>()
            .init_resource::<lots::LotRegistry>()
            .init_resource::<lots::ParkRegistry>()
            .init_resource::<sources::SourceRegistry>()
            .init_resource::<routing::RoutingTables>()
            .init_resource::<routing::RoutingRebuild>()
            .init_resource::<staging::StagingBuckets>()
            .init_resource::<transport::OverflowDiagnostics>()
            .init_resource::<scenario::ScenarioBundle>()
            .init_resource::<scenario::HourlySchedule>()
            .init_resource::<clearance::ClearanceQueue>()
            .init_resource::<trucks::TruckFleet>()
            .init_resource::<stats::CorridorStats>()
            .init_resource::<invariant_checks::InvariantViolations>()
            .init_resource::<state_hash::StateHash>();

        app.configure_sets(
            Update,
            (
                SimulationSet::PreSim,
                SimulationSet::Simulation,
                SimulationSet::PostSim,
            )
                .chain(),
        );
        // The physics phase freezes while a routing rebuild is in flight
        // (and while paused): the clock zeroes dt and the whole set skips.
        app.configure_sets(
            Update,
            SimulationSet::Simulation.run_if(sim_clock::physics_active),
        );

        app.add_systems(
            Update,
            (
                sim_clock::advance_clock,
                scenario::update_hourly_schedule,
                routing::poll_routing_rebuild,
                routing::kick_routing_rebuild,
                sources::relocate_unreachable_sources,
            )
                .chain()
                .in_set(SimulationSet::PreSim),
        );

        app.add_systems(
            Update,
            (
                staging::advance_staging,
                lots::update_lot_occupancy,
                transport::run_transport_substeps,
                sources::inject_sources,
                clearance::service_clearance_queue,
                gate::drain_gate,
                density::enforce_non_negative,
            )
                .chain()
                .in_set(SimulationSet::Simulation),
        );

        app.add_systems(
            Update,
            (
                stats::update_stats,
                invariant_checks::validate_frame,
                state_hash::update_state_hash,
                transport::report_overflow,
            )
                .chain()
                .in_set(SimulationSet::PostSim),
        );
    }
}
