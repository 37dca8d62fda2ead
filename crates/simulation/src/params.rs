//! Data-driven simulation parameters.
//!
//! Extracts the tunable constants of the transport engine into a single
//! [`SimParams`] resource so scenarios and tests can adjust them without
//! recompilation. Systems read from `Res<SimParams>` instead of module-level
//! constants; only values the data model hard-codes stay in `config.rs`.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Flux solver
// ---------------------------------------------------------------------------

/// Tunables for the per-substep graph flux pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowParams {
    /// Fraction of a cell's mass that attempts to move to its next hop
    /// per substep.
    pub flow_frac: f32,
    /// Conductance below which a cell is not considered road.
    pub k_threshold: f32,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            flow_frac: 0.25,
            k_threshold: 1.0e-6,
        }
    }
}

// ---------------------------------------------------------------------------
// Routing costs
// ---------------------------------------------------------------------------

/// Edge-cost shaping and rebuild scheduling for the potential solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingParams {
    /// Cost multiplier for city-street cells relative to highway.
    pub city_cost_mult: f32,
    /// Cost multiplier for traversing lot interiors. Kept above 1 so the
    /// gate potential never routes through-traffic across a lot.
    pub lot_traversal_cost_mult: f32,
    /// Soft entry-penalty scale applied at road→lot edges in the lots run:
    /// `1 + alpha * util^beta`.
    pub soft_capacity_alpha: f32,
    /// Soft entry-penalty exponent.
    pub soft_capacity_beta: f32,
    /// Debounce for occupancy-driven rebuild requests, wall-clock millis.
    pub rebuild_debounce_ms: u64,
    /// Warn when more than this fraction of road cells has no next hop.
    pub unreachable_warn_fraction: f32,
    /// Upper bound on the relocation walk for an unreachable source.
    pub relocation_max_steps: usize,
    /// Relocated sources must land at least this many cells (Chebyshev)
    /// away from any lot cell.
    pub lot_capture_exclusion_radius: i32,
}

impl Default for RoutingParams {
    fn default() -> Self {
        Self {
            city_cost_mult: 1.6,
            lot_traversal_cost_mult: 3.0,
            soft_capacity_alpha: 4.0,
            soft_capacity_beta: 2.0,
            rebuild_debounce_ms: 1_500,
            unreachable_warn_fraction: 0.05,
            relocation_max_steps: 512,
            lot_capture_exclusion_radius: 6,
        }
    }
}

// ---------------------------------------------------------------------------
// Lots
// ---------------------------------------------------------------------------

/// Staging-lot capacity and admission tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotParams {
    /// Storable mass per square meter of lot area.
    pub kg_per_m2: f64,
    /// Occupancy fraction at which a lot is "full": the hard admission
    /// ceiling and the threshold for excluding it from the lots potential.
    pub capacity_threshold: f32,
    /// A single admission is scattered across at most this many lot cells.
    pub scatter_max_cells: usize,
    /// Radius (cells) of the breadth-first search for an alternative lot
    /// when the targeted lot cannot take a full truck.
    pub fallback_search_radius: u32,
}

impl Default for LotParams {
    fn default() -> Self {
        Self {
            kg_per_m2: 250.0,
            capacity_threshold: 0.9,
            scatter_max_cells: 16,
            fallback_search_radius: 12,
        }
    }
}

// ---------------------------------------------------------------------------
// Roadside staging
// ---------------------------------------------------------------------------

/// Roadside staging (pre-entry hold) tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingParams {
    /// Fraction of an admission attempt that goes straight at the lot;
    /// the remainder is held roadside first. 1.0 disables staging.
    pub lot_attempt_fraction: f32,
    /// Minimum roadside hold, sim-seconds.
    pub min_hold_s: f32,
    /// Maximum roadside hold, sim-seconds.
    pub max_hold_s: f32,
    /// Width of one release bucket, sim-seconds.
    pub bucket_width_s: f32,
    /// Number of buckets in the ring. Must cover `max_hold_s / bucket_width_s`.
    pub bucket_count: usize,
}

impl Default for StagingParams {
    fn default() -> Self {
        Self {
            lot_attempt_fraction: 1.0,
            min_hold_s: 1_800.0,
            max_hold_s: 7_200.0,
            bucket_width_s: 300.0,
            bucket_count: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// Clearance queue
// ---------------------------------------------------------------------------

/// Dwell windows and service pacing for the global clearance FIFO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearanceParams {
    /// Minimum dwell before a queued truck is eligible, sim-seconds (~36 h).
    pub min_wait_s: f32,
    /// Dwell the service rate is calibrated to, sim-seconds (~54 h).
    pub target_dwell_s: f32,
    /// Calibration ceiling, sim-seconds (~72 h). The service rate targets
    /// the midpoint of `[min_wait_s, max_wait_s]`.
    pub max_wait_s: f32,
    /// Compact the queue's backing storage once the head cursor passes this.
    pub compact_threshold: usize,
}

impl Default for ClearanceParams {
    fn default() -> Self {
        Self {
            min_wait_s: 36.0 * 3_600.0,
            target_dwell_s: 54.0 * 3_600.0,
            max_wait_s: 72.0 * 3_600.0,
            compact_threshold: 4_096,
        }
    }
}

// ---------------------------------------------------------------------------
// Congestion
// ---------------------------------------------------------------------------

/// On-road congestion response. Scales outflow rate only; routing never
/// reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CongestionParams {
    pub enabled: bool,
    /// Mobile on-road mass at which throughput halves, kg per cell.
    pub rho_half_kg: f64,
    /// Response exponent.
    pub exponent: f32,
}

impl Default for CongestionParams {
    fn default() -> Self {
        Self {
            enabled: true,
            rho_half_kg: 60_000.0,
            exponent: 2.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Sources and truck tokens
// ---------------------------------------------------------------------------

/// Source injection tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceParams {
    /// Probability that injected mass is restricted (must clear through a
    /// lot) rather than pre-cleared.
    pub restricted_fraction: f32,
}

impl Default for SourceParams {
    fn default() -> Self {
        Self {
            restricted_fraction: 0.65,
        }
    }
}

/// Truck-token rendering-population tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruckParams {
    /// Free-flow visual speed, meters per sim-second.
    pub visual_speed_ms: f32,
    /// Radius (cells, Chebyshev) around the gate counted as gate backlog.
    pub gate_backlog_radius: i32,
}

impl Default for TruckParams {
    fn default() -> Self {
        Self {
            visual_speed_ms: 25.0,
            gate_backlog_radius: 24,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level resource
// ---------------------------------------------------------------------------

/// All runtime-tunable parameters of the corridor engine.
#[derive(Resource, Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimParams {
    pub flow: FlowParams,
    pub routing: RoutingParams,
    pub lots: LotParams,
    pub staging: StagingParams,
    pub clearance: ClearanceParams,
    pub congestion: CongestionParams,
    pub sources: SourceParams,
    pub trucks: TruckParams,
}
