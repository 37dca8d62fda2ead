//! Compile-time physical constants shared across the corridor engine.
//!
//! Runtime-tunable values live in [`crate::params::SimParams`]; only the
//! quantities that other constants are derived from, or that the data model
//! hard-codes (grid indexing sentinels, substep count), belong here.

/// Mass of one truck quantum in kilograms. Token minting, queue service,
/// and acceptance gating all operate in multiples of this.
pub const TRUCK_KG: f64 = 9_000.0;

/// Simulated seconds in one day.
pub const SIM_SECONDS_PER_DAY: f32 = 86_400.0;

/// Wall-clock seconds one simulated day takes at 1x speed.
pub const DAY_VIDEO_SECONDS: f32 = 75.0;

/// Simulated seconds per wall-clock second at 1x speed.
pub const SIM_TIME_SCALE: f32 = SIM_SECONDS_PER_DAY / DAY_VIDEO_SECONDS;

/// Upper clamp on per-frame simulated dt, in sim-seconds. Prevents
/// catastrophic catch-up after a long stall or a background tab.
pub const MAX_DT_SIM: f32 = 120.0;

/// Fixed number of transport substeps per frame.
pub const PHYSICS_SUBSTEPS: u32 = 8;

/// Sentinel for "no next hop" in the routing tables.
pub const NO_HOP: i32 = -1;

/// Sentinel distance for cells the potential solve never reached, in meters.
pub const DIST_UNREACHED: f32 = 1.0e12;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_scale() {
        // One sim day at 1x speed should fit the target video length.
        let wall = SIM_SECONDS_PER_DAY / SIM_TIME_SCALE;
        assert!((wall - DAY_VIDEO_SECONDS).abs() < 1e-3);
    }

    #[test]
    fn test_dt_clamp_spans_multiple_frames() {
        // At 1x speed a 60fps frame advances ~19.2 sim-seconds; the clamp
        // must allow several frames of catch-up but not minutes.
        let per_frame = SIM_TIME_SCALE / 60.0;
        assert!(MAX_DT_SIM > per_frame * 4.0);
        assert!(MAX_DT_SIM <= 120.0);
    }
}
