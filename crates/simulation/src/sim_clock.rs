//! Simulation time authority.
//!
//! Physics is a pure integrator: every frame the clock converts the real
//! frame delta into a clamped simulated dt and all downstream systems read
//! that value. Speed presets are pure multipliers on the day-compression
//! ratio; pausing zeroes the dt without touching any other state.
//!
//! While a routing rebuild is in flight the clock freezes: the frame's real
//! delta is recorded as skipped external time and `dt_sim` stays 0, which
//! gates the whole `Simulation` phase off for that frame.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{MAX_DT_SIM, SIM_TIME_SCALE};
use crate::routing::RoutingRebuild;

/// Named speed multipliers over the base day-compression ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedPreset {
    Normal,
    Double,
    Quad,
    Octuple,
}

impl SpeedPreset {
    pub fn multiplier(self) -> f32 {
        match self {
            SpeedPreset::Normal => 1.0,
            SpeedPreset::Double => 2.0,
            SpeedPreset::Quad => 4.0,
            SpeedPreset::Octuple => 8.0,
        }
    }
}

/// Simulation clock resource. `dt_sim` is recomputed once per frame and is
/// the only time value physics systems may read.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct SimClock {
    /// Accumulated simulated time, seconds.
    pub sim_time_s: f64,
    /// Simulated dt of the current frame, seconds. Zero while paused or
    /// while a routing rebuild freezes physics.
    pub dt_sim: f32,
    /// Speed multiplier over `SIM_TIME_SCALE`.
    pub speed: f32,
    pub paused: bool,
    /// When set, overrides the real frame delta (headless drivers and tests
    /// use this for deterministic pacing).
    pub fixed_frame_dt: Option<f32>,
    /// Real seconds that elapsed during rebuild-frozen frames.
    pub skipped_real_s: f64,
    /// Frames advanced since attach.
    pub frame: u64,
}

impl Default for SimClock {
    fn default() -> Self {
        Self {
            sim_time_s: 0.0,
            dt_sim: 0.0,
            speed: 1.0,
            paused: false,
            fixed_frame_dt: None,
            skipped_real_s: 0.0,
            frame: 0,
        }
    }
}

impl SimClock {
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Set a free-form speed multiplier.
    pub fn set_speed(&mut self, multiplier: f32) {
        self.speed = multiplier.clamp(0.25, 64.0);
    }

    pub fn set_preset(&mut self, preset: SpeedPreset) {
        self.set_speed(preset.multiplier());
    }

    /// Current simulated hour since attach (floored).
    pub fn sim_hour(&self) -> i64 {
        (self.sim_time_s / 3_600.0).floor() as i64
    }

    /// Hour of the simulated day in `[0, 24)`.
    pub fn hour_of_day(&self) -> u32 {
        (self.sim_hour().rem_euclid(24)) as u32
    }
}

/// Run condition: the physics phase only runs on frames with nonzero dt.
pub fn physics_active(clock: Res<SimClock>) -> bool {
    clock.dt_sim > 0.0
}

/// Per-frame clock advance. Runs first in `PreSim`.
pub fn advance_clock(
    time: Res<Time>,
    rebuild: Res<RoutingRebuild>,
    mut clock: ResMut<SimClock>,
) {
    clock.frame = clock.frame.wrapping_add(1);
    let real_dt = clock.fixed_frame_dt.unwrap_or_else(|| time.delta_secs());

    if rebuild.in_flight() {
        // Physics freezes until the new tables commit; the lost external
        // time is recorded rather than caught up.
        clock.skipped_real_s += f64::from(real_dt);
        clock.dt_sim = 0.0;
        return;
    }

    if clock.paused {
        clock.dt_sim = 0.0;
        return;
    }

    let dt = (real_dt * SIM_TIME_SCALE * clock.speed).clamp(0.0, MAX_DT_SIM);
    clock.dt_sim = dt;
    clock.sim_time_s += f64::from(dt);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_pure_multipliers() {
        assert_eq!(SpeedPreset::Normal.multiplier(), 1.0);
        assert_eq!(SpeedPreset::Octuple.multiplier(), 8.0);
        let mut clock = SimClock::default();
        clock.set_preset(SpeedPreset::Quad);
        assert_eq!(clock.speed, 4.0);
    }

    #[test]
    fn test_speed_clamped() {
        let mut clock = SimClock::default();
        clock.set_speed(1_000.0);
        assert_eq!(clock.speed, 64.0);
        clock.set_speed(0.0);
        assert_eq!(clock.speed, 0.25);
    }

    #[test]
    fn test_hour_of_day_wraps() {
        let mut clock = SimClock::default();
        clock.sim_time_s = 25.0 * 3_600.0 + 10.0;
        assert_eq!(clock.sim_hour(), 25);
        assert_eq!(clock.hour_of_day(), 1);
    }
}
