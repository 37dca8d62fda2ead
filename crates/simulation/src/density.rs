//! Per-class mass density fields, kg per cell.
//!
//! Five live fields plus the two scratch buffers the flux solver double-
//! buffers through. Mutation rights are narrow by convention: the transport
//! solver moves `restricted`/`cleared` along roads, the staging ring moves
//! mass between `restricted` and `staging`, lot admission deposits into
//! `lot_stored`, the clearance queue withdraws from `lot_stored`/`park_wait`
//! and deposits into `cleared`, and the gate drains `cleared`.

use bevy::prelude::*;

use crate::sim_clock::SimClock;

/// The two mass classes moving through the corridor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CargoClass {
    /// Must dwell in a staging lot before it may exit at the gate.
    Restricted,
    /// Eligible to exit at the gate.
    Cleared,
}

/// Dense per-class density fields, kg in f64 so long runs conserve mass
/// to floating-point noise. All arrays share the grid's length.
#[derive(Resource, Default)]
pub struct DensityGrids {
    /// Mobile restricted mass on roads.
    pub restricted: Vec<f64>,
    /// Restricted mass held roadside before a lot admission attempt.
    pub staging: Vec<f64>,
    /// Restricted mass stored inside lots.
    pub lot_stored: Vec<f64>,
    /// Restricted mass waiting inside industrial-park zones.
    pub park_wait: Vec<f64>,
    /// Cleared mass on roads.
    pub cleared: Vec<f64>,

    /// Flux scratch, owned by the transport solver.
    pub scratch_restricted: Vec<f64>,
    pub scratch_cleared: Vec<f64>,
}

impl DensityGrids {
    pub fn resize(&mut self, len: usize) {
        for field in [
            &mut self.restricted,
            &mut self.staging,
            &mut self.lot_stored,
            &mut self.park_wait,
            &mut self.cleared,
            &mut self.scratch_restricted,
            &mut self.scratch_cleared,
        ] {
            field.clear();
            field.resize(len, 0.0);
        }
    }

    /// Total mass across every live field, kg.
    pub fn total_mass(&self) -> f64 {
        self.restricted_mass()
            + self.staging_mass()
            + self.lot_mass()
            + self.park_mass()
            + self.cleared_mass()
    }

    pub fn restricted_mass(&self) -> f64 {
        self.restricted.iter().sum()
    }

    pub fn staging_mass(&self) -> f64 {
        self.staging.iter().sum()
    }

    pub fn lot_mass(&self) -> f64 {
        self.lot_stored.iter().sum()
    }

    pub fn park_mass(&self) -> f64 {
        self.park_wait.iter().sum()
    }

    pub fn cleared_mass(&self) -> f64 {
        self.cleared.iter().sum()
    }

    /// Clamp every live field to ≥ 0, returning how many cells were touched.
    /// Negative values only appear through floating-point drift in withdraw
    /// paths; anything larger than drift is an invariant violation that the
    /// monitor reports separately.
    pub fn clamp_non_negative(&mut self) -> u32 {
        let mut touched = 0;
        for field in [
            &mut self.restricted,
            &mut self.staging,
            &mut self.lot_stored,
            &mut self.park_wait,
            &mut self.cleared,
        ] {
            for v in field.iter_mut() {
                if *v < 0.0 {
                    *v = 0.0;
                    touched += 1;
                }
            }
        }
        touched
    }
}

/// Frame-final clamp. Runs last in the `Simulation` phase.
pub fn enforce_non_negative(clock: Res<SimClock>, mut densities: ResMut<DensityGrids>) {
    if clock.dt_sim <= 0.0 {
        return;
    }
    densities.clamp_non_negative();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_zeroes_all_fields() {
        let mut d = DensityGrids::default();
        d.resize(16);
        d.restricted[3] = 5.0;
        d.resize(16);
        assert_eq!(d.restricted[3], 0.0);
        assert_eq!(d.scratch_cleared.len(), 16);
    }

    #[test]
    fn test_total_mass_sums_all_fields() {
        let mut d = DensityGrids::default();
        d.resize(4);
        d.restricted[0] = 1.0;
        d.staging[1] = 2.0;
        d.lot_stored[2] = 3.0;
        d.park_wait[3] = 4.0;
        d.cleared[0] = 5.0;
        assert!((d.total_mass() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamp_non_negative() {
        let mut d = DensityGrids::default();
        d.resize(4);
        d.restricted[0] = -0.25;
        d.cleared[1] = -1.0e-9;
        d.lot_stored[2] = 7.0;
        let touched = d.clamp_non_negative();
        assert_eq!(touched, 2);
        assert_eq!(d.restricted[0], 0.0);
        assert_eq!(d.cleared[1], 0.0);
        assert_eq!(d.lot_stored[2], 7.0);
    }
}
