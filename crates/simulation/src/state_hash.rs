//! Deterministic state hashing for replay and determinism verification.
//!
//! Computes a 64-bit FNV-1a hash of the simulation state in a fixed order:
//! frame counter, sim time bits, every density field in row-major order,
//! the RNG stream position, and the routing table version. All floats are
//! hashed via their bit representation; no randomized hasher and no
//! HashMap iteration is involved, so two runs with identical inputs hash
//! identically on any platform.

use std::hash::{Hash, Hasher};

use bevy::prelude::*;

use crate::density::DensityGrids;
use crate::routing::RoutingTables;
use crate::sim_clock::SimClock;
use crate::sim_rng::SimRng;

/// Cadence of hashing in release builds, frames. Debug builds hash every
/// frame so determinism tests can compare trajectories densely.
const RELEASE_HASH_INTERVAL: u64 = 60;

/// The hash computed at the end of the most recent hashed frame.
#[derive(Resource, Default, Clone, Debug)]
pub struct StateHash {
    pub frame: u64,
    pub hash: u64,
}

// ---------------------------------------------------------------------------
// FNV-1a hasher (deterministic, no random seed)
// ---------------------------------------------------------------------------

/// A simple FNV-1a hasher that produces deterministic output regardless of
/// platform or Rust version. Unlike `DefaultHasher`, this is not randomized.
struct Fnv1aHasher {
    state: u64,
}

impl Fnv1aHasher {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x00000100000001B3;

    fn new() -> Self {
        Self {
            state: Self::FNV_OFFSET_BASIS,
        }
    }
}

impl Hasher for Fnv1aHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u64;
            self.state = self.state.wrapping_mul(Self::FNV_PRIME);
        }
    }
}

// ---------------------------------------------------------------------------
// Public convenience function
// ---------------------------------------------------------------------------

/// Compute a deterministic hash of the current simulation state. Callable
/// from tests without the ECS system having run.
pub fn compute_state_hash(
    frame: u64,
    sim_time_s: f64,
    densities: &DensityGrids,
    rng_word_pos: u128,
    rng_stream: u64,
    routing_version: u64,
) -> u64 {
    let mut hasher = Fnv1aHasher::new();

    frame.hash(&mut hasher);
    sim_time_s.to_bits().hash(&mut hasher);

    for field in [
        &densities.restricted,
        &densities.staging,
        &densities.lot_stored,
        &densities.park_wait,
        &densities.cleared,
    ] {
        for &v in field.iter() {
            v.to_bits().hash(&mut hasher);
        }
    }

    rng_word_pos.hash(&mut hasher);
    rng_stream.hash(&mut hasher);
    routing_version.hash(&mut hasher);

    hasher.finish()
}

/// `PostSim`: refresh the hash resource.
pub fn update_state_hash(
    clock: Res<SimClock>,
    densities: Res<DensityGrids>,
    rng: Res<SimRng>,
    routing: Res<RoutingTables>,
    mut state_hash: ResMut<StateHash>,
) {
    if !cfg!(debug_assertions) && !clock.frame.is_multiple_of(RELEASE_HASH_INTERVAL) {
        return;
    }
    let (word_pos, stream) = rng.stream_state();
    state_hash.frame = clock.frame;
    state_hash.hash = compute_state_hash(
        clock.frame,
        clock.sim_time_s,
        &densities,
        word_pos,
        stream,
        routing.version,
    );
}
