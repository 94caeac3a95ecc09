//! Per-source state: durable spatial placement plus smoothed runtime
//! values.
//!
//! Placements are assigned once per source lifetime and survive a
//! stop/start cycle; smoothing history does not.

use crate::app::placements::PlacementStore;
use crate::audio::panning::StereoPan;
use crate::audio::synth;
use crate::types::{Source, SourceId};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::collections::HashMap;

/// Smoothing coefficient for one render block.
///
/// `alpha = 1 − exp(−block_ms / time_constant_ms)`; a zero time
/// constant means no smoothing (alpha = 1).
pub fn smoothing_alpha(block_ms: f32, time_constant_ms: f32) -> f32 {
    if time_constant_ms <= 0.0 {
        1.0
    } else {
        1.0 - (-block_ms / time_constant_ms).exp()
    }
}

/// Durable placement, fixed for the lifetime of the source identity.
#[derive(Debug, Clone, Copy)]
struct Placement {
    world_azimuth: f32,
    frequency: f32,
}

/// Ephemeral render state, dropped when the source leaves the active
/// set or the engine stops. Each value stays in [0, 1] because the
/// targets are in [0, 1] and the filter is a convex combination.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeState {
    pub smoothed_volume: f32,
    pub smoothed_left_gain: f32,
    pub smoothed_right_gain: f32,
}

impl RuntimeState {
    pub fn smooth_volume(&mut self, target: f32, alpha: f32) {
        self.smoothed_volume += alpha * (target - self.smoothed_volume);
    }

    pub fn smooth_gains(&mut self, target: StereoPan, alpha: f32) {
        self.smoothed_left_gain += alpha * (target.left - self.smoothed_left_gain);
        self.smoothed_right_gain += alpha * (target.right - self.smoothed_right_gain);
    }
}

/// Mutable view of one active source for a render pass.
pub struct ActiveSource<'a> {
    pub frequency: f32,
    pub world_azimuth: f32,
    pub runtime: &'a mut RuntimeState,
}

/// Owns the mapping from source identity to placement and runtime
/// state. The placement collaborator and the random source are both
/// injected so placement assignment is deterministic in tests.
pub struct SourceStateStore {
    placements: Box<dyn PlacementStore>,
    rng: Box<dyn RngCore + Send>,
    spatial: HashMap<SourceId, Placement>,
    runtime: HashMap<SourceId, RuntimeState>,
}

impl SourceStateStore {
    pub fn new(placements: Box<dyn PlacementStore>) -> Self {
        Self::with_rng(placements, Box::new(StdRng::from_entropy()))
    }

    pub fn with_rng(placements: Box<dyn PlacementStore>, rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            placements,
            rng,
            spatial: HashMap::new(),
            runtime: HashMap::new(),
        }
    }

    /// Fetch or create the state for `source`.
    ///
    /// On first encounter the persisted azimuth is consulted; absent
    /// that, a uniform random azimuth in [0, 360) is drawn and
    /// persisted. A persistence failure degrades to a fresh random
    /// placement for this session. `forced_azimuth` overrides the
    /// returned azimuth without touching the stored value.
    pub fn get_or_create(
        &mut self,
        source: &Source,
        fixed_frequency: Option<f32>,
        forced_azimuth: Option<f32>,
    ) -> ActiveSource<'_> {
        if !self.spatial.contains_key(&source.id) {
            let world_azimuth = self.assign_azimuth(&source.id);
            let frequency = fixed_frequency.unwrap_or_else(|| synth::frequency_for(&source.id));
            debug!(
                "Placed source {} at {:.1}° with {:.0} Hz",
                source.id, world_azimuth, frequency
            );
            self.spatial.insert(
                source.id.clone(),
                Placement {
                    world_azimuth,
                    frequency,
                },
            );
        }

        let placement = self.spatial[&source.id];
        let runtime = self.runtime.entry(source.id.clone()).or_default();

        ActiveSource {
            frequency: placement.frequency,
            world_azimuth: forced_azimuth.unwrap_or(placement.world_azimuth),
            runtime,
        }
    }

    fn assign_azimuth(&mut self, id: &SourceId) -> f32 {
        let stored = match self.placements.load(id) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Placement load failed for {}, treating as new: {}", id, e);
                None
            }
        };

        match stored {
            Some(azimuth) => azimuth,
            None => {
                let azimuth = self.rng.gen_range(0.0..360.0);
                if let Err(e) = self.placements.store(id, azimuth) {
                    warn!(
                        "Failed to persist placement for {}, keeping it for this session: {}",
                        id, e
                    );
                }
                azimuth
            }
        }
    }

    /// Drop runtime state for sources no longer in the active set.
    pub fn retain_runtime<F>(&mut self, keep: F)
    where
        F: Fn(&SourceId) -> bool,
    {
        self.runtime.retain(|id, _| keep(id));
    }

    /// Drop all runtime state. Placements stay so a stopped and
    /// restarted engine keeps every source in its assigned direction.
    pub fn reset(&mut self) {
        self.runtime.clear();
    }

    pub fn active_count(&self) -> usize {
        self.runtime.len()
    }
}
