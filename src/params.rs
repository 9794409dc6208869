// physical constants of the Lennard-Jones force law
use bevy::prelude::Resource;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::cpu::lattice::Lattice;
use crate::cpu::store::BufferMode;
use crate::gpu::ffi::GPUSimParams;

/// Everything the force law depends on. Edited between frames by the host,
/// never during a step.
#[derive(Resource, Clone, Copy, Debug, PartialEq)]
pub struct SimParams {
    pub delta_t: f32,
    pub epsilon: f32, // well depth
    pub sigma: f32,   // length scale
    pub cutoff: f32,
    pub rotate_camera: bool, // only read by the renderer
}

impl SimParams {
    /// Argon in reduced units, shrunk by `scale_factor` so a few lattice cells
    /// fit in view.
    pub fn argon(scale_factor: f32) -> Self {
        Self {
            delta_t: 0.01,
            epsilon: 1.0 / (scale_factor * scale_factor),
            sigma: 3.405 / scale_factor,
            cutoff: (2.5 * 3.405) / scale_factor,
            rotate_camera: false,
        }
    }

    /// Separation where the pair force changes sign.
    pub fn potential_minimum(&self) -> f32 {
        self.sigma * 2f32.powf(1.0 / 6.0)
    }

    pub fn to_gpu(&self) -> GPUSimParams {
        GPUSimParams {
            delta_t: self.delta_t,
            epsilon: self.epsilon,
            sigma: self.sigma,
            cutoff: self.cutoff,
        }
    }
}

impl Default for SimParams {
    fn default() -> Self {
        Self::argon(500.0)
    }
}

/// Constants the CPU force kernel reads, precomputed once per parameter change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ForceConstants {
    pub delta_t: f32,
    pub epsilon_24: f32,
    pub sigma_6: f32,
    pub cutoff_2: f32,
}

impl From<&SimParams> for ForceConstants {
    fn from(p: &SimParams) -> Self {
        Self {
            delta_t: p.delta_t,
            epsilon_24: 24.0 * p.epsilon,
            sigma_6: p.sigma.powi(6),
            cutoff_2: p.cutoff * p.cutoff,
        }
    }
}

/// Host-side copy of the parameters plus the block derived from them.
/// `set` only marks the block stale; `sync` re-derives the whole block.
#[derive(Clone, Debug)]
pub struct ParamBlock {
    params: SimParams,
    constants: ForceConstants,
    dirty: bool,
}

impl ParamBlock {
    pub fn new(params: SimParams) -> Self {
        Self { params, constants: ForceConstants::from(&params), dirty: false }
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn set(&mut self, params: SimParams) {
        if params != self.params {
            self.params = params;
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns true when the block was re-derived.
    pub fn sync(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.constants = ForceConstants::from(&self.params);
        self.dirty = false;
        true
    }

    pub fn constants(&self) -> &ForceConstants {
        &self.constants
    }
}

/// Startup inputs, provided once by the host.
#[derive(Resource, Clone, Copy, Debug)]
pub struct MdSetup {
    pub max_num_particles: usize,
    pub system_length: f32,
    pub lattice_constant: f32,
    pub mode: BufferMode,
    /// Fixed seed for the initial velocities, fresh entropy when `None`.
    pub seed: Option<u64>,
}

impl MdSetup {
    // demo function ----------------------------------------------
    pub fn demo_argon() -> Self {
        Self {
            max_num_particles: 256,
            system_length: 3.0,
            lattice_constant: 1.5,
            mode: BufferMode::PingPong,
            seed: None,
        }
    }
    // ------------------------------------------------------------

    pub fn lattice(&self) -> Lattice {
        Lattice::fcc(self.system_length, self.lattice_constant)
    }

    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

impl Default for MdSetup {
    fn default() -> Self {
        Self::demo_argon()
    }
}
