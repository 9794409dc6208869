// Lennard-Jones molecular dynamics in 3D (CPU compute substrate)
use bevy::log::debug;
use glam::Vec3;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::cpu::store::{ParticleFrame, ParticleStore, StepBuffers};
use crate::dispatch::{Kernel, STEP_ORDER, WORKGROUP_SIZE, workgroup_count};
use crate::error::SimError;
use crate::params::{ForceConstants, ParamBlock, SimParams};

// define the force law

/// Force on a particle from a neighbour at offset `d = pos_j - pos_i`.
/// Zero for coincident particles and at or beyond the cutoff.
#[inline]
pub fn pair_force(d: Vec3, c: &ForceConstants) -> Vec3 {
    let r2 = d.length_squared();
    if r2 <= 0.0 || r2 >= c.cutoff_2 {
        return Vec3::ZERO;
    }
    let inv_r2 = 1.0 / r2;
    let s6 = c.sigma_6 * inv_r2 * inv_r2 * inv_r2; // (sigma / r)^6
    let s12 = s6 * s6;
    // F(r) = 24 eps / r * (2 s12 - s6), positive pushes i away from j
    -c.epsilon_24 * (2.0 * s12 - s6) * inv_r2 * d
}

/// Net force on particle `i`, brute force over every other particle.
pub fn net_force(i: usize, pos: &[Vec3], c: &ForceConstants) -> Vec3 {
    let pos_i = pos[i];
    let mut f = Vec3::ZERO;
    for (j, pos_j) in pos.iter().enumerate() {
        if i == j {
            continue;
        }
        f += pair_force(*pos_j - pos_i, c);
    }
    f
}

// per-particle kernels, one invocation each

/// Slot for a half-step velocity correction. Passes velocity through.
#[inline]
pub fn velocity_kernel(vel: Vec3, _c: &ForceConstants) -> Vec3 {
    vel
}

#[inline]
pub fn position_kernel(pos: Vec3, vel: Vec3, c: &ForceConstants) -> Vec3 {
    pos + vel * c.delta_t
}

/// Unit mass, so the impulse is the velocity change.
#[inline]
pub fn force_kernel(i: usize, pos: &[Vec3], vel: Vec3, c: &ForceConstants) -> Vec3 {
    vel + net_force(i, pos, c) * c.delta_t
}

/// Runs a kernel over an output array in workgroups of `WORKGROUP_SIZE`
/// invocations, spread over a rayon pool. A dispatch returns only once every
/// workgroup has finished, so the next dispatch sees all its writes.
pub struct CpuSubstrate {
    pool: ThreadPool,
}

impl CpuSubstrate {
    /// `num_threads == 0` lets rayon pick one worker per core.
    pub fn new(num_threads: usize) -> Result<Self, SimError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("md-worker-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    /// `out[i] = kernel(i, out[i])` for every slot. Returns the workgroup count.
    pub fn dispatch<F>(&self, out: &mut [Vec3], kernel: F) -> u32
    where
        F: Fn(usize, Vec3) -> Vec3 + Sync,
    {
        let size = WORKGROUP_SIZE as usize;
        self.pool.install(|| {
            out.par_chunks_mut(size).enumerate().for_each(|(group, chunk)| {
                for (local, slot) in chunk.iter_mut().enumerate() {
                    *slot = kernel(group * size + local, *slot);
                }
            });
        });
        workgroup_count(out.len() as u32)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelDispatch {
    pub kernel: Kernel,
    pub workgroups: u32,
}

/// What one step did: which frame it read, which it wrote, what it dispatched.
#[derive(Clone, Copy, Debug)]
pub struct StepReport {
    pub step: u64,
    pub read: usize,
    pub wrote: usize,
    pub dispatches: [KernelDispatch; 3],
}

/// Issues the three kernels of a step in `STEP_ORDER` and advances the step counter.
pub struct StepScheduler {
    substrate: CpuSubstrate,
    params: ParamBlock,
    t: u64,
}

impl StepScheduler {
    pub fn new(params: SimParams) -> Result<Self, SimError> {
        Ok(Self::with_substrate(CpuSubstrate::new(0)?, params))
    }

    pub fn with_substrate(substrate: CpuSubstrate, params: SimParams) -> Self {
        Self { substrate, params: ParamBlock::new(params), t: 0 }
    }

    pub fn params(&self) -> &SimParams {
        self.params.params()
    }

    /// Takes effect at the next step.
    pub fn set_params(&mut self, params: SimParams) {
        self.params.set(params);
    }

    pub fn step_count(&self) -> u64 {
        self.t
    }

    /// Newest particle state, the one a renderer should draw.
    pub fn latest<'a>(&self, store: &'a ParticleStore) -> &'a ParticleFrame {
        store.current(self.t)
    }

    pub fn step(&mut self, store: &mut ParticleStore) -> StepReport {
        if self.params.sync() {
            debug!("step {}: force constants re-derived", self.t);
        }
        let c = *self.params.constants();
        let t = self.t;
        let n = store.len();
        let read = store.current_index(t);
        let wrote = store.next_index(t);

        let StepBuffers { src, dst } = store.split(t);
        let ParticleFrame { pos, vel } = dst;
        let pos = &mut pos[..n];
        let vel = &mut vel[..n];

        let mut dispatches = STEP_ORDER.map(|kernel| KernelDispatch { kernel, workgroups: 0 });
        for d in &mut dispatches {
            d.workgroups = match d.kernel {
                Kernel::UpdateVelocities => self.substrate.dispatch(vel, |i, v| {
                    velocity_kernel(src.map_or(v, |s| s.vel[i]), &c)
                }),
                Kernel::UpdatePositions => {
                    let vel = &*vel;
                    self.substrate.dispatch(pos, |i, p| {
                        position_kernel(src.map_or(p, |s| s.pos[i]), vel[i], &c)
                    })
                }
                Kernel::CalculateForces => {
                    let pos = &*pos;
                    self.substrate.dispatch(vel, |i, v| force_kernel(i, pos, v, &c))
                }
            };
        }

        self.t += 1;
        debug!("step {} done: read frame {}, wrote frame {}", t, read, wrote);

        StepReport { step: t, read, wrote, dispatches }
    }

    /// Runs `steps` steps, returns the report of the last one.
    pub fn run(&mut self, store: &mut ParticleStore, steps: u32) -> Option<StepReport> {
        let mut last = None;
        for _ in 0..steps {
            last = Some(self.step(store));
        }
        last
    }
}
