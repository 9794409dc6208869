// particle storage: one or two frames, each allocated at full capacity
use glam::Vec3;
use rand::Rng;

use crate::cpu::lattice::Lattice;
use crate::dispatch::{current_parity, next_parity};
use crate::error::SimError;
use crate::gpu::ffi::GPUParticle;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Particle {
    pub pos: Vec3, // position
    pub vel: Vec3, // velocity
}

impl Particle {
    pub fn new(pos: Vec3, vel: Vec3) -> Self {
        Self { pos, vel }
    }
}

impl From<&Particle> for GPUParticle {
    fn from(p: &Particle) -> Self {
        GPUParticle::new(p.pos.to_array(), p.vel.to_array())
    }
}

/// One buffer's worth of particles. Positions and velocities live in separate
/// arrays so a kernel can read every position while writing velocities.
#[derive(Clone, Debug, Default)]
pub struct ParticleFrame {
    pub pos: Vec<Vec3>,
    pub vel: Vec<Vec3>,
}

impl ParticleFrame {
    fn with_capacity(capacity: usize) -> Self {
        Self { pos: vec![Vec3::ZERO; capacity], vel: vec![Vec3::ZERO; capacity] }
    }

    pub fn particle(&self, i: usize) -> Particle {
        Particle::new(self.pos[i], self.vel[i])
    }

    /// Sum of `v²/2` over the first `len` particles, unit mass.
    pub fn kinetic_energy(&self, len: usize) -> f32 {
        self.vel[..len].iter().map(|v| 0.5 * v.length_squared()).sum()
    }

    /// Packs the first `len` particles into the layout the GPU buffers use.
    pub fn to_gpu(&self, len: usize) -> Vec<GPUParticle> {
        (0..len).map(|i| GPUParticle::from(&self.particle(i))).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferMode {
    /// Two frames; a step reads one and writes the other.
    PingPong,
    /// One frame, updated pass by pass.
    InPlace,
}

/// Source and destination of one step. `src` is `None` in place, where each
/// kernel reads the destination as left by the previous kernel.
pub struct StepBuffers<'a> {
    pub src: Option<&'a ParticleFrame>,
    pub dst: &'a mut ParticleFrame,
}

/// Never resized after construction. `len` is how many slots hold particles.
#[derive(Clone, Debug)]
pub struct ParticleStore {
    mode: BufferMode,
    frames: Vec<ParticleFrame>,
    capacity: usize,
    len: usize,
}

impl ParticleStore {
    pub fn with_capacity(mode: BufferMode, capacity: usize) -> Self {
        let count = match mode {
            BufferMode::PingPong => 2,
            BufferMode::InPlace => 1,
        };
        Self {
            mode,
            frames: (0..count).map(|_| ParticleFrame::with_capacity(capacity)).collect(),
            capacity,
            len: 0,
        }
    }

    /// Store sized exactly to `particles`, every frame holding the same copy.
    pub fn from_particles(mode: BufferMode, particles: &[Particle]) -> Self {
        let mut store = Self::with_capacity(mode, particles.len());
        store.load(particles);
        store
    }

    /// Fills every frame with a freshly generated lattice, returns the particle count.
    pub fn seed<R: Rng + ?Sized>(&mut self, lattice: &Lattice, rng: &mut R) -> Result<usize, SimError> {
        let mut particles = vec![Particle::default(); self.capacity];
        let n = lattice.fill(rng, &mut particles)?;
        self.load(&particles[..n]);
        Ok(n)
    }

    fn load(&mut self, particles: &[Particle]) {
        for frame in &mut self.frames {
            for (i, p) in particles.iter().enumerate() {
                frame.pos[i] = p.pos;
                frame.vel[i] = p.vel;
            }
        }
        self.len = particles.len();
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn num_buffers(&self) -> usize {
        self.frames.len()
    }

    /// Index of the frame read at step `t`.
    pub fn current_index(&self, t: u64) -> usize {
        match self.mode {
            BufferMode::PingPong => current_parity(t),
            BufferMode::InPlace => 0,
        }
    }

    /// Index of the frame written at step `t`.
    pub fn next_index(&self, t: u64) -> usize {
        match self.mode {
            BufferMode::PingPong => next_parity(t),
            BufferMode::InPlace => 0,
        }
    }

    pub fn frame(&self, index: usize) -> &ParticleFrame {
        &self.frames[index]
    }

    /// Frame holding the newest state when the step counter reads `t`.
    pub fn current(&self, t: u64) -> &ParticleFrame {
        &self.frames[self.current_index(t)]
    }

    pub fn split(&mut self, t: u64) -> StepBuffers<'_> {
        match self.mode {
            BufferMode::InPlace => StepBuffers { src: None, dst: &mut self.frames[0] },
            BufferMode::PingPong => {
                let (a, b) = self.frames.split_at_mut(1);
                if current_parity(t) == 0 {
                    StepBuffers { src: Some(&a[0]), dst: &mut b[0] }
                } else {
                    StepBuffers { src: Some(&b[0]), dst: &mut a[0] }
                }
            }
        }
    }
}
