// initial conditions: particles on a regular lattice with small random velocities
use glam::Vec3;
use rand::Rng;

use crate::cpu::store::Particle;
use crate::error::SimError;

static FCC_BASIS: [Vec3; 4] = [
    Vec3::new(0.0, 0.0, 0.0),
    Vec3::new(0.5, 0.5, 0.0),
    Vec3::new(0.5, 0.0, 0.5),
    Vec3::new(0.0, 0.5, 0.5),
];

// the face-centered square in the z = 0 plane
static SQUARE_BASIS: [Vec3; 4] = [
    Vec3::new(0.0, 0.0, 0.0),
    Vec3::new(0.5, 0.5, 0.0),
    Vec3::new(0.5, 0.0, 0.0),
    Vec3::new(0.0, 0.5, 0.0),
];

/// Half-width of the uniform initial velocity distribution, per axis.
pub const INITIAL_SPEED: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LatticeKind {
    Fcc,
    CenteredSquare2d,
}

/// `n = system_length / lattice_constant` unit cells per axis, truncated.
/// A partial last cell is dropped.
#[derive(Clone, Copy, Debug)]
pub struct Lattice {
    pub kind: LatticeKind,
    pub system_length: f32,
    pub lattice_constant: f32,
}

impl Lattice {
    pub fn fcc(system_length: f32, lattice_constant: f32) -> Self {
        Self { kind: LatticeKind::Fcc, system_length, lattice_constant }
    }

    pub fn centered_square(system_length: f32, lattice_constant: f32) -> Self {
        Self { kind: LatticeKind::CenteredSquare2d, system_length, lattice_constant }
    }

    pub fn cells_per_axis(&self) -> usize {
        (self.system_length / self.lattice_constant) as usize
    }

    /// `n³·4` for FCC, `n²·4` for the square lattice. `None` if that overflows `usize`.
    pub fn num_particles(&self) -> Option<usize> {
        let n = self.cells_per_axis();
        let per_plane = n.checked_mul(n)?;
        match self.kind {
            LatticeKind::Fcc => per_plane.checked_mul(n)?.checked_mul(FCC_BASIS.len()),
            LatticeKind::CenteredSquare2d => per_plane.checked_mul(SQUARE_BASIS.len()),
        }
    }

    /// Lattice sites in generation order: cell i, j, k (outer to inner), then basis.
    /// Depends only on the lattice, never on randomness.
    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        let n = self.cells_per_axis();
        let (depth, basis): (usize, &[Vec3]) = match self.kind {
            LatticeKind::Fcc => (n, &FCC_BASIS[..]),
            LatticeKind::CenteredSquare2d => (1, &SQUARE_BASIS[..]),
        };
        let a = self.lattice_constant;

        (0..n).flat_map(move |i| {
            (0..n).flat_map(move |j| {
                (0..depth).flat_map(move |k| {
                    let cell = Vec3::new(i as f32, j as f32, k as f32);
                    basis.iter().map(move |b| (cell + *b) * a)
                })
            })
        })
    }

    /// Particles in site order, each with a fresh random velocity.
    pub fn particles<'a, R: Rng + ?Sized>(&'a self, rng: &'a mut R) -> impl Iterator<Item = Particle> + 'a {
        let planar = self.kind == LatticeKind::CenteredSquare2d;
        self.positions().map(move |pos| {
            let mut vel = Vec3::new(draw_speed(rng), draw_speed(rng), 0.0);
            if !planar {
                vel.z = draw_speed(rng);
            }
            Particle { pos, vel }
        })
    }

    /// Writes the lattice into `out` and returns how many particles were written.
    /// Fails without writing anything if `out` is shorter than `num_particles()`.
    pub fn fill<R: Rng + ?Sized>(&self, rng: &mut R, out: &mut [Particle]) -> Result<usize, SimError> {
        let required = self.num_particles().unwrap_or(usize::MAX);
        if required > out.len() {
            return Err(SimError::Capacity { required, capacity: out.len() });
        }

        let mut written = 0;
        for (slot, particle) in out.iter_mut().zip(self.particles(rng)) {
            *slot = particle;
            written += 1;
        }
        Ok(written)
    }

    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Particle> {
        self.particles(rng).collect()
    }
}

#[inline]
fn draw_speed<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    2.0 * (rng.r#gen::<f32>() - 0.5) * INITIAL_SPEED
}
