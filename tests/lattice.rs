use std::collections::HashSet;

use bevy_gpu_md::cpu::lattice::{INITIAL_SPEED, Lattice};
use bevy_gpu_md::cpu::store::{BufferMode, Particle, ParticleStore};
use bevy_gpu_md::error::SimError;
use glam::Vec3;
use rand::SeedableRng;
use rand::rngs::StdRng;

// sites are multiples of a/2, so doubled coordinates are exact integers
fn site_key(pos: Vec3, a: f32) -> (i32, i32, i32) {
    let k = pos * 2.0 / a;
    (k.x.round() as i32, k.y.round() as i32, k.z.round() as i32)
}

#[test]
fn fcc_two_cells_per_axis() {
    let lattice = Lattice::fcc(2.0, 1.0);
    assert_eq!(lattice.cells_per_axis(), 2);

    let particles = lattice.generate(&mut StdRng::seed_from_u64(1));
    assert_eq!(particles.len(), 32); // 2^3 * 4

    let mut expected = HashSet::new();
    for i in 0..2 {
        for j in 0..2 {
            for k in 0..2 {
                let (i, j, k) = (2 * i, 2 * j, 2 * k);
                expected.insert((i, j, k));
                expected.insert((i + 1, j + 1, k));
                expected.insert((i + 1, j, k + 1));
                expected.insert((i, j + 1, k + 1));
            }
        }
    }

    let seen: HashSet<_> = particles.iter().map(|p| site_key(p.pos, 1.0)).collect();
    assert_eq!(seen.len(), 32, "duplicate lattice sites");
    assert_eq!(seen, expected);
}

#[test]
fn sites_scale_with_lattice_constant() {
    let particles = Lattice::fcc(3.0, 1.5).generate(&mut StdRng::seed_from_u64(2));
    assert_eq!(particles.len(), 32);
    assert_eq!(particles[0].pos, Vec3::ZERO);
    assert_eq!(particles[1].pos, Vec3::new(0.75, 0.75, 0.0)); // (0.5, 0.5, 0) * 1.5
    assert_eq!(particles[4].pos, Vec3::new(0.0, 0.0, 1.5)); // cell (0, 0, 1)
}

#[test]
fn positions_do_not_depend_on_rng() {
    let lattice = Lattice::fcc(3.0, 1.0);
    let a = lattice.generate(&mut StdRng::seed_from_u64(7));
    let b = lattice.generate(&mut StdRng::seed_from_u64(8));

    assert_eq!(a.len(), b.len());
    for (p, q) in a.iter().zip(&b) {
        assert_eq!(p.pos, q.pos);
    }
    assert!(a.iter().zip(&b).any(|(p, q)| p.vel != q.vel));
}

#[test]
fn velocities_stay_within_initial_speed() {
    let particles = Lattice::fcc(4.0, 1.0).generate(&mut StdRng::seed_from_u64(3));
    assert_eq!(particles.len(), 256);
    for p in &particles {
        for v in p.vel.to_array() {
            assert!((-INITIAL_SPEED..=INITIAL_SPEED).contains(&v), "velocity component {v}");
        }
    }
}

#[test]
fn partial_cell_is_dropped() {
    let lattice = Lattice::fcc(2.9, 1.0);
    assert_eq!(lattice.cells_per_axis(), 2);
    assert_eq!(lattice.num_particles(), Some(32));

    assert_eq!(Lattice::fcc(0.5, 1.0).num_particles(), Some(0));
    assert!(Lattice::fcc(0.5, 1.0).generate(&mut StdRng::seed_from_u64(14)).is_empty());
}

#[test]
fn fill_reports_written_count() {
    let mut out = vec![Particle::default(); 40];
    let n = Lattice::fcc(2.0, 1.0).fill(&mut StdRng::seed_from_u64(4), &mut out).unwrap();
    assert_eq!(n, 32);
    assert_eq!(out[32], Particle::default()); // slots past the lattice untouched
}

#[test]
fn fill_rejects_undersized_buffer() {
    let mut out = vec![Particle::default(); 10];
    let err = Lattice::fcc(2.0, 1.0).fill(&mut StdRng::seed_from_u64(5), &mut out).unwrap_err();
    assert!(matches!(err, SimError::Capacity { required: 32, capacity: 10 }));
    assert!(out.iter().all(|p| *p == Particle::default()));
}

#[test]
fn centered_square_is_planar() {
    let particles = Lattice::centered_square(2.0, 1.0).generate(&mut StdRng::seed_from_u64(6));
    assert_eq!(particles.len(), 16); // 2^2 * 4

    let seen: HashSet<_> = particles.iter().map(|p| site_key(p.pos, 1.0)).collect();
    assert_eq!(seen.len(), 16);
    assert!(particles.iter().all(|p| p.pos.z == 0.0 && p.vel.z == 0.0));
}

#[test]
fn store_seeds_every_buffer() {
    let mut store = ParticleStore::with_capacity(BufferMode::PingPong, 256);
    let n = store.seed(&Lattice::fcc(3.0, 1.5), &mut StdRng::seed_from_u64(9)).unwrap();

    assert_eq!(n, 32);
    assert_eq!(store.len(), 32);
    assert_eq!(store.capacity(), 256);
    assert_eq!(store.num_buffers(), 2);
    for i in 0..n {
        assert_eq!(store.frame(0).particle(i), store.frame(1).particle(i));
    }
}

#[test]
fn store_capacity_is_checked() {
    let mut store = ParticleStore::with_capacity(BufferMode::InPlace, 16);
    let result = store.seed(&Lattice::fcc(2.0, 1.0), &mut StdRng::seed_from_u64(10));
    assert!(matches!(result, Err(SimError::Capacity { required: 32, capacity: 16 })));
    assert!(store.is_empty());
}

#[test]
fn oversized_lattice_reports_capacity() {
    // 1e10 cells per axis, n^3 does not fit in usize
    let lattice = Lattice::fcc(1.0e7, 1.0e-3);
    assert_eq!(lattice.num_particles(), None);

    let mut out = vec![Particle::default(); 8];
    let err = lattice.fill(&mut StdRng::seed_from_u64(15), &mut out).unwrap_err();
    assert!(matches!(err, SimError::Capacity { required: usize::MAX, capacity: 8 }));

    let mut store = ParticleStore::with_capacity(BufferMode::PingPong, 8);
    assert!(store.seed(&lattice, &mut StdRng::seed_from_u64(16)).is_err());
    assert!(store.is_empty());
}

#[test]
fn generate_matches_fill() {
    let lattice = Lattice::fcc(2.0, 1.0);
    let generated = lattice.generate(&mut StdRng::seed_from_u64(17));

    let mut filled = vec![Particle::default(); 32];
    lattice.fill(&mut StdRng::seed_from_u64(17), &mut filled).unwrap();
    assert_eq!(generated, filled);
}
