use bevy_gpu_md::cpu::lattice::Lattice;
use bevy_gpu_md::cpu::md3d::{StepScheduler, net_force, pair_force};
use bevy_gpu_md::cpu::store::{BufferMode, Particle, ParticleStore};
use bevy_gpu_md::dispatch::{Kernel, STEP_ORDER};
use bevy_gpu_md::params::{ForceConstants, SimParams};
use glam::Vec3;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn reduced_units() -> SimParams {
    SimParams {
        delta_t: 0.005,
        epsilon: 1.0,
        sigma: 1.0,
        cutoff: 2.5,
        rotate_camera: false,
    }
}

fn pair_at_rest(mode: BufferMode, separation: f32) -> ParticleStore {
    ParticleStore::from_particles(
        mode,
        &[
            Particle::new(Vec3::ZERO, Vec3::ZERO),
            Particle::new(Vec3::new(separation, 0.0, 0.0), Vec3::ZERO),
        ],
    )
}

fn separation(scheduler: &StepScheduler, store: &ParticleStore) -> f32 {
    let frame = scheduler.latest(store);
    frame.pos[0].distance(frame.pos[1])
}

#[test]
fn no_force_at_potential_minimum() {
    let params = reduced_units();
    let c = ForceConstants::from(&params);
    let r_min = params.potential_minimum();

    let f = pair_force(Vec3::new(r_min, 0.0, 0.0), &c);
    assert!(f.length() < 1e-4, "force at the minimum: {f}");
}

#[test]
fn repulsive_inside_attractive_outside() {
    let c = ForceConstants::from(&reduced_units());
    // neighbour on +x: pushed towards -x when close, pulled towards +x when far
    assert!(pair_force(Vec3::new(1.0, 0.0, 0.0), &c).x < 0.0);
    assert!(pair_force(Vec3::new(1.5, 0.0, 0.0), &c).x > 0.0);
}

#[test]
fn no_force_beyond_cutoff() {
    let params = reduced_units();
    let c = ForceConstants::from(&params);

    assert_eq!(pair_force(Vec3::new(2.6, 0.0, 0.0), &c), Vec3::ZERO);
    assert_eq!(pair_force(Vec3::new(0.0, 0.0, params.cutoff), &c), Vec3::ZERO);
    assert_eq!(pair_force(Vec3::ZERO, &c), Vec3::ZERO);

    let pos = [Vec3::ZERO, Vec3::new(3.0, 0.0, 0.0), Vec3::new(0.0, -4.0, 0.0)];
    for i in 0..pos.len() {
        assert_eq!(net_force(i, &pos, &c), Vec3::ZERO);
    }
}

#[test]
fn isolated_particle_drifts() {
    for mode in [BufferMode::PingPong, BufferMode::InPlace] {
        let p0 = Vec3::new(1.0, 2.0, 3.0);
        let v0 = Vec3::new(0.1, -0.2, 0.05);
        let mut store = ParticleStore::from_particles(mode, &[Particle::new(p0, v0)]);
        let mut scheduler = StepScheduler::new(reduced_units()).unwrap();

        scheduler.step(&mut store);

        let p = scheduler.latest(&store).particle(0);
        assert_eq!(p.vel, v0);
        assert!(p.pos.abs_diff_eq(p0 + v0 * 0.005, 1e-7), "{mode:?}: {}", p.pos);
    }
}

#[test]
fn pair_attracts_then_repels() {
    for mode in [BufferMode::PingPong, BufferMode::InPlace] {
        let params = reduced_units();
        let r_min = params.potential_minimum();
        let mut store = pair_at_rest(mode, 1.5);
        let mut scheduler = StepScheduler::new(params).unwrap();

        // at rest, the first step only picks up velocity
        scheduler.step(&mut store);
        let mut prev = separation(&scheduler, &store);
        assert_eq!(prev, 1.5);

        let mut crossed = false;
        let mut rebounded = false;
        for _ in 0..2000 {
            scheduler.step(&mut store);
            let s = separation(&scheduler, &store);
            if !crossed {
                assert!(s < prev, "{mode:?}: separation grew to {s} before the minimum");
                crossed = s < r_min;
            } else if s > prev {
                rebounded = true;
                assert!(s < r_min, "{mode:?}: turned back outside the well");
                break;
            }
            assert!(s > 0.9, "{mode:?}: particles overlapped ({s})");
            prev = s;
        }
        assert!(crossed, "{mode:?}: never reached the potential minimum");
        assert!(rebounded, "{mode:?}: never repelled");
    }
}

#[test]
fn pair_conserves_momentum() {
    let mut store = pair_at_rest(BufferMode::PingPong, 1.3);
    let mut scheduler = StepScheduler::new(reduced_units()).unwrap();

    scheduler.run(&mut store, 200);

    let frame = scheduler.latest(&store);
    let momentum = frame.vel[0] + frame.vel[1];
    assert!(momentum.abs_diff_eq(Vec3::ZERO, 1e-5), "net momentum {momentum}");
    assert!(frame.kinetic_energy(2) > 0.0);
}

#[test]
fn next_buffer_becomes_current() {
    let mut store = ParticleStore::with_capacity(BufferMode::PingPong, 64);
    store.seed(&Lattice::fcc(2.0, 1.0), &mut StdRng::seed_from_u64(11)).unwrap();
    let mut scheduler = StepScheduler::new(reduced_units()).unwrap();

    let mut prev = scheduler.step(&mut store);
    assert_eq!((prev.step, prev.read, prev.wrote), (0, 0, 1));

    for t in 1..6 {
        let written = scheduler.latest(&store).clone();
        let report = scheduler.step(&mut store);
        assert_eq!(report.step, t);
        assert_ne!(report.read, report.wrote);
        assert_eq!(report.read, prev.wrote, "step {t} read a stale buffer");

        // the frame the previous step wrote is the one this step read from
        let read = store.frame(report.read);
        assert_eq!(read.pos[..32], written.pos[..32]);
        assert_eq!(store.frame(report.wrote).pos, scheduler.latest(&store).pos);
        prev = report;
    }
}

#[test]
fn in_place_uses_one_buffer() {
    let mut store = pair_at_rest(BufferMode::InPlace, 1.3);
    let mut scheduler = StepScheduler::new(reduced_units()).unwrap();

    for _ in 0..3 {
        let report = scheduler.step(&mut store);
        assert_eq!((report.read, report.wrote), (0, 0));
    }
    assert_eq!(store.num_buffers(), 1);
}

#[test]
fn buffer_modes_agree() {
    let particles = Lattice::fcc(2.0, 1.0).generate(&mut StdRng::seed_from_u64(12));
    let mut params = reduced_units();
    params.sigma = 0.5;

    let mut ping_pong = ParticleStore::from_particles(BufferMode::PingPong, &particles);
    let mut in_place = ParticleStore::from_particles(BufferMode::InPlace, &particles);
    let mut a = StepScheduler::new(params).unwrap();
    let mut b = StepScheduler::new(params).unwrap();

    a.run(&mut ping_pong, 25);
    b.run(&mut in_place, 25);

    let (fa, fb) = (a.latest(&ping_pong), b.latest(&in_place));
    for i in 0..particles.len() {
        assert!(fa.pos[i].abs_diff_eq(fb.pos[i], 1e-5));
        assert!(fa.vel[i].abs_diff_eq(fb.vel[i], 1e-5));
    }
}

#[test]
fn kernels_dispatched_in_order() {
    let mut store = ParticleStore::with_capacity(BufferMode::PingPong, 108);
    let n = store.seed(&Lattice::fcc(3.0, 1.0), &mut StdRng::seed_from_u64(13)).unwrap();
    assert_eq!(n, 108);
    let mut scheduler = StepScheduler::new(reduced_units()).unwrap();

    let report = scheduler.step(&mut store);
    let kernels = report.dispatches.map(|d| d.kernel);
    assert_eq!(kernels, STEP_ORDER);
    assert_eq!(kernels[2], Kernel::CalculateForces);
    assert!(report.dispatches.iter().all(|d| d.workgroups == 2)); // ceil(108 / 64)
}

#[test]
fn new_params_apply_on_next_step() {
    let v0 = Vec3::new(1.0, 0.0, 0.0);
    let mut store = ParticleStore::from_particles(BufferMode::PingPong, &[Particle::new(Vec3::ZERO, v0)]);
    let mut scheduler = StepScheduler::new(reduced_units()).unwrap();

    scheduler.step(&mut store);
    let x1 = scheduler.latest(&store).pos[0].x;

    let mut params = *scheduler.params();
    params.delta_t *= 2.0;
    scheduler.set_params(params);
    scheduler.step(&mut store);
    let x2 = scheduler.latest(&store).pos[0].x;

    assert!((x1 - 0.005).abs() < 1e-7);
    assert!((x2 - x1 - 0.01).abs() < 1e-6);
    assert_eq!(scheduler.step_count(), 2);
}

#[test]
fn empty_store_steps() {
    let mut store = ParticleStore::with_capacity(BufferMode::PingPong, 8);
    let mut scheduler = StepScheduler::new(reduced_units()).unwrap();

    let report = scheduler.step(&mut store);
    assert!(report.dispatches.iter().all(|d| d.workgroups == 0));
    assert_eq!(scheduler.step_count(), 1);
}
