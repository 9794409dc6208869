// runs the GPU step for a while, reads the newest buffer back and replays
// the same number of steps on the CPU substrate from the same seeded lattice
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use bevy::app::AppExit;
use bevy::prelude::*;
use bevy::render::render_resource::{Maintain, MapMode};
use bevy::render::renderer::RenderDevice;
use bevy_gpu_md::cpu::md3d::StepScheduler;
use bevy_gpu_md::cpu::store::ParticleStore;
use bevy_gpu_md::gpu::buffers::{AllowCopy, GpuMdPlugin, ReadbackBuffer};
use bevy_gpu_md::gpu::ffi::GPUParticle;
use bevy_gpu_md::params::{MdSetup, SimParams};
use glam::Vec3;

const SEED: u64 = 7;
const WARMUP_FRAMES: u32 = 30;
const TOLERANCE: f32 = 1e-3; // relative, per particle

#[inline(always)]
fn rel_norm_sym(a: Vec3, b: Vec3) -> f32 {
    let diff = (b - a).length();
    let scale = a.length().max(b.length()).max(1e-6);
    diff / scale
}

fn main() {
    App::new()
        .add_plugins(DefaultPlugins)
        .insert_resource(MdSetup { seed: Some(SEED), ..MdSetup::demo_argon() })
        .insert_resource(SimParams {
            delta_t: 0.005,
            epsilon: 1.0,
            sigma: 1.0,
            cutoff: 2.5,
            rotate_camera: false,
        })
        .add_plugins(GpuMdPlugin)
        .add_systems(Startup, |mut commands: Commands| {
            commands.spawn(Camera2d);
        })
        .add_systems(Update, orchestrate)
        .run();
}

fn orchestrate(
    mut allow_copy: ResMut<AllowCopy>,
    readback: Option<Res<ReadbackBuffer>>,
    setup: Res<MdSetup>,
    params: Res<SimParams>,
    render_device: Res<RenderDevice>,
    mut exit: EventWriter<AppExit>,
    mut frame: Local<u32>,
    mut state: Local<u8>,
) {
    let Some(readback) = readback else { return };
    *frame += 1;

    match *state {
        // let the GPU run on its own for a while
        0 => {
            if *frame >= WARMUP_FRAMES {
                allow_copy.0 = true;
                *state = 1;
            }
        }

        // keep asking until a step has actually been copied
        1 => {
            if readback.captured_steps() > 0 {
                allow_copy.0 = false;
                *state = 2;
            }
        }

        // avoid mapping race with copies still in flight
        2 => *state = 3,
        3 => *state = 4,

        4 => {
            render_device.poll(Maintain::Wait);
            let steps = readback.captured_steps();
            let slice = readback.buffer.slice(..);

            let status = Arc::new(AtomicU8::new(0));
            let cb = status.clone();
            slice.map_async(MapMode::Read, move |r| {
                cb.store(if r.is_ok() { 1 } else { 2 }, Ordering::SeqCst)
            });

            loop {
                render_device.poll(Maintain::Poll);
                match status.load(Ordering::SeqCst) {
                    0 => std::thread::yield_now(),
                    1 => break,
                    2 => {
                        error!("map_async failed; unmapping and exiting");
                        readback.buffer.unmap();
                        exit.write(AppExit::error());
                        return;
                    }
                    _ => unreachable!(),
                }
            }

            // replay on the CPU from the same lattice and seed
            let mut store = ParticleStore::with_capacity(setup.mode, setup.max_num_particles);
            let mut scheduler = match StepScheduler::new(*params) {
                Ok(s) => s,
                Err(e) => {
                    error!("cpu substrate unavailable: {}", e);
                    readback.buffer.unmap();
                    exit.write(AppExit::error());
                    return;
                }
            };
            if let Err(e) = store.seed(&setup.lattice(), &mut setup.rng()) {
                error!("cpu store not seeded: {}", e);
                readback.buffer.unmap();
                exit.write(AppExit::error());
                return;
            }
            scheduler.run(&mut store, steps as u32);
            info!("GPU copy taken after {} steps, CPU replayed {}", steps, scheduler.step_count());

            let passed = {
                let data = slice.get_mapped_range();
                let gpu: &[GPUParticle] = bytemuck::cast_slice(&data);
                let cpu = scheduler.latest(&store);
                assert_eq!(gpu.len(), store.len(), "GPU/CPU particle counts differ");

                let mut max_rel_x = 0.0f32;
                let mut max_rel_v = 0.0f32;
                let mut max_abs_x = 0.0f32;
                let mut max_abs_v = 0.0f32;

                for (i, g) in gpu.iter().enumerate() {
                    let (cx, cv) = (cpu.pos[i], cpu.vel[i]);
                    let (gx, gv) = (Vec3::from_array(g.pos), Vec3::from_array(g.vel));

                    max_abs_x = max_abs_x.max((gx - cx).length());
                    max_abs_v = max_abs_v.max((gv - cv).length());
                    max_rel_x = max_rel_x.max(rel_norm_sym(cx, gx));
                    max_rel_v = max_rel_v.max(rel_norm_sym(cv, gv));
                }

                info!(
                    "{}-step parity:  max_rel |x| = {:.4}% |v| = {:.4}%   max_abs |x| = {:.6} |v| = {:.6}",
                    steps,
                    max_rel_x * 100.0,
                    max_rel_v * 100.0,
                    max_abs_x,
                    max_abs_v
                );
                max_rel_x <= TOLERANCE && max_rel_v <= TOLERANCE
            };

            readback.buffer.unmap();
            if passed {
                info!("GPU and CPU agree within {}. Exiting.", TOLERANCE);
                exit.write(AppExit::Success);
            } else {
                error!("GPU and CPU differ by more than {}", TOLERANCE);
                exit.write(AppExit::error());
            }
        }

        _ => {}
    }
}
