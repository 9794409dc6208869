// headless run on the CPU substrate, logging energy and step reports
use bevy::app::AppExit;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy_gpu_md::cpu::md3d::StepScheduler;
use bevy_gpu_md::cpu::store::ParticleStore;
use bevy_gpu_md::error::SimError;
use bevy_gpu_md::params::{MdSetup, SimParams};

const STEPS: u64 = 500;
const LOG_EVERY: u64 = 100;

#[derive(Resource)]
struct CpuSim {
    store: ParticleStore,
    scheduler: StepScheduler,
}

impl CpuSim {
    fn new(setup: &MdSetup, params: SimParams) -> Result<Self, SimError> {
        let lattice = setup.lattice();
        let mut store = ParticleStore::with_capacity(setup.mode, setup.max_num_particles);
        let n = store.seed(&lattice, &mut setup.rng())?;
        info!("created {} particles ({} cells per axis)", n, lattice.cells_per_axis());
        Ok(Self { store, scheduler: StepScheduler::new(params)? })
    }
}

fn main() {
    App::new()
        .add_plugins((MinimalPlugins, LogPlugin::default()))
        .insert_resource(MdSetup::demo_argon())
        // reduced units so neighbours actually interact
        .insert_resource(SimParams {
            delta_t: 0.005,
            epsilon: 1.0,
            sigma: 1.0,
            cutoff: 2.5,
            rotate_camera: false,
        })
        .add_systems(Startup, setup_sim)
        .add_systems(Update, (push_params, step_sim).chain())
        .run();
}

// a substrate that cannot start is fatal
fn setup_sim(mut commands: Commands, setup: Res<MdSetup>, params: Res<SimParams>) -> Result {
    commands.insert_resource(CpuSim::new(&setup, *params)?);
    Ok(())
}

// parameter edits land at the next step
fn push_params(params: Res<SimParams>, mut sim: ResMut<CpuSim>) {
    if params.is_changed() {
        sim.scheduler.set_params(*params);
    }
}

fn step_sim(mut sim: ResMut<CpuSim>, mut exit: EventWriter<AppExit>) {
    let CpuSim { store, scheduler } = &mut *sim;
    let report = scheduler.step(store);

    if report.step % LOG_EVERY == 0 {
        let ke = scheduler.latest(store).kinetic_energy(store.len());
        info!(
            "step {:>4}: read {} wrote {} workgroups {}  KE = {:.6}",
            report.step, report.read, report.wrote, report.dispatches[0].workgroups, ke
        );
    }
    if scheduler.step_count() >= STEPS {
        info!("Done. Exiting.");
        exit.write(AppExit::Success);
    }
}
