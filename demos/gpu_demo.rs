// GPU step loop; Up/Down scale the time step, the change is re-uploaded next frame
use bevy::diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;
use bevy_gpu_md::gpu::buffers::GpuMdPlugin;
use bevy_gpu_md::params::{MdSetup, SimParams};

fn main() {
    App::new()
        .add_plugins((DefaultPlugins, FrameTimeDiagnosticsPlugin::default()))
        .insert_resource(MdSetup::demo_argon())
        .insert_resource(SimParams::argon(500.0))
        .add_plugins(GpuMdPlugin)
        .add_systems(Startup, |mut commands: Commands| {
            commands.spawn(Camera3d::default());
        })
        .add_systems(Update, (edit_params, log_fps))
        .run();
}

fn edit_params(keys: Res<ButtonInput<KeyCode>>, mut params: ResMut<SimParams>) {
    if keys.just_pressed(KeyCode::ArrowUp) {
        params.delta_t *= 2.0;
        info!("delta_t = {}", params.delta_t);
    }
    if keys.just_pressed(KeyCode::ArrowDown) {
        params.delta_t *= 0.5;
        info!("delta_t = {}", params.delta_t);
    }
}

fn log_fps(diagnostics: Res<DiagnosticsStore>, mut counter: Local<u32>) {
    *counter += 1;
    if *counter >= 120 {
        *counter = 0;

        if let Some(fps_diag) = diagnostics.get(&FrameTimeDiagnosticsPlugin::FPS) {
            if let Some(avg) = fps_diag.average() {
                info!("==== Average FPS over last ~2 s: {:.1} ====", avg);
            }
        }
    }
}
