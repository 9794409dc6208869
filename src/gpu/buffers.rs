use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bevy::prelude::*;
use bevy::render::render_resource::{
    BindGroup, BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry, BindingType, Buffer,
    BufferBindingType, BufferDescriptor, BufferInitDescriptor, BufferUsages, ShaderStages,
};
use bevy::render::renderer::{RenderDevice, RenderQueue};
use bevy::render::{Extract, ExtractSchedule, Render, RenderApp, RenderSet};

use crate::cpu::store::{BufferMode, ParticleStore};
use crate::dispatch::next_parity;
use crate::error::SimError;
use crate::gpu::ffi::{GPUParticle, ParticleLayout};
use crate::gpu::pipeline::{MdPipelines, add_md_step_node_to_graph, prepare_md_pipelines};
use crate::params::{MdSetup, SimParams};

// ==================== resources ======================================

/* binding(0): SimParams (uniform)
binding(1): current particles (read-only storage)
binding(2): next particles (rw storage) */
#[derive(Resource, Clone)]
pub struct MdBindGroupLayout(pub BindGroupLayout);

// one per parity: group i reads buffer i and writes buffer (i + 1) % 2
#[derive(Resource)]
pub struct MdBindGroups(pub [BindGroup; 2]);

#[derive(Resource)]
pub struct ParticleBuffers {
    pub buffers: [Buffer; 2],
    pub layout: ParticleLayout,
}

#[derive(Resource)]
pub struct SimParamsBuffer {
    pub buffer: Buffer,
}

// Rendering world copy
#[derive(Resource, Clone)]
pub struct ExtractedMdBuffers {
    pub particles: [Buffer; 2],
    pub params: Buffer,
    pub layout: ParticleLayout,
}

impl ExtractedMdBuffers {
    /// Buffer the renderer draws at step `t`, never the one step `t` reads.
    pub fn render_buffer(&self, t: u64) -> &Buffer {
        &self.particles[next_parity(t)]
    }
}

/// Host-visible copy target for the newest particle buffer.
/// `steps` holds how many steps the copied state has taken, 0 until a copy ran.
#[derive(Resource, Clone)]
pub struct ReadbackBuffer {
    pub buffer: Buffer,
    pub steps: Arc<AtomicU64>,
}

impl ReadbackBuffer {
    pub fn captured_steps(&self) -> u64 {
        self.steps.load(Ordering::SeqCst)
    }
}

/// Copy the render buffer into `ReadbackBuffer` on frames where this is set.
#[derive(Resource, Default, Clone, Copy)]
pub struct AllowCopy(pub bool);

#[derive(Resource, Clone)]
pub struct ExtractedReadback {
    pub readback: ReadbackBuffer,
    pub copy: bool,
}

/// Step counter `t`, lives in the render world next to the command encoder.
#[derive(Resource, Default, Clone, Copy, Debug)]
pub struct MdStepCounter(pub u64);

// =====================================================================

// ========================== systems ==================================

// Startup systems that have to run only once

/// Initial GPU records for `setup`. Only the two-buffer mode runs on the GPU,
/// and storage buffers cannot be empty, so both of those are errors.
pub fn seed_gpu_particles(setup: &MdSetup) -> Result<Vec<GPUParticle>, SimError> {
    if setup.mode != BufferMode::PingPong {
        return Err(SimError::UnsupportedMode(setup.mode));
    }
    let mut store = ParticleStore::with_capacity(setup.mode, setup.max_num_particles);
    let num_particles = store.seed(&setup.lattice(), &mut setup.rng())?;
    if num_particles == 0 {
        return Err(SimError::NoParticles);
    }
    Ok(store.frame(0).to_gpu(num_particles))
}

fn init_md_buffers(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    setup: Res<MdSetup>,
    params: Res<SimParams>,
) {
    let gpu_particles = match seed_gpu_particles(&setup) {
        Ok(particles) => particles,
        Err(e) => {
            error!("particle buffers not created: {}", e);
            return;
        }
    };
    let num_particles = gpu_particles.len();
    info!("created {} particles", num_particles);

    // both buffers start from the same state
    let layout = ParticleLayout::new(num_particles as u32);
    let buffers = ["particle_buffer_a", "particle_buffer_b"].map(|label| {
        render_device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&gpu_particles),
            usage: BufferUsages::STORAGE | BufferUsages::VERTEX | BufferUsages::COPY_SRC,
        })
    });
    commands.insert_resource(ParticleBuffers { buffers, layout });

    let readback = render_device.create_buffer(&BufferDescriptor {
        label: Some("particle_readback_buffer"),
        size: layout.buffer_size(),
        usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    commands.insert_resource(ReadbackBuffer { buffer: readback, steps: Arc::new(AtomicU64::new(0)) });

    let params_buffer = render_device.create_buffer_with_data(&BufferInitDescriptor {
        label: Some("sim_params_buffer"),
        contents: bytemuck::bytes_of(&params.to_gpu()),
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
    });
    commands.insert_resource(SimParamsBuffer { buffer: params_buffer });
}

fn init_md_bind_group_layout(mut commands: Commands, render_device: Res<RenderDevice>) {
    let storage = |binding, read_only| BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };
    let layout = render_device.create_bind_group_layout(
        Some("md_bind_group_layout"),
        &[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::COMPUTE,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            storage(1, true),
            storage(2, false),
        ],
    );
    commands.insert_resource(MdBindGroupLayout(layout));
}

// Update systems that have to run per frame

// whole block every time, only when the host changed something
pub fn upload_sim_params(
    params: Res<SimParams>,
    params_buffer: Option<Res<SimParamsBuffer>>,
    render_queue: Res<RenderQueue>,
) {
    let Some(params_buffer) = params_buffer else {
        return;
    };
    if !params.is_changed() {
        return;
    }
    render_queue.write_buffer(&params_buffer.buffer, 0, bytemuck::bytes_of(&params.to_gpu()));
    debug!("sim params uploaded: {:?}", *params);
}

// Extract systems that send from App to Render

fn extract_md_buffers(
    mut commands: Commands,
    particle_buffers: Extract<Option<Res<ParticleBuffers>>>,
    params_buffer: Extract<Option<Res<SimParamsBuffer>>>,
) {
    let (Some(particle_buffers), Some(params_buffer)) = (&*particle_buffers, &*params_buffer) else {
        return;
    };
    commands.insert_resource(ExtractedMdBuffers {
        particles: particle_buffers.buffers.clone(),
        params: params_buffer.buffer.clone(),
        layout: particle_buffers.layout,
    });
}

fn extract_readback(
    mut commands: Commands,
    readback: Extract<Option<Res<ReadbackBuffer>>>,
    allow_copy: Extract<Option<Res<AllowCopy>>>,
) {
    let Some(readback) = &*readback else {
        return;
    };
    commands.insert_resource(ExtractedReadback {
        readback: (**readback).clone(),
        copy: matches!(&*allow_copy, Some(allow) if allow.0),
    });
}

fn extract_bind_group_layout(mut commands: Commands, layout: Extract<Option<Res<MdBindGroupLayout>>>) {
    if let Some(layout) = &*layout {
        commands.insert_resource(MdBindGroupLayout(layout.0.clone()));
    }
}

// Prepare systems that run in Render

fn prepare_md_bind_groups(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    layout: Option<Res<MdBindGroupLayout>>,
    extracted: Option<Res<ExtractedMdBuffers>>,
    existing: Option<Res<MdBindGroups>>,
) {
    // buffers never change after startup
    if existing.is_some() {
        return;
    }
    let (Some(layout), Some(extracted)) = (layout, extracted) else {
        return;
    };

    let bind_groups = [0usize, 1].map(|i| {
        render_device.create_bind_group(
            Some("md_bind_group"),
            &layout.0,
            &[
                BindGroupEntry {
                    binding: 0,
                    resource: extracted.params.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: extracted.particles[i].as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: extracted.particles[(i + 1) % 2].as_entire_binding(),
                },
            ],
        )
    });
    commands.insert_resource(MdBindGroups(bind_groups));
}

// ++t once the frame's commands are recorded
fn advance_step_counter(
    mut counter: ResMut<MdStepCounter>,
    bind_groups: Option<Res<MdBindGroups>>,
    pipelines: Option<Res<MdPipelines>>,
) {
    if bind_groups.is_some() && pipelines.is_some() {
        counter.0 += 1;
    }
}

// =====================================================================

// Plugin

pub struct GpuMdPlugin;

impl Plugin for GpuMdPlugin {
    fn build(&self, app: &mut App) {
        // App
        app.init_resource::<SimParams>()
            .init_resource::<MdSetup>()
            .init_resource::<AllowCopy>()
            .add_systems(Startup, (init_md_buffers, init_md_bind_group_layout))
            .add_systems(Update, upload_sim_params);

        // Render
        let render_app = app.sub_app_mut(RenderApp);
        render_app
            .init_resource::<MdStepCounter>()
            .add_systems(ExtractSchedule, (extract_md_buffers, extract_readback, extract_bind_group_layout))
            .add_systems(
                Render,
                (
                    prepare_md_bind_groups.in_set(RenderSet::Prepare),
                    prepare_md_pipelines.in_set(RenderSet::Prepare),
                    advance_step_counter.in_set(RenderSet::Cleanup),
                ),
            );

        add_md_step_node_to_graph(render_app);
    }
}
