/* render graph node running one MD step per frame, following
https://github.com/bevyengine/bevy/blob/main/examples/shader/compute_shader_game_of_life.rs */

use std::borrow::Cow;
use std::sync::atomic::Ordering;

use bevy::prelude::*;
use bevy::render::graph::CameraDriverLabel;
use bevy::render::render_graph::{
    Node, NodeRunError, RenderGraph, RenderGraphContext, RenderLabel,
};
use bevy::render::render_resource::{
    CachedComputePipelineId, CachedPipelineState, ComputePassDescriptor, ComputePipeline,
    ComputePipelineDescriptor, PipelineCache, PushConstantRange, ShaderDefVal,
};
use bevy::render::renderer::RenderContext;

use crate::dispatch::{STEP_ORDER, current_parity, workgroup_count};
use crate::gpu::buffers::{
    ExtractedMdBuffers, ExtractedReadback, MdBindGroupLayout, MdBindGroups, MdStepCounter,
};

const SHADER_ASSET_PATH: &str = "shaders/md_update.wgsl";

/// Compiled kernels, indexed like `STEP_ORDER`.
#[derive(Resource)]
pub struct MdPipelines(pub [ComputePipeline; 3]);

#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub struct MdStepLabel;

#[derive(Default)]
struct MdStepNode;

impl Node for MdStepNode {
    fn run(
        &self,
        _graph: &mut RenderGraphContext,
        render_context: &mut RenderContext,
        world: &World,
    ) -> Result<(), NodeRunError> {
        // nothing to run until buffers and pipelines exist
        let Some(pipelines) = world.get_resource::<MdPipelines>() else { return Ok(()); };
        let Some(bind_groups) = world.get_resource::<MdBindGroups>() else { return Ok(()); };
        let Some(extracted) = world.get_resource::<ExtractedMdBuffers>() else { return Ok(()); };
        let t = world.get_resource::<MdStepCounter>().map_or(0, |c| c.0);

        let workgroups = workgroup_count(extracted.layout.num_particles);
        let bind_group = &bind_groups.0[current_parity(t)];

        // one pass per kernel so each sees the previous one's writes
        for (pipeline, kernel) in pipelines.0.iter().zip(STEP_ORDER) {
            let mut pass = render_context
                .command_encoder()
                .begin_compute_pass(&ComputePassDescriptor {
                    label: Some(kernel.entry_point()),
                    ..default()
                });

            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }

        // hand the state this step produced to the host
        if let Some(readback) = world.get_resource::<ExtractedReadback>() {
            if readback.copy {
                render_context.command_encoder().copy_buffer_to_buffer(
                    extracted.render_buffer(t),
                    0,
                    &readback.readback.buffer,
                    0,
                    extracted.layout.buffer_size(),
                );
                readback.readback.steps.store(t + 1, Ordering::SeqCst);
            }
        }

        Ok(())
    }
}

pub fn prepare_md_pipelines(
    mut commands: Commands,
    pipeline_cache: Res<PipelineCache>,
    layout: Option<Res<MdBindGroupLayout>>,
    mut pipeline_ids: Local<Option<[CachedComputePipelineId; 3]>>,
    existing: Option<Res<MdPipelines>>,
    assets: Res<AssetServer>,
) {
    if existing.is_some() {
        return;
    }
    let Some(layout) = layout else {
        return;
    };

    let Some(ids) = *pipeline_ids else {
        let shader: Handle<Shader> = assets.load(SHADER_ASSET_PATH);
        let ids = STEP_ORDER.map(|kernel| {
            pipeline_cache.queue_compute_pipeline(ComputePipelineDescriptor {
                label: Some(format!("md_{}_pipeline", kernel.entry_point()).into()),
                layout: vec![layout.0.clone()],
                push_constant_ranges: Vec::<PushConstantRange>::new(),
                shader: shader.clone(),
                shader_defs: Vec::<ShaderDefVal>::new(),
                entry_point: Cow::from(kernel.entry_point()),
                zero_initialize_workgroup_memory: false,
            })
        });
        *pipeline_ids = Some(ids);
        info!("md pipelines QUEUED");
        return; // waits for compilation
    };

    let mut ready = Vec::with_capacity(ids.len());
    for id in ids {
        match pipeline_cache.get_compute_pipeline_state(id) {
            CachedPipelineState::Ok(_) => {
                if let Some(pipeline) = pipeline_cache.get_compute_pipeline(id) {
                    ready.push(pipeline.clone());
                }
            }
            // a kernel that does not compile ends the simulation
            CachedPipelineState::Err(err) => panic!("Initializing {SHADER_ASSET_PATH}:\n{err}"),
            _ => return,
        }
    }

    if let Ok(pipelines) = <[ComputePipeline; 3]>::try_from(ready) {
        commands.insert_resource(MdPipelines(pipelines));
        info!("md pipelines READY");
    }
}

pub fn add_md_step_node_to_graph(render_app: &mut bevy::app::SubApp) {
    let mut graph = render_app.world_mut().resource_mut::<RenderGraph>();
    graph.add_node(MdStepLabel, MdStepNode::default());
    graph.add_node_edge(MdStepLabel, CameraDriverLabel);
}
