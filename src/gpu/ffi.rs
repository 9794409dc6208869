use std::mem::{offset_of, size_of};

use bevy::render::render_resource::{
    BufferAddress, VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode,
};
use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GPUParticle {
    // not using glam to make sure WGSL compatibility
    // vec3<f32> aligns to 16 bytes in storage buffers, hence the padding
    pub pos: [f32; 3],
    pub _pad0: f32,
    pub vel: [f32; 3],
    pub _pad1: f32,
    pub _reserved: [f32; 4],
}

impl GPUParticle {
    pub fn new(pos: [f32; 3], vel: [f32; 3]) -> Self {
        Self { pos, vel, ..Zeroable::zeroed() }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GPUSimParams {
    pub delta_t: f32,
    pub epsilon: f32,
    pub sigma: f32,
    pub cutoff: f32,
}

/// Where position and velocity sit inside one particle record. The compute
/// kernels and the instanced vertex input read the same buffer, so both take
/// their offsets from here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParticleLayout {
    pub stride: u64,
    pub position_offset: u64,
    pub velocity_offset: u64,
    pub num_particles: u32,
}

impl ParticleLayout {
    pub fn new(num_particles: u32) -> Self {
        Self {
            stride: size_of::<GPUParticle>() as u64,
            position_offset: offset_of!(GPUParticle, pos) as u64,
            velocity_offset: offset_of!(GPUParticle, vel) as u64,
            num_particles,
        }
    }

    pub fn buffer_size(&self) -> u64 {
        self.stride * self.num_particles as u64
    }

    /// Per-instance attributes: location 0 position, location 1 velocity.
    pub fn vertex_buffer_layout(&self) -> VertexBufferLayout {
        VertexBufferLayout {
            array_stride: self.stride as BufferAddress,
            step_mode: VertexStepMode::Instance,
            attributes: vec![
                VertexAttribute {
                    format: VertexFormat::Float32x3,
                    offset: self.position_offset,
                    shader_location: 0,
                },
                VertexAttribute {
                    format: VertexFormat::Float32x3,
                    offset: self.velocity_offset,
                    shader_location: 1,
                },
            ],
        }
    }
}
