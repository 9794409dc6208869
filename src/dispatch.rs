// kernel names, their fixed order within a step, and batch sizing

/// Invocations per workgroup, must match `@workgroup_size` in `md_update.wgsl`.
pub const WORKGROUP_SIZE: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    UpdateVelocities,
    UpdatePositions,
    CalculateForces,
}

/// Order every step issues its kernels in. Each one sees all writes of the one before.
pub const STEP_ORDER: [Kernel; 3] = [
    Kernel::UpdateVelocities,
    Kernel::UpdatePositions,
    Kernel::CalculateForces,
];

impl Kernel {
    /// WGSL entry point
    pub fn entry_point(self) -> &'static str {
        match self {
            Kernel::UpdateVelocities => "updateVelocities",
            Kernel::UpdatePositions => "updatePositions",
            Kernel::CalculateForces => "calculateForces",
        }
    }
}

/// How many workgroups cover `num_particles`, i.e. `ceil(n / 64)`.
pub fn workgroup_count(num_particles: u32) -> u32 {
    num_particles.div_ceil(WORKGROUP_SIZE)
}

/// Buffer a step at counter `t` reads from.
pub fn current_parity(t: u64) -> usize {
    (t % 2) as usize
}

/// Buffer a step at counter `t` writes, and the one the renderer draws for frame `t`.
pub fn next_parity(t: u64) -> usize {
    ((t + 1) % 2) as usize
}
