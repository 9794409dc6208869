// errors of the simulation core; numeric inputs are trusted

use std::fmt;

use crate::cpu::store::BufferMode;

#[derive(Debug)]
pub enum SimError {
    /// The CPU worker pool could not be created.
    ThreadPool(rayon::ThreadPoolBuildError),
    /// A lattice needs more slots than the store was allocated with.
    Capacity { required: usize, capacity: usize },
    /// The lattice holds no particles; GPU storage buffers cannot be empty.
    NoParticles,
    /// The GPU path only runs the two-buffer store.
    UnsupportedMode(BufferMode),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::ThreadPool(e) => write!(f, "Failed to start compute workers: {}", e),
            SimError::Capacity { required, capacity } => write!(
                f,
                "Lattice needs {} particles but the store holds at most {}",
                required, capacity
            ),
            SimError::NoParticles => {
                write!(f, "Lattice is smaller than one unit cell, no particles to simulate")
            }
            SimError::UnsupportedMode(mode) => {
                write!(f, "Buffer mode {:?} is not available on the GPU", mode)
            }
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::ThreadPool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for SimError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        SimError::ThreadPool(e)
    }
}
