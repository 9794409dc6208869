pub mod dispatch;
pub mod error;
pub mod params;

pub mod cpu {
    pub mod lattice;
    pub mod md3d;
    pub mod store;
}

pub mod gpu {
    pub mod ffi;
    pub mod buffers;
    pub mod pipeline;
}
