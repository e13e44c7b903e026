//! SPIR-V compiled by the build script.

pub const TRIANGLE_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle.vert.spv"));
pub const TRIANGLE_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle.frag.spv"));
pub const CUBE_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/cube.vert.spv"));
pub const CUBE_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/cube.frag.spv"));
