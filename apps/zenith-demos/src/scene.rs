//! Vertex data and uniforms for the demos.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use zenith_gpu::{InputDescriptor, InputFormat, TextureData};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ColorVertex {
    pub position: [f32; 2],
    pub color: [f32; 3],
}

impl ColorVertex {
    pub fn input() -> InputDescriptor {
        InputDescriptor::new()
            .item(0, InputFormat::Vector2)
            .item(1, InputFormat::Vector3)
    }
}

pub const TRIANGLE: [ColorVertex; 3] = [
    ColorVertex {
        position: [0.0, -0.5],
        color: [1.0, 0.0, 0.0],
    },
    ColorVertex {
        position: [0.5, 0.5],
        color: [0.0, 1.0, 0.0],
    },
    ColorVertex {
        position: [-0.5, 0.5],
        color: [0.0, 0.0, 1.0],
    },
];

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct TexturedVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
    pub uv: [f32; 2],
}

impl TexturedVertex {
    pub fn input() -> InputDescriptor {
        InputDescriptor::new()
            .item(0, InputFormat::Vector3)
            .item(1, InputFormat::Color)
            .item(2, InputFormat::Vector2)
    }
}

const fn textured(position: [f32; 3], color: [f32; 3], uv: [f32; 2]) -> TexturedVertex {
    TexturedVertex {
        position,
        color: [color[0], color[1], color[2], 1.0],
        uv,
    }
}

/// Corners of a unit cube centred on the origin.
pub const CUBE_VERTICES: [TexturedVertex; 8] = [
    textured([-0.5, -0.5, 0.5], [1.0, 0.0, 0.0], [0.0, 0.0]),
    textured([0.5, -0.5, 0.5], [0.0, 1.0, 0.0], [1.0, 0.0]),
    textured([0.5, 0.5, 0.5], [0.0, 0.0, 1.0], [1.0, 1.0]),
    textured([-0.5, 0.5, 0.5], [1.0, 1.0, 0.0], [0.0, 1.0]),
    textured([-0.5, -0.5, -0.5], [1.0, 0.0, 1.0], [1.0, 0.0]),
    textured([0.5, -0.5, -0.5], [0.0, 1.0, 1.0], [0.0, 0.0]),
    textured([0.5, 0.5, -0.5], [1.0, 1.0, 1.0], [0.0, 1.0]),
    textured([-0.5, 0.5, -0.5], [0.5, 0.5, 0.5], [1.0, 1.0]),
];

/// Two triangles per face.
pub const CUBE_INDICES: [u16; 36] = [
    0, 1, 2, 2, 3, 0, // front
    1, 5, 6, 6, 2, 1, // right
    5, 4, 7, 7, 6, 5, // back
    4, 0, 3, 3, 7, 4, // left
    3, 2, 6, 6, 7, 3, // top
    4, 5, 1, 1, 0, 4, // bottom
];

/// Matches `CubeUniforms` in `cube.vert` under std140.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CubeUniforms {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
    pub time: f32,
    pub textured: u32,
    pub _pad: [f32; 2],
}

impl CubeUniforms {
    /// Cube spun around Y by `time`, seen from (2, 2, 2).
    pub fn at(time: f32, aspect_ratio: f32, textured: bool) -> Self {
        let model = Mat4::from_rotation_y(time * 90f32.to_radians());
        let view = Mat4::look_at_rh(Vec3::splat(2.0), Vec3::ZERO, Vec3::Y);
        let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect_ratio, 0.1, 10.0);
        // Vulkan clip space points Y down
        proj.y_axis.y *= -1.0;

        Self {
            model,
            view,
            proj,
            time,
            textured: u32::from(textured),
            _pad: [0.0; 2],
        }
    }
}

/// Square checkerboard of two colors, `cells` squares per side.
pub fn checkerboard(
    size: u32,
    cells: u32,
    dark: [u8; 4],
    light: [u8; 4],
) -> zenith_gpu::Result<TextureData> {
    let cell = (size / cells.max(1)).max(1);
    let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
    for y in 0..size {
        for x in 0..size {
            let color = if (x / cell + y / cell) % 2 == 0 { light } else { dark };
            pixels.extend_from_slice(&color);
        }
    }

    TextureData::from_rgba8(size, size, pixels)
}
