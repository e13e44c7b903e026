//! Colored triangle through the full render path.
//!
//! Run with: `cargo run -p zenith-demos --bin triangle`

use ash::vk;
use zenith_demos::scene::{ColorVertex, TRIANGLE};
use zenith_demos::{run_demo, shaders, Demo, DemoConfig, DemoContext};
use zenith_gpu::{
    upload_vertices, CommandRecorder, GpuBuffer, RenderPipeline, RenderPipelineConfig,
    ShaderModule, ShaderProgram, ShaderStage, SpecializationConstants,
};

/// Scales the vertex colors in the fragment shader.
const BRIGHTNESS: f32 = 0.9;

struct Triangle {
    pipeline: RenderPipeline,
    vertices: GpuBuffer,
}

impl Demo for Triangle {
    fn init(ctx: &DemoContext) -> anyhow::Result<Self> {
        let device = ctx.gpu.device();

        let program = unsafe {
            let vert =
                ShaderModule::from_bytes(device, ShaderStage::Vertex, shaders::TRIANGLE_VERT)?;
            let frag =
                ShaderModule::from_bytes(device, ShaderStage::Fragment, shaders::TRIANGLE_FRAG)?;
            ShaderProgram::new(vec![vert, frag])?
        };

        let config = RenderPipelineConfig::default()
            .with_input(ColorVertex::input())
            .with_cull_mode(vk::CullModeFlags::NONE)
            .with_specialization(
                ShaderStage::Fragment,
                SpecializationConstants::new().constant(0, BRIGHTNESS),
            );
        let pipeline =
            unsafe { RenderPipeline::new(device, &ctx.render_pass, &program, &config, &[], &[]) };
        unsafe { program.destroy(device) };
        let pipeline = pipeline?;

        let vertices = upload_vertices(&mut ctx.gpu.allocator().lock(), &TRIANGLE, "triangle");
        match vertices {
            Ok(vertices) => Ok(Self { pipeline, vertices }),
            Err(e) => {
                unsafe { pipeline.destroy(device) };
                Err(e.into())
            }
        }
    }

    fn record(&mut self, _ctx: &DemoContext, recorder: &CommandRecorder<'_>) -> anyhow::Result<()> {
        unsafe {
            recorder.bind_pipeline(&self.pipeline);
            recorder.bind_vertex_buffer(&self.vertices);
            recorder.draw(TRIANGLE.len() as u32);
        }
        Ok(())
    }

    fn cleanup(&mut self, ctx: &DemoContext) {
        unsafe { self.pipeline.destroy(ctx.gpu.device()) };
        if let Err(e) = ctx.gpu.allocator().lock().free_buffer(&mut self.vertices) {
            tracing::error!("Failed to free triangle vertices: {e}");
        }
    }
}

fn main() -> anyhow::Result<()> {
    run_demo::<Triangle>(DemoConfig::new("Zenith Triangle").with_size(800, 600))
}
