//! Spinning textured cube: uniforms, a sampled texture, depth and indexed draws.
//!
//! Run with: `cargo run -p zenith-demos --bin cube [-- path/to/texture.png]`
//!
//! Without a path the cube gets a generated checkerboard.

use ash::vk;
use zenith_demos::scene::{
    checkerboard, CubeUniforms, TexturedVertex, CUBE_INDICES, CUBE_VERTICES,
};
use zenith_demos::{run_demo, shaders, Demo, DemoConfig, DemoContext};
use zenith_gpu::{
    upload_indices, upload_vertices, CommandRecorder, DescriptorPool, DescriptorSetLayoutBuilder,
    GpuBuffer, IndexBuffer, RenderPipeline, RenderPipelineConfig, ShaderModule, ShaderProgram,
    ShaderStage, SpecializationConstants, Texture, TextureData, UniformBlock,
};

const TEXTURE_ENV: &str = "ZENITH_CUBE_TEXTURE";

struct Cube {
    pipeline: RenderPipeline,
    set_layout: vk::DescriptorSetLayout,
    descriptor_pool: DescriptorPool,
    descriptor_set: vk::DescriptorSet,
    uniforms: Option<UniformBlock<CubeUniforms>>,
    texture: Texture,
    vertices: GpuBuffer,
    indices: IndexBuffer,
}

/// Texture from the first argument or `ZENITH_CUBE_TEXTURE`, else a checkerboard.
fn load_texture() -> anyhow::Result<TextureData> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(TEXTURE_ENV).ok());

    match path {
        Some(path) => {
            tracing::info!("Loading cube texture from {path}");
            Ok(TextureData::load(path)?)
        }
        None => Ok(checkerboard(256, 8, [40, 40, 48, 255], [230, 230, 230, 255])?),
    }
}

impl Demo for Cube {
    fn init(ctx: &DemoContext) -> anyhow::Result<Self> {
        let device = ctx.gpu.device();

        let layout_builder = DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .sampled_image(1, vk::ShaderStageFlags::FRAGMENT);
        let set_layout = unsafe { layout_builder.build(device)? };
        let descriptor_pool = unsafe { DescriptorPool::for_layout(device, &layout_builder, 1)? };
        let descriptor_set = unsafe { descriptor_pool.allocate(device, &[set_layout])? }
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Descriptor pool returned no set"))?;

        let program = unsafe {
            let vert = ShaderModule::from_bytes(device, ShaderStage::Vertex, shaders::CUBE_VERT)?;
            let frag = ShaderModule::from_bytes(device, ShaderStage::Fragment, shaders::CUBE_FRAG)?;
            ShaderProgram::new(vec![vert, frag])?
        };
        let config = RenderPipelineConfig::default()
            .with_input(TexturedVertex::input())
            .with_cull_mode(vk::CullModeFlags::NONE)
            .with_specialization(
                ShaderStage::Fragment,
                SpecializationConstants::new().constant(0, 1u32),
            );
        let pipeline = unsafe {
            RenderPipeline::new(device, &ctx.render_pass, &program, &config, &[set_layout], &[])
        };
        unsafe { program.destroy(device) };
        let pipeline = pipeline?;

        let texture = unsafe { Texture::upload(&ctx.gpu, &ctx.command_pool, &load_texture()?)? };

        let (uniforms, vertices, indices) = {
            let mut allocator = ctx.gpu.allocator().lock();
            let initial = CubeUniforms::at(0.0, ctx.aspect_ratio(), true);
            (
                UniformBlock::with_value(&mut allocator, &initial, "cube uniforms")?,
                upload_vertices(&mut allocator, &CUBE_VERTICES, "cube vertices")?,
                upload_indices(&mut allocator, &CUBE_INDICES, "cube indices")?,
            )
        };

        unsafe {
            uniforms.write_descriptor(device, descriptor_set, 0);
            texture.write_descriptor(device, descriptor_set, 1);
        }

        Ok(Self {
            pipeline,
            set_layout,
            descriptor_pool,
            descriptor_set,
            uniforms: Some(uniforms),
            texture,
            vertices,
            indices,
        })
    }

    fn update(&mut self, ctx: &DemoContext, _dt: f32) {
        let value = CubeUniforms::at(ctx.elapsed, ctx.aspect_ratio(), true);
        if let Some(uniforms) = self.uniforms.as_mut() {
            if let Err(e) = uniforms.upload(&value) {
                tracing::warn!("Failed to update cube uniforms: {e}");
            }
        }
    }

    fn record(&mut self, _ctx: &DemoContext, recorder: &CommandRecorder<'_>) -> anyhow::Result<()> {
        unsafe {
            recorder.bind_pipeline(&self.pipeline);
            recorder.bind_descriptor_sets(&self.pipeline, &[self.descriptor_set]);
            recorder.bind_vertex_buffer(&self.vertices);
            recorder.bind_index_buffer(&self.indices);
            recorder.draw_indexed(self.indices.count);
        }
        Ok(())
    }

    fn cleanup(&mut self, ctx: &DemoContext) {
        let device = ctx.gpu.device();
        unsafe {
            self.pipeline.destroy(device);
            self.descriptor_pool.destroy(device);
            device.destroy_descriptor_set_layout(self.set_layout, None);
            if let Err(e) = self.texture.destroy(&ctx.gpu) {
                tracing::error!("Failed to free cube texture: {e}");
            }
        }

        let mut allocator = ctx.gpu.allocator().lock();
        let freed = self
            .uniforms
            .take()
            .map_or(Ok(()), |uniforms| uniforms.free(&mut allocator))
            .and_then(|()| allocator.free_buffer(&mut self.vertices))
            .and_then(|()| allocator.free_buffer(&mut self.indices.buffer));
        if let Err(e) = freed {
            tracing::error!("Failed to free cube buffers: {e}");
        }
    }
}

fn main() -> anyhow::Result<()> {
    let config = DemoConfig::new("Zenith Cube")
        .with_size(1024, 768)
        .with_depth(true)
        .with_clear_color([0.05, 0.05, 0.08, 1.0]);
    run_demo::<Cube>(config)
}
