//! Graphics pipeline creation.

use crate::error::{GpuError, Result};
use crate::geometry::InputDescriptor;
use crate::render_pass::RenderPass;
use crate::shader::{stage_flags, ShaderModule, ENTRY_POINT};
use ash::vk;
use bytemuck::Pod;
use zenith_shaders::ShaderStage;

/// Shader modules making up one pipeline, at most one per stage.
pub struct ShaderProgram {
    modules: Vec<ShaderModule>,
}

impl ShaderProgram {
    pub fn new(modules: Vec<ShaderModule>) -> Result<Self> {
        if modules.is_empty() {
            return Err(GpuError::PipelineCreation(
                "Shader program has no modules".to_string(),
            ));
        }

        for (i, module) in modules.iter().enumerate() {
            if modules[..i].iter().any(|m| m.stage == module.stage) {
                return Err(GpuError::PipelineCreation(format!(
                    "Shader program has two {:?} modules",
                    module.stage
                )));
            }
        }

        Ok(Self { modules })
    }

    pub fn modules(&self) -> &[ShaderModule] {
        &self.modules
    }

    /// Destroy every module.
    ///
    /// The modules can go as soon as the pipelines using them are created.
    ///
    /// # Safety
    /// No pipeline creation may be using the modules.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        for module in &self.modules {
            unsafe { module.destroy(device) };
        }
    }
}

/// Specialization constant values for one shader stage.
#[derive(Debug, Clone, Default)]
pub struct SpecializationConstants {
    entries: Vec<vk::SpecializationMapEntry>,
    data: Vec<u8>,
}

impl SpecializationConstants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set constant `id`. Setting the same id again replaces the value.
    pub fn constant<T: Pod>(mut self, id: u32, value: T) -> Self {
        let bytes = bytemuck::bytes_of(&value);
        self.entries.retain(|entry| entry.constant_id != id);
        self.entries.push(
            vk::SpecializationMapEntry::default()
                .constant_id(id)
                .offset(self.data.len() as u32)
                .size(bytes.len()),
        );
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[vk::SpecializationMapEntry] {
        &self.entries
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn info(&self) -> vk::SpecializationInfo<'_> {
        vk::SpecializationInfo::default()
            .map_entries(&self.entries)
            .data(&self.data)
    }
}

/// Fixed-function state and inputs of a graphics pipeline.
#[derive(Debug, Clone)]
pub struct RenderPipelineConfig {
    pub input: InputDescriptor,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    /// Only applies when the render pass has a depth attachment.
    pub depth_test: bool,
    pub depth_write: bool,
    /// Standard alpha blending on the color attachment.
    pub alpha_blend: bool,
    pub specialization: Vec<(ShaderStage, SpecializationConstants)>,
}

impl Default for RenderPipelineConfig {
    fn default() -> Self {
        Self {
            input: InputDescriptor::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
            alpha_blend: false,
            specialization: Vec::new(),
        }
    }
}

impl RenderPipelineConfig {
    pub fn with_input(mut self, input: InputDescriptor) -> Self {
        self.input = input;
        self
    }

    pub const fn with_cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub const fn with_front_face(mut self, front_face: vk::FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    pub const fn with_alpha_blend(mut self, alpha_blend: bool) -> Self {
        self.alpha_blend = alpha_blend;
        self
    }

    /// Specialize `stage`. A later call for the same stage replaces it.
    pub fn with_specialization(
        mut self,
        stage: ShaderStage,
        constants: SpecializationConstants,
    ) -> Self {
        self.specialization.retain(|(s, _)| *s != stage);
        self.specialization.push((stage, constants));
        self
    }

    pub fn specialization_for(&self, stage: ShaderStage) -> Option<&SpecializationConstants> {
        self.specialization
            .iter()
            .find(|(s, constants)| *s == stage && !constants.is_empty())
            .map(|(_, constants)| constants)
    }

    /// Blend state of the single color attachment.
    pub fn color_blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        if !self.alpha_blend {
            return state.blend_enable(false);
        }

        state
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
    }
}

/// Graphics pipeline and its layout, bound to subpass 0 of a render pass.
pub struct RenderPipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl RenderPipeline {
    /// Create a pipeline with dynamic viewport and scissor.
    ///
    /// # Safety
    /// The device must be valid and own the render pass and modules.
    pub unsafe fn new(
        device: &ash::Device,
        render_pass: &RenderPass,
        program: &ShaderProgram,
        config: &RenderPipelineConfig,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let specialization: Vec<_> = program
            .modules()
            .iter()
            .map(|module| config.specialization_for(module.stage).map(|c| c.info()))
            .collect();

        let stages: Vec<_> = program
            .modules()
            .iter()
            .zip(&specialization)
            .map(|(module, info)| {
                let stage = vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage_flags(module.stage))
                    .module(module.module)
                    .name(ENTRY_POINT);
                match info {
                    Some(info) => stage.specialization_info(info),
                    None => stage,
                }
            })
            .collect();

        let bindings = if config.input.is_empty() {
            Vec::new()
        } else {
            vec![config.input.binding_description()]
        };
        let attributes = config.input.attribute_descriptions()?;
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let depth_enabled = render_pass.has_depth();
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth_enabled && config.depth_test)
            .depth_write_enable(depth_enabled && config.depth_write)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [config.color_blend_attachment()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .map_err(|e| GpuError::PipelineCreation(e.to_string()))?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass.handle())
            .subpass(0);

        let created = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        let pipeline = match created {
            Ok(pipelines) => pipelines.into_iter().next(),
            Err((_, e)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(GpuError::PipelineCreation(e.to_string()));
            }
        };
        let Some(pipeline) = pipeline else {
            unsafe { device.destroy_pipeline_layout(layout, None) };
            return Err(GpuError::PipelineCreation(
                "Driver returned no pipeline".to_string(),
            ));
        };

        tracing::debug!("Created graphics pipeline with {} stage(s)", stages.len());

        Ok(Self { pipeline, layout })
    }

    pub const fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub const fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Destroy the pipeline.
    ///
    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
