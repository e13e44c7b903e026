//! Shader modules.

use crate::error::Result;
use ash::vk;
use std::ffi::CStr;
use zenith_shaders::{validate_spirv, ShaderStage};

/// Entry point every module is expected to export.
pub const ENTRY_POINT: &CStr = c"main";

/// Pipeline stage flag for a shader stage.
pub const fn stage_flags(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
    }
}

/// A created shader module and the stage it targets.
pub struct ShaderModule {
    pub module: vk::ShaderModule,
    pub stage: ShaderStage,
}

impl ShaderModule {
    /// Create a module from SPIR-V words.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn from_spirv(
        device: &ash::Device,
        stage: ShaderStage,
        code: &[u32],
    ) -> Result<Self> {
        validate_spirv(code)?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe { device.create_shader_module(&create_info, None)? };

        Ok(Self { module, stage })
    }

    /// Create a module from a SPIR-V file's bytes.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn from_bytes(
        device: &ash::Device,
        stage: ShaderStage,
        bytes: &[u8],
    ) -> Result<Self> {
        let words = zenith_shaders::spirv_from_bytes(bytes)?;
        unsafe { Self::from_spirv(device, stage, &words) }
    }

    /// Compile GLSL and create a module from the result.
    ///
    /// # Safety
    /// The device must be valid.
    #[cfg(feature = "glsl")]
    pub unsafe fn from_glsl(
        device: &ash::Device,
        compiler: &zenith_shaders::GlslCompiler,
        stage: ShaderStage,
        source: &str,
        name: &str,
    ) -> Result<Self> {
        let words = compiler.compile(source, stage, name)?;
        unsafe { Self::from_spirv(device, stage, &words) }
    }

    /// Stage info for pipeline creation, using [`ENTRY_POINT`].
    pub fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(stage_flags(self.stage))
            .module(self.module)
            .name(ENTRY_POINT)
    }

    /// # Safety
    /// The module must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_shader_module(self.module, None) };
    }
}
