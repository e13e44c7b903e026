//! Vulkan device layer for the Zenith renderer.
//!
//! This crate provides:
//! - Instance and surface creation
//! - Physical device enumeration, scoring and selection
//! - Queue family resolution and logical device creation
//! - Swapchain, memory, command and sync helpers on top of the chosen device
//! - Render passes, graphics pipelines, vertex and index buffers
//! - Uniform blocks, textures and descriptor sets for drawing

pub mod backend;
pub mod capabilities;
pub mod command;
pub mod config;
pub mod context;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod formats;
pub mod geometry;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod queue;
pub mod render_pass;
pub mod scoring;
pub mod selection;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod uniform;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{AshBackend, DeviceBackend};
pub use capabilities::{enumerate_devices, DeviceClass, GpuVendor, PhysicalDeviceDescriptor};
pub use command::{execute_one_shot, CommandPool, CommandRecorder};
pub use config::{InstanceConfig, SwapchainConfig};
pub use context::GpuContext;
pub use descriptors::{DescriptorPool, DescriptorSetLayoutBuilder};
pub use device::{
    build_logical_device, create_logical_device, BoundQueue, BuildState, DeviceCreateConfig,
    LogicalDevice, LogicalDeviceBuilder,
};
pub use error::{GpuError, Result};
pub use geometry::{
    upload_indices, upload_vertices, IndexBuffer, IndexElement, IndexType, InputDescriptor,
    InputFormat,
};
pub use instance::{Surface, VulkanInstance};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{RenderPipeline, RenderPipelineConfig, ShaderProgram, SpecializationConstants};
pub use queue::{resolve_families, validate_families, QueueCapabilities, QueueFamilyRecord};
pub use render_pass::{
    AttachmentLayout, AttachmentOp, DepthBuffer, RenderAttachment, RenderPass, RenderPassLayout,
};
pub use scoring::{DefaultScorer, DeviceScorer, DEFAULT_SCORER};
pub use selection::{rank_devices, select_best_device, RankedDevice};
pub use shader::ShaderModule;
pub use swapchain::Presentable;
pub use sync::{FrameSync, FrameSyncManager};
pub use texture::{Texture, TextureData};
pub use uniform::UniformBlock;
pub use zenith_shaders::ShaderStage;
