//! `Demo` trait and the state every demo can reach.

use std::sync::Arc;

use ash::vk;
use winit::window::Window;
use zenith_gpu::{
    CommandPool, CommandRecorder, DepthBuffer, FrameSyncManager, GpuContext, Presentable,
    RenderPass, SwapchainConfig,
};

/// A windowed demo driven by [`crate::run_demo`].
pub trait Demo: Sized {
    /// Create pipelines and resources. The render pass already exists.
    fn init(ctx: &DemoContext) -> anyhow::Result<Self>;

    /// Advance animation state. `dt` is in seconds.
    #[allow(unused_variables)]
    fn update(&mut self, ctx: &DemoContext, dt: f32) {}

    /// Record draws into the active render pass.
    fn record(&mut self, ctx: &DemoContext, recorder: &CommandRecorder<'_>) -> anyhow::Result<()>;

    /// Called after the swapchain and framebuffers were rebuilt.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &DemoContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Destroy the demo's resources. The device is idle.
    fn cleanup(&mut self, ctx: &DemoContext);
}

/// Window, device and per-frame objects shared with the demo.
pub struct DemoContext {
    pub gpu: GpuContext,
    pub presentable: Presentable,
    pub swapchain_config: SwapchainConfig,
    pub render_pass: RenderPass,
    pub depth: Option<DepthBuffer>,
    /// Pool on the graphics family, also usable for one-shot uploads.
    pub command_pool: CommandPool,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub sync: FrameSyncManager,
    pub clear_color: [f32; 4],
    /// Seconds since the demo started.
    pub elapsed: f32,
    // Dropped after the instance and its surface
    pub window: Arc<Window>,
}

impl DemoContext {
    pub const fn extent(&self) -> vk::Extent2D {
        self.presentable.extent()
    }

    /// Width over height of the swapchain, 1.0 while minimized.
    pub fn aspect_ratio(&self) -> f32 {
        aspect_ratio(self.extent())
    }

    /// Release everything the context created. The device must be idle.
    ///
    /// # Safety
    /// Nothing may still use the resources.
    pub(crate) unsafe fn destroy(&mut self) {
        let device = self.gpu.device();
        unsafe {
            self.sync.destroy(device);
            self.command_pool.destroy(device);
            self.render_pass.destroy(device);
        }
        if let Some(mut depth) = self.depth.take() {
            if let Err(e) = unsafe { depth.destroy(&self.gpu) } {
                tracing::error!("Failed to free depth buffer: {e}");
            }
        }
        unsafe { self.presentable.destroy(self.gpu.device()) };
    }
}

pub(crate) fn aspect_ratio(extent: vk::Extent2D) -> f32 {
    if extent.height == 0 {
        1.0
    } else {
        extent.width as f32 / extent.height as f32
    }
}
