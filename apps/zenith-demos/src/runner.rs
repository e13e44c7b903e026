//! Window, event loop and frame loop.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};
use zenith_gpu::command::submit;
use zenith_gpu::{
    CommandPool, CommandRecorder, DepthBuffer, FrameSyncManager, GpuContext, GpuError,
    InstanceConfig, Presentable, RenderAttachment, RenderPass, SwapchainConfig, VulkanInstance,
};

use crate::app::{Demo, DemoContext};

/// Window and render settings for a demo.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    /// Give the render pass a depth attachment.
    pub depth: bool,
    pub validation: bool,
    pub frames_in_flight: usize,
    pub clear_color: [f32; 4],
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            title: "Zenith".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            depth: false,
            validation: cfg!(debug_assertions),
            frames_in_flight: 2,
            clear_color: [0.02, 0.02, 0.04, 1.0],
        }
    }
}

impl DemoConfig {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub const fn with_depth(mut self, depth: bool) -> Self {
        self.depth = depth;
        self
    }

    pub const fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub const fn with_clear_color(mut self, clear_color: [f32; 4]) -> Self {
        self.clear_color = clear_color;
        self
    }

    fn instance_config(&self) -> InstanceConfig {
        InstanceConfig::new(&self.title).with_validation(self.validation)
    }

    fn swapchain_config(&self) -> SwapchainConfig {
        SwapchainConfig::default().with_vsync(self.vsync)
    }

    fn frame_count(&self) -> anyhow::Result<u32> {
        match u32::try_from(self.frames_in_flight) {
            Ok(0) | Err(_) => anyhow::bail!(
                "frames_in_flight must be between 1 and u32::MAX, got {}",
                self.frames_in_flight
            ),
            Ok(count) => Ok(count),
        }
    }
}

/// Open a window and run `D` until it is closed.
///
/// Sets up logging from `RUST_LOG`, defaulting to `info`.
pub fn run_demo<D: Demo + 'static>(config: DemoConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = DemoRunner::<D> {
        config,
        state: None,
        failure: None,
        _demo: PhantomData,
    };
    event_loop.run_app(&mut runner)?;

    match runner.failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct DemoRunner<D: Demo> {
    config: DemoConfig,
    state: Option<DemoState<D>>,
    /// First error that ended the event loop.
    failure: Option<anyhow::Error>,
    _demo: PhantomData<D>,
}

struct DemoState<D: Demo> {
    demo: D,
    ctx: DemoContext,
    last_frame: Instant,
    started: Instant,
    needs_recreate: bool,
    frame_count: u64,
}

impl<D: Demo + 'static> ApplicationHandler for DemoRunner<D> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match create_state::<D>(&self.config, event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Demo ready");
            }
            Err(e) => {
                error!("Failed to initialize demo: {e:#}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                if let Err(e) = state.render_frame() {
                    error!("Render error: {e:#}");
                    if let Some(mut state) = self.state.take() {
                        state.cleanup();
                    }
                    self.failure = Some(e);
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(_) => {
                if let Some(state) = &mut self.state {
                    state.needs_recreate = true;
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

fn create_state<D: Demo>(
    config: &DemoConfig,
    event_loop: &ActiveEventLoop,
) -> anyhow::Result<DemoState<D>> {
    let window_attrs = Window::default_attributes()
        .with_title(&config.title)
        .with_inner_size(PhysicalSize::new(config.width, config.height));
    let window = Arc::new(event_loop.create_window(window_attrs)?);

    let instance = VulkanInstance::with_window(
        &config.instance_config(),
        window.as_ref(),
        window_extent(window.inner_size()),
    )?;
    let gpu = GpuContext::new(instance)?;
    info!(
        "Rendering on {} ({:?})",
        gpu.descriptor().device_name,
        gpu.descriptor().device_type
    );

    let depth_format = if config.depth {
        Some(gpu.depth_format()?)
    } else {
        None
    };

    let swapchain_config = config.swapchain_config();
    let mut presentable = Presentable::new(&gpu, &swapchain_config)?;

    // Until `DemoContext` exists each failed step releases what came before
    let depth = if let Some(format) = depth_format {
        match DepthBuffer::new(&gpu, format, presentable.extent()) {
            Ok(depth) => Some(depth),
            Err(e) => {
                unsafe { presentable.destroy(gpu.device()) };
                return Err(e.into());
            }
        }
    } else {
        None
    };

    let render_pass = unsafe { create_render_pass(&gpu, &presentable, depth.as_ref()) };
    let mut render_pass = match render_pass {
        Ok(render_pass) => render_pass,
        Err(e) => {
            unsafe { release_partial(&gpu, &mut presentable, depth) };
            return Err(e.into());
        }
    };

    let frame_objects = unsafe { create_frame_objects(&gpu, config) };
    let (command_pool, command_buffers, sync) = match frame_objects {
        Ok(objects) => objects,
        Err(e) => {
            unsafe {
                render_pass.destroy(gpu.device());
                release_partial(&gpu, &mut presentable, depth);
            }
            return Err(e);
        }
    };

    let mut ctx = DemoContext {
        gpu,
        presentable,
        swapchain_config,
        render_pass,
        depth,
        command_pool,
        command_buffers,
        sync,
        clear_color: config.clear_color,
        elapsed: 0.0,
        window,
    };

    let demo = match D::init(&ctx) {
        Ok(demo) => demo,
        Err(e) => {
            if let Err(idle) = ctx.gpu.wait_idle() {
                error!("Failed to wait idle: {idle}");
            }
            unsafe { ctx.destroy() };
            return Err(e);
        }
    };

    let now = Instant::now();
    Ok(DemoState {
        demo,
        ctx,
        last_frame: now,
        started: now,
        needs_recreate: false,
        frame_count: 0,
    })
}

/// Color pass on the swapchain, with depth when `depth` is given.
///
/// # Safety
/// The swapchain must belong to the context's device.
unsafe fn create_render_pass(
    gpu: &GpuContext,
    presentable: &Presentable,
    depth: Option<&DepthBuffer>,
) -> zenith_gpu::Result<RenderPass> {
    let mut attachments = vec![RenderAttachment::color(presentable.format().format, 0)];
    if let Some(depth) = depth {
        attachments.push(RenderAttachment::depth(depth.image.format, 1));
    }

    unsafe {
        RenderPass::for_presentable(
            gpu.device(),
            &attachments,
            presentable,
            depth.map(|d| d.view),
        )
    }
}

/// Graphics command pool, one command buffer and one sync slot per frame.
///
/// # Safety
/// The context's device must be valid.
unsafe fn create_frame_objects(
    gpu: &GpuContext,
    config: &DemoConfig,
) -> anyhow::Result<(CommandPool, Vec<vk::CommandBuffer>, FrameSyncManager)> {
    let frames = config.frame_count()?;
    let device = gpu.device();
    let command_pool = unsafe { CommandPool::for_queue(device, gpu.graphics_queue()?)? };

    let created = unsafe {
        command_pool.allocate(device, frames).and_then(|buffers| {
            FrameSyncManager::new(device, config.frames_in_flight).map(|sync| (buffers, sync))
        })
    };
    match created {
        Ok((buffers, sync)) => Ok((command_pool, buffers, sync)),
        Err(e) => {
            unsafe { command_pool.destroy(device) };
            Err(e.into())
        }
    }
}

/// # Safety
/// Nothing may use the swapchain or the depth buffer.
unsafe fn release_partial(
    gpu: &GpuContext,
    presentable: &mut Presentable,
    depth: Option<DepthBuffer>,
) {
    if let Some(mut depth) = depth {
        if let Err(e) = unsafe { depth.destroy(gpu) } {
            error!("Failed to free depth buffer: {e}");
        }
    }
    unsafe { presentable.destroy(gpu.device()) };
}

fn window_extent(size: PhysicalSize<u32>) -> vk::Extent2D {
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}

impl<D: Demo> DemoState<D> {
    fn render_frame(&mut self) -> anyhow::Result<()> {
        if self.needs_recreate {
            self.recreate_swapchain()?;
        }
        let extent = self.ctx.extent();
        if extent.width == 0 || extent.height == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.ctx.elapsed = now.duration_since(self.started).as_secs_f32();

        let device = self.ctx.gpu.device();
        let frame = self.ctx.sync.current();
        unsafe { frame.wait(device)? };

        // This slot's previous frame no longer reads host-visible buffers
        self.demo.update(&self.ctx, dt);

        let image_index = match unsafe { self.ctx.presentable.acquire(frame.image_available) } {
            Ok((index, suboptimal)) => {
                self.needs_recreate |= suboptimal;
                index
            }
            Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR)) => {
                self.needs_recreate = true;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        unsafe { frame.reset(device)? };

        let cmd = self.ctx.command_buffers[self.ctx.sync.current_frame()];
        let recorder = unsafe { CommandRecorder::begin(device, cmd)? };
        unsafe {
            recorder.begin_render_pass(&self.ctx.render_pass, image_index, self.ctx.clear_color)?;
        }
        self.demo.record(&self.ctx, &recorder)?;
        unsafe { recorder.end_render_pass() };
        let cmd = unsafe { recorder.finish()? };

        let graphics = self.ctx.gpu.graphics_queue()?.queue;
        let present = self.ctx.gpu.present_queue()?.queue;
        unsafe {
            submit(
                device,
                graphics,
                cmd,
                &[(
                    frame.image_available,
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                )],
                &[frame.render_finished],
                frame.in_flight,
            )?;
        }

        let stale = unsafe {
            self.ctx
                .presentable
                .present(present, image_index, &[frame.render_finished])?
        };
        self.needs_recreate |= stale;

        self.ctx.sync.advance();
        self.frame_count += 1;
        Ok(())
    }

    fn recreate_swapchain(&mut self) -> anyhow::Result<()> {
        let extent = window_extent(self.ctx.window.inner_size());
        if extent.width == 0 || extent.height == 0 {
            // Minimized; try again once the window has a size
            return Ok(());
        }

        self.ctx.gpu.wait_idle()?;
        self.ctx.gpu.instance_mut().set_extent(extent);
        unsafe {
            self.ctx
                .presentable
                .recreate(&self.ctx.gpu, &self.ctx.swapchain_config)?;
        }

        if let Some(depth) = self.ctx.depth.as_mut() {
            let format = depth.image.format;
            unsafe { depth.destroy(&self.ctx.gpu)? };
            *depth = DepthBuffer::new(&self.ctx.gpu, format, self.ctx.presentable.extent())?;
        }

        let depth_view = self.ctx.depth.as_ref().map(|d| d.view);
        unsafe {
            self.ctx.render_pass.create_framebuffers(
                self.ctx.gpu.device(),
                &self.ctx.presentable,
                depth_view,
            )?;
        }

        self.needs_recreate = false;
        self.demo.on_resize(&self.ctx)?;

        let extent = self.ctx.extent();
        info!("Resized to {}x{}", extent.width, extent.height);
        Ok(())
    }

    fn cleanup(&mut self) {
        info!("Drew {} frames", self.frame_count);

        if let Err(e) = self.ctx.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }
        self.demo.cleanup(&self.ctx);
        unsafe { self.ctx.destroy() };

        info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builders() {
        let config = DemoConfig::new("Cube")
            .with_size(800, 600)
            .with_depth(true)
            .with_vsync(false)
            .with_clear_color([1.0, 0.0, 0.0, 1.0]);

        assert_eq!(config.title, "Cube");
        assert_eq!((config.width, config.height), (800, 600));
        assert!(config.depth);
        assert!(!config.swapchain_config().vsync);
        assert_eq!(config.instance_config().app_name, "Cube");
    }

    #[test]
    fn zero_frames_in_flight_is_rejected() {
        let mut config = DemoConfig::default();
        assert_eq!(config.frame_count().unwrap(), 2);

        config.frames_in_flight = 0;
        assert!(config.frame_count().is_err());
    }

    #[test]
    fn window_size_maps_to_extent() {
        let extent = window_extent(PhysicalSize::new(640, 480));
        assert_eq!(extent.width, 640);
        assert_eq!(extent.height, 480);
    }
}
