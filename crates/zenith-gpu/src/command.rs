//! Command pools, recording and submission.

use crate::device::BoundQueue;
use crate::error::{GpuError, Result};
use crate::geometry::IndexBuffer;
use crate::memory::GpuBuffer;
use crate::pipeline::RenderPipeline;
use crate::render_pass::RenderPass;
use ash::vk;

/// Command pool tied to one queue family.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.create_command_pool(&create_info, None)? };

        Ok(Self { pool, queue_family })
    }

    /// Create a pool for the family of `queue`.
    ///
    /// # Safety
    /// `queue` must come from `device`.
    pub unsafe fn for_queue(device: &ash::Device, queue: &BoundQueue) -> Result<Self> {
        unsafe { Self::new(device, queue.family.index) }
    }

    pub const fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    pub const fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate `count` primary command buffers.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate(
        &self,
        device: &ash::Device,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        Ok(unsafe { device.allocate_command_buffers(&alloc_info)? })
    }

    /// Allocate a single primary command buffer.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_one(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        unsafe { self.allocate(device, 1) }?
            .pop()
            .ok_or_else(|| GpuError::Other("Driver returned no command buffer".to_string()))
    }

    /// Destroy the command pool.
    ///
    /// # Safety
    /// The pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_command_pool(self.pool, None) };
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    unsafe { device.begin_command_buffer(cmd, &begin_info)? };
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    unsafe { device.end_command_buffer(cmd)? };
    Ok(())
}

/// Submit one command buffer, waiting on and signalling semaphores.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn submit(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    wait: &[(vk::Semaphore, vk::PipelineStageFlags)],
    signal: &[vk::Semaphore],
    fence: vk::Fence,
) -> Result<()> {
    let (wait_semaphores, wait_stages): (Vec<_>, Vec<_>) = wait.iter().copied().unzip();
    let command_buffers = [cmd];

    let submit_info = vk::SubmitInfo::default()
        .command_buffers(&command_buffers)
        .wait_semaphores(&wait_semaphores)
        .wait_dst_stage_mask(&wait_stages)
        .signal_semaphores(signal);

    unsafe { device.queue_submit(queue, &[submit_info], fence)? };
    Ok(())
}

/// Device calls behind [`execute_one_shot`].
pub trait OneShotCommands {
    /// # Safety
    /// The pool must belong to this device.
    unsafe fn allocate_command_buffer(&self, pool: &CommandPool) -> Result<vk::CommandBuffer>;

    /// # Safety
    /// `cmd` must be in the initial state.
    unsafe fn begin_one_time(&self, cmd: vk::CommandBuffer) -> Result<()>;

    /// # Safety
    /// `cmd` must be recording.
    unsafe fn end_recording(&self, cmd: vk::CommandBuffer) -> Result<()>;

    /// Submit `cmd` and block until `queue` is idle.
    ///
    /// # Safety
    /// `cmd` must be executable and `queue` must belong to this device.
    unsafe fn submit_and_wait(&self, queue: vk::Queue, cmd: vk::CommandBuffer) -> Result<()>;

    /// # Safety
    /// `cmd` must come from `pool` and not be pending.
    unsafe fn free_command_buffer(&self, pool: &CommandPool, cmd: vk::CommandBuffer);
}

impl OneShotCommands for ash::Device {
    unsafe fn allocate_command_buffer(&self, pool: &CommandPool) -> Result<vk::CommandBuffer> {
        unsafe { pool.allocate_one(self) }
    }

    unsafe fn begin_one_time(&self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe { begin_command_buffer(self, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT) }
    }

    unsafe fn end_recording(&self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe { end_command_buffer(self, cmd) }
    }

    unsafe fn submit_and_wait(&self, queue: vk::Queue, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe {
            submit(self, queue, cmd, &[], &[], vk::Fence::null())?;
            self.queue_wait_idle(queue)?;
        }
        Ok(())
    }

    unsafe fn free_command_buffer(&self, pool: &CommandPool, cmd: vk::CommandBuffer) {
        unsafe { self.free_command_buffers(pool.handle(), &[cmd]) };
    }
}

/// Record `f` into a fresh command buffer, submit it and wait for the queue.
///
/// The buffer is freed whatever happens after allocation, and the first
/// failing step's error is returned. `f` only runs once recording has begun.
///
/// # Safety
/// All handles must be valid and `queue` must belong to the pool's family.
pub unsafe fn execute_one_shot<D, F>(
    device: &D,
    pool: &CommandPool,
    queue: vk::Queue,
    f: F,
) -> Result<()>
where
    D: OneShotCommands + ?Sized,
    F: FnOnce(vk::CommandBuffer),
{
    let cmd = unsafe { device.allocate_command_buffer(pool)? };

    let result = unsafe {
        device
            .begin_one_time(cmd)
            .and_then(|()| {
                f(cmd);
                device.end_recording(cmd)
            })
            .and_then(|()| device.submit_and_wait(queue, cmd))
    };

    unsafe { device.free_command_buffer(pool, cmd) };
    result
}

/// Viewport covering `extent`, depth range 0 to 1.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport::default()
        .width(extent.width as f32)
        .height(extent.height as f32)
        .min_depth(0.0)
        .max_depth(1.0)
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D::default().extent(extent)
}

/// Draw recording on one primary command buffer.
pub struct CommandRecorder<'a> {
    device: &'a ash::Device,
    cmd: vk::CommandBuffer,
}

impl<'a> CommandRecorder<'a> {
    /// Reset `cmd` and begin a one-time-submit recording.
    ///
    /// # Safety
    /// `cmd` must come from a resettable pool on `device` and not be pending.
    pub unsafe fn begin(device: &'a ash::Device, cmd: vk::CommandBuffer) -> Result<Self> {
        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        }
        Ok(Self { device, cmd })
    }

    pub const fn handle(&self) -> vk::CommandBuffer {
        self.cmd
    }

    /// Begin `render_pass` on the framebuffer of `image_index` and set the
    /// viewport and scissor to the pass extent.
    ///
    /// # Safety
    /// The render pass must belong to the recorder's device.
    pub unsafe fn begin_render_pass(
        &self,
        render_pass: &RenderPass,
        image_index: u32,
        clear_color: [f32; 4],
    ) -> Result<()> {
        let framebuffer = render_pass.framebuffer(image_index)?;
        let extent = render_pass.extent();
        let clear_values = render_pass.layout().clear_values(clear_color);

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass.handle())
            .framebuffer(framebuffer)
            .render_area(full_scissor(extent))
            .clear_values(&clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(self.cmd, &begin_info, vk::SubpassContents::INLINE);
            self.device
                .cmd_set_viewport(self.cmd, 0, &[full_viewport(extent)]);
            self.device.cmd_set_scissor(self.cmd, 0, &[full_scissor(extent)]);
        }
        Ok(())
    }

    /// # Safety
    /// A render pass must be active.
    pub unsafe fn end_render_pass(&self) {
        unsafe { self.device.cmd_end_render_pass(self.cmd) };
    }

    /// # Safety
    /// The pipeline must be compatible with the active render pass.
    pub unsafe fn bind_pipeline(&self, pipeline: &RenderPipeline) {
        unsafe {
            self.device.cmd_bind_pipeline(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.handle(),
            );
        }
    }

    /// Bind `sets` starting at set 0.
    ///
    /// # Safety
    /// The sets must match the pipeline's layout.
    pub unsafe fn bind_descriptor_sets(
        &self,
        pipeline: &RenderPipeline,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout(),
                0,
                sets,
                &[],
            );
        }
    }

    /// # Safety
    /// The buffer must have vertex buffer usage.
    pub unsafe fn bind_vertex_buffer(&self, buffer: &GpuBuffer) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.cmd, 0, &[buffer.buffer], &[0]);
        }
    }

    /// # Safety
    /// The buffer must have index buffer usage.
    pub unsafe fn bind_index_buffer(&self, indices: &IndexBuffer) {
        unsafe {
            self.device.cmd_bind_index_buffer(
                self.cmd,
                indices.buffer.buffer,
                0,
                indices.index_type.vk_index_type(),
            );
        }
    }

    /// Draw `vertex_count` vertices from the bound vertex buffer.
    ///
    /// # Safety
    /// A pipeline must be bound inside an active render pass.
    pub unsafe fn draw(&self, vertex_count: u32) {
        unsafe { self.device.cmd_draw(self.cmd, vertex_count, 1, 0, 0) };
    }

    /// Draw `index_count` indices from the bound index buffer.
    ///
    /// # Safety
    /// A pipeline and an index buffer must be bound inside an active render pass.
    pub unsafe fn draw_indexed(&self, index_count: u32) {
        unsafe { self.device.cmd_draw_indexed(self.cmd, index_count, 1, 0, 0, 0) };
    }

    /// End recording and hand back the buffer for submission.
    ///
    /// # Safety
    /// No render pass may be active.
    pub unsafe fn finish(self) -> Result<vk::CommandBuffer> {
        unsafe { end_command_buffer(self.device, self.cmd)? };
        Ok(self.cmd)
    }
}
