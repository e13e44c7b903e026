//! Frame synchronization.

use crate::error::{GpuError, Result};
use ash::vk;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    Ok(unsafe { device.create_semaphore(&create_info, None)? })
}

/// Create a fence, optionally already signalled.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    Ok(unsafe { device.create_fence(&create_info, None)? })
}

/// Semaphores and fence for one frame in flight.
pub struct FrameSync {
    /// Signalled when the swapchain image is available
    pub image_available: vk::Semaphore,
    /// Signalled when rendering is complete
    pub render_finished: vk::Semaphore,
    /// Signalled when the frame's submission has finished
    pub in_flight: vk::Fence,
}

impl FrameSync {
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        unsafe {
            Ok(Self {
                image_available: create_semaphore(device)?,
                render_finished: create_semaphore(device)?,
                in_flight: create_fence(device, true)?,
            })
        }
    }

    /// Block until the frame's previous submission completes.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn wait(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.wait_for_fences(&[self.in_flight], true, u64::MAX)? };
        Ok(())
    }

    /// Unsignal the fence before the frame is submitted again.
    ///
    /// Only reset once the frame is certain to submit, or the next wait
    /// never returns.
    ///
    /// # Safety
    /// The fence must not be pending.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.reset_fences(&[self.in_flight])? };
        Ok(())
    }

    /// # Safety
    /// The resources must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight, None);
        }
    }
}

/// Ring over the frame index, independent of the Vulkan objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCounter {
    current: usize,
    frames_in_flight: usize,
}

impl FrameCounter {
    pub fn new(frames_in_flight: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(GpuError::InvalidState(
                "Need at least one frame in flight".to_string(),
            ));
        }
        Ok(Self {
            current: 0,
            frames_in_flight,
        })
    }

    pub const fn current(&self) -> usize {
        self.current
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.frames_in_flight;
    }
}

/// Sync resources for several frames in flight.
pub struct FrameSyncManager {
    frames: Vec<FrameSync>,
    counter: FrameCounter,
}

impl FrameSyncManager {
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, frames_in_flight: usize) -> Result<Self> {
        let counter = FrameCounter::new(frames_in_flight)?;
        let mut frames = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            frames.push(unsafe { FrameSync::new(device)? });
        }

        Ok(Self { frames, counter })
    }

    pub fn current(&self) -> &FrameSync {
        &self.frames[self.counter.current()]
    }

    pub const fn current_frame(&self) -> usize {
        self.counter.current()
    }

    pub fn advance(&mut self) {
        self.counter.advance();
    }

    /// # Safety
    /// None of the resources may be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        for frame in &self.frames {
            unsafe { frame.destroy(device) };
        }
    }
}
