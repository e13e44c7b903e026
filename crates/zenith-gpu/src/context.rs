//! GPU context management.

use crate::backend::AshBackend;
use crate::capabilities::PhysicalDeviceDescriptor;
use crate::device::{create_logical_device, BoundQueue, DeviceCreateConfig};
use crate::error::{GpuError, Result};
use crate::formats;
use crate::instance::VulkanInstance;
use crate::memory::GpuAllocator;
use crate::queue::QueueCapabilities;
use crate::scoring::{DeviceScorer, DEFAULT_SCORER};
use ash::vk;
use parking_lot::Mutex;
use std::sync::Arc;

/// Selected device, its logical device and queues, and an allocator.
pub struct GpuContext {
    descriptor: PhysicalDeviceDescriptor,
    device: Arc<ash::Device>,
    create_config: DeviceCreateConfig,
    queues: Vec<BoundQueue>,
    allocator: Mutex<GpuAllocator>,
    // Fields drop in declaration order, so the instance outlives the
    // allocator and the device destroyed in `Drop`
    instance: VulkanInstance,
}

impl GpuContext {
    /// Pick a device with the default scorer.
    pub fn new(instance: VulkanInstance) -> Result<Self> {
        Self::with_scorer(instance, &DEFAULT_SCORER)
    }

    /// Pick a device with a caller-supplied scorer.
    pub fn with_scorer<S: DeviceScorer + ?Sized>(
        instance: VulkanInstance,
        scorer: &S,
    ) -> Result<Self> {
        let (descriptor, logical) = create_logical_device(&AshBackend::new(&instance), scorer)?;
        let (device, create_config, queues) = logical.into_parts();
        let device = Arc::new(device);

        let allocator =
            match unsafe { GpuAllocator::new(instance.raw(), device.clone(), descriptor.handle) } {
                Ok(allocator) => allocator,
                Err(e) => {
                    unsafe { device.destroy_device(None) };
                    return Err(e);
                }
            };

        Ok(Self {
            descriptor,
            device,
            create_config,
            queues,
            allocator: Mutex::new(allocator),
            instance,
        })
    }

    /// Get the instance the device was created from.
    pub const fn instance(&self) -> &VulkanInstance {
        &self.instance
    }

    /// Mutable access, for updating the window extent.
    pub fn instance_mut(&mut self) -> &mut VulkanInstance {
        &mut self.instance
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Shared handle to the device.
    pub fn device_arc(&self) -> Arc<ash::Device> {
        self.device.clone()
    }

    /// Get the physical device handle.
    pub const fn physical_device(&self) -> vk::PhysicalDevice {
        self.descriptor.handle
    }

    /// Snapshot of the selected physical device.
    pub const fn descriptor(&self) -> &PhysicalDeviceDescriptor {
        &self.descriptor
    }

    /// The configuration the device was created with.
    pub const fn create_config(&self) -> &DeviceCreateConfig {
        &self.create_config
    }

    /// All bound queues, in family order.
    pub fn queues(&self) -> &[BoundQueue] {
        &self.queues
    }

    fn first_queue_with(&self, capability: QueueCapabilities) -> Option<&BoundQueue> {
        self.queues.iter().find(|q| q.family.supports(capability))
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> Result<&BoundQueue> {
        self.first_queue_with(QueueCapabilities::GRAPHICS)
            .ok_or(GpuError::MissingGraphicsQueue)
    }

    /// Get the present queue.
    pub fn present_queue(&self) -> Result<&BoundQueue> {
        self.first_queue_with(QueueCapabilities::PRESENT)
            .ok_or(GpuError::MissingPresentQueue)
    }

    /// Get access to the GPU allocator.
    pub const fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Default color format, checked against the device.
    pub fn color_format(&self) -> Result<vk::Format> {
        formats::color_format(&AshBackend::new(&self.instance), self.physical_device())
    }

    /// Default depth format, checked against the device.
    pub fn depth_format(&self) -> Result<vk::Format> {
        formats::depth_format(&AshBackend::new(&self.instance), self.physical_device())
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::warn!("device_wait_idle failed during teardown: {e}");
            }

            // Frees every VkDeviceMemory, so it has to precede the device
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
        }
    }
}
