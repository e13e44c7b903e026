//! Native graphics backend.
//!
//! Device selection, queue resolution and logical device creation only talk
//! to the driver through [`DeviceBackend`]. [`AshBackend`] is the Vulkan
//! implementation; tests substitute a fake.

use crate::device::DeviceCreateConfig;
use crate::instance::VulkanInstance;
use ash::prelude::VkResult;
use ash::vk;
use std::ffi::{CStr, CString};

/// Queries and calls the device layer needs from the driver.
///
/// Every method is a blocking call. None of them mutate backend state except
/// [`DeviceBackend::create_device`].
pub trait DeviceBackend {
    /// Logical device handle produced by [`DeviceBackend::create_device`].
    type Device;

    /// Names of all instance extensions.
    fn instance_extensions(&self) -> VkResult<Vec<String>>;

    /// Names of all instance layers.
    fn instance_layers(&self) -> VkResult<Vec<String>>;

    fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>>;

    /// Names of all extensions a physical device supports.
    fn device_extensions(&self, physical_device: vk::PhysicalDevice) -> VkResult<Vec<String>>;

    fn properties(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties;

    fn features(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures;

    /// The `rayTracingPipeline` feature bit.
    ///
    /// Only valid to call once the ray-tracing extension is known to exist.
    fn ray_tracing_pipeline_feature(&self, physical_device: vk::PhysicalDevice) -> bool;

    fn memory_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceMemoryProperties;

    fn queue_family_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties>;

    /// Whether `family_index` can present to the target surface.
    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        family_index: u32,
    ) -> VkResult<bool>;

    fn format_properties(
        &self,
        physical_device: vk::PhysicalDevice,
        format: vk::Format,
    ) -> vk::FormatProperties;

    /// Create the logical device exactly as described by `config`.
    fn create_device(
        &self,
        physical_device: vk::PhysicalDevice,
        config: &DeviceCreateConfig,
    ) -> VkResult<Self::Device>;

    /// Retrieve a queue handle from a created device.
    fn device_queue(&self, device: &Self::Device, family_index: u32, queue_index: u32)
        -> vk::Queue;
}

/// Vulkan backend over an [`ash::Instance`].
pub struct AshBackend<'a> {
    instance: &'a VulkanInstance,
}

impl<'a> AshBackend<'a> {
    pub const fn new(instance: &'a VulkanInstance) -> Self {
        Self { instance }
    }
}

fn names_of<T>(items: &[T], name: impl Fn(&T) -> Option<&CStr>) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| name(item).and_then(|n| n.to_str().ok()).map(String::from))
        .collect()
}

impl DeviceBackend for AshBackend<'_> {
    type Device = ash::Device;

    fn instance_extensions(&self) -> VkResult<Vec<String>> {
        let properties = unsafe {
            self.instance
                .entry()
                .enumerate_instance_extension_properties(None)?
        };
        Ok(names_of(&properties, |p| p.extension_name_as_c_str().ok()))
    }

    fn instance_layers(&self) -> VkResult<Vec<String>> {
        let properties = unsafe { self.instance.entry().enumerate_instance_layer_properties()? };
        Ok(names_of(&properties, |p| p.layer_name_as_c_str().ok()))
    }

    fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance.raw().enumerate_physical_devices() }
    }

    fn device_extensions(&self, physical_device: vk::PhysicalDevice) -> VkResult<Vec<String>> {
        let properties = unsafe {
            self.instance
                .raw()
                .enumerate_device_extension_properties(physical_device)?
        };
        Ok(names_of(&properties, |p| p.extension_name_as_c_str().ok()))
    }

    fn properties(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        unsafe {
            self.instance
                .raw()
                .get_physical_device_properties(physical_device)
        }
    }

    fn features(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
        unsafe { self.instance.raw().get_physical_device_features(physical_device) }
    }

    fn ray_tracing_pipeline_feature(&self, physical_device: vk::PhysicalDevice) -> bool {
        let mut ray_tracing = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default();
        {
            let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut ray_tracing);
            unsafe {
                self.instance
                    .raw()
                    .get_physical_device_features2(physical_device, &mut features2);
            }
        }
        ray_tracing.ray_tracing_pipeline == vk::TRUE
    }

    fn memory_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceMemoryProperties {
        unsafe {
            self.instance
                .raw()
                .get_physical_device_memory_properties(physical_device)
        }
    }

    fn queue_family_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        unsafe {
            self.instance
                .raw()
                .get_physical_device_queue_family_properties(physical_device)
        }
    }

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        family_index: u32,
    ) -> VkResult<bool> {
        // Without a surface nothing can present
        let Some(surface) = self.instance.surface() else {
            return Ok(false);
        };
        unsafe {
            surface.loader.get_physical_device_surface_support(
                physical_device,
                family_index,
                surface.handle,
            )
        }
    }

    fn format_properties(
        &self,
        physical_device: vk::PhysicalDevice,
        format: vk::Format,
    ) -> vk::FormatProperties {
        unsafe {
            self.instance
                .raw()
                .get_physical_device_format_properties(physical_device, format)
        }
    }

    fn create_device(
        &self,
        physical_device: vk::PhysicalDevice,
        config: &DeviceCreateConfig,
    ) -> VkResult<ash::Device> {
        let queue_priorities = [config.queue_priority];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = config
            .queue_family_indices
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let extensions = config
            .enabled_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| vk::Result::ERROR_EXTENSION_NOT_PRESENT)?;
        let extension_names: Vec<*const std::ffi::c_char> =
            extensions.iter().map(|ext| ext.as_ptr()).collect();

        let features = config.enabled_features();

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        unsafe {
            self.instance
                .raw()
                .create_device(physical_device, &device_create_info, None)
        }
    }

    fn device_queue(&self, device: &ash::Device, family_index: u32, queue_index: u32) -> vk::Queue {
        unsafe { device.get_device_queue(family_index, queue_index) }
    }
}
