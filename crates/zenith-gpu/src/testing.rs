//! In-memory [`DeviceBackend`] for tests.

use crate::backend::DeviceBackend;
use crate::capabilities::{
    PhysicalDeviceDescriptor, RAY_TRACING_PIPELINE_EXTENSION, SWAPCHAIN_EXTENSION,
};
use crate::device::DeviceCreateConfig;
use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::ffi::c_char;

/// Scripted physical device.
#[derive(Debug, Clone)]
pub struct FakeDevice {
    name: String,
    device_type: vk::PhysicalDeviceType,
    vendor_id: u32,
    max_image_dimension: u32,
    features: vk::PhysicalDeviceFeatures,
    ray_tracing_feature: bool,
    extensions: BTreeSet<String>,
    queue_families: Vec<vk::QueueFlags>,
    present_families: Vec<u32>,
    device_local_heaps_mb: Vec<u64>,
    format_features: HashMap<vk::Format, vk::FormatFeatureFlags>,
    reject_creation: Option<vk::Result>,
    extension_query_error: Option<vk::Result>,
}

impl FakeDevice {
    fn new(name: &str, device_type: vk::PhysicalDeviceType, vendor_id: u32) -> Self {
        Self {
            name: name.to_string(),
            device_type,
            vendor_id,
            max_image_dimension: 4096,
            features: vk::PhysicalDeviceFeatures::default(),
            ray_tracing_feature: false,
            extensions: BTreeSet::from([SWAPCHAIN_EXTENSION.to_string()]),
            queue_families: vec![
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
            ],
            present_families: vec![0],
            device_local_heaps_mb: Vec::new(),
            format_features: HashMap::new(),
            reject_creation: None,
            extension_query_error: None,
        }
    }

    /// Discrete GPU with one all-purpose, presenting family and the swapchain extension.
    pub fn discrete(name: &str) -> Self {
        Self::new(name, vk::PhysicalDeviceType::DISCRETE_GPU, 0x10DE)
    }

    /// Integrated GPU, otherwise like [`Self::discrete`].
    pub fn integrated(name: &str) -> Self {
        Self::new(name, vk::PhysicalDeviceType::INTEGRATED_GPU, 0x8086)
    }

    pub fn device_type(mut self, device_type: vk::PhysicalDeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    pub fn max_image_dimension(mut self, dimension: u32) -> Self {
        self.max_image_dimension = dimension;
        self
    }

    pub fn anisotropy(mut self, enabled: bool) -> Self {
        self.features.sampler_anisotropy = vk::Bool32::from(enabled);
        self
    }

    pub fn geometry_shader(mut self, enabled: bool) -> Self {
        self.features.geometry_shader = vk::Bool32::from(enabled);
        self
    }

    /// Toggle both the ray-tracing extension and its feature bit.
    pub fn ray_tracing(mut self, enabled: bool) -> Self {
        self.ray_tracing_feature = enabled;
        if enabled {
            self.extensions.insert(RAY_TRACING_PIPELINE_EXTENSION.to_string());
        } else {
            self.extensions.remove(RAY_TRACING_PIPELINE_EXTENSION);
        }
        self
    }

    /// Report the feature bit while hiding the extension.
    pub fn ray_tracing_feature_without_extension(mut self) -> Self {
        self.ray_tracing_feature = true;
        self.extensions.remove(RAY_TRACING_PIPELINE_EXTENSION);
        self
    }

    pub fn extension(mut self, name: &str) -> Self {
        self.extensions.insert(name.to_string());
        self
    }

    pub fn without_extension(mut self, name: &str) -> Self {
        self.extensions.remove(name);
        self
    }

    pub fn queue_families(mut self, families: Vec<vk::QueueFlags>) -> Self {
        self.queue_families = families;
        self
    }

    /// Family indices that can present.
    pub fn present_families(mut self, families: Vec<u32>) -> Self {
        self.present_families = families;
        self
    }

    /// Add a device-local heap.
    pub fn device_local_heap_mb(mut self, mb: u64) -> Self {
        self.device_local_heaps_mb.push(mb);
        self
    }

    /// Optimal-tiling features for `format`.
    pub fn format_features(
        mut self,
        format: vk::Format,
        features: vk::FormatFeatureFlags,
    ) -> Self {
        self.format_features.insert(format, features);
        self
    }

    /// Make logical device creation fail with `code`.
    pub fn reject_device_creation(mut self, code: vk::Result) -> Self {
        self.reject_creation = Some(code);
        self
    }

    /// Make the device extension query fail with `code`.
    pub fn fail_extension_query(mut self, code: vk::Result) -> Self {
        self.extension_query_error = Some(code);
        self
    }

    /// Describe this device as if it had the given raw handle.
    pub fn descriptor(self, raw_handle: u64) -> PhysicalDeviceDescriptor {
        let mut descriptor = FakeBackend::new(vec![self]).describe(0);
        descriptor.handle = vk::PhysicalDevice::from_raw(raw_handle);
        descriptor
    }
}

/// Logical device produced by [`FakeBackend`].
#[derive(Debug)]
pub struct FakeLogicalDevice {
    pub physical_device: vk::PhysicalDevice,
}

/// Backend serving [`FakeDevice`]s and recording what was asked of it.
#[derive(Debug, Default)]
pub struct FakeBackend {
    devices: Vec<FakeDevice>,
    instance_extensions: Vec<String>,
    instance_layers: Vec<String>,
    ray_tracing_queries: Cell<usize>,
    created: RefCell<Vec<DeviceCreateConfig>>,
    queue_requests: RefCell<Vec<(u32, u32)>>,
}

impl FakeBackend {
    pub fn new(devices: Vec<FakeDevice>) -> Self {
        Self {
            devices,
            ..Default::default()
        }
    }

    pub fn with_instance_extensions(mut self, names: &[&str]) -> Self {
        self.instance_extensions = names.iter().map(|n| (*n).to_string()).collect();
        self
    }

    pub fn with_instance_layers(mut self, names: &[&str]) -> Self {
        self.instance_layers = names.iter().map(|n| (*n).to_string()).collect();
        self
    }

    /// Handle of the device at `index`. Never null.
    pub fn handle(&self, index: usize) -> vk::PhysicalDevice {
        vk::PhysicalDevice::from_raw(index as u64 + 1)
    }

    /// Query the descriptor of the device at `index`.
    pub fn describe(&self, index: usize) -> PhysicalDeviceDescriptor {
        PhysicalDeviceDescriptor::query(self, self.handle(index)).unwrap()
    }

    pub fn ray_tracing_queries(&self) -> usize {
        self.ray_tracing_queries.get()
    }

    /// Every config passed to `create_device`, successful or not.
    pub fn created_configs(&self) -> Vec<DeviceCreateConfig> {
        self.created.borrow().clone()
    }

    /// `(family, index)` of every queue retrieved.
    pub fn queue_requests(&self) -> Vec<(u32, u32)> {
        self.queue_requests.borrow().clone()
    }

    fn device(&self, handle: vk::PhysicalDevice) -> &FakeDevice {
        &self.devices[handle.as_raw() as usize - 1]
    }
}

impl DeviceBackend for FakeBackend {
    type Device = FakeLogicalDevice;

    fn instance_extensions(&self) -> VkResult<Vec<String>> {
        Ok(self.instance_extensions.clone())
    }

    fn instance_layers(&self) -> VkResult<Vec<String>> {
        Ok(self.instance_layers.clone())
    }

    fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        Ok((0..self.devices.len()).map(|i| self.handle(i)).collect())
    }

    fn device_extensions(&self, physical_device: vk::PhysicalDevice) -> VkResult<Vec<String>> {
        let device = self.device(physical_device);
        match device.extension_query_error {
            Some(code) => Err(code),
            None => Ok(device.extensions.iter().cloned().collect()),
        }
    }

    fn properties(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        let device = self.device(physical_device);
        let mut properties = vk::PhysicalDeviceProperties::default();
        properties.device_type = device.device_type;
        properties.vendor_id = device.vendor_id;
        properties.api_version = vk::API_VERSION_1_3;
        properties.limits.max_image_dimension2_d = device.max_image_dimension;

        let capacity = properties.device_name.len() - 1;
        for (dst, src) in properties
            .device_name
            .iter_mut()
            .zip(device.name.bytes().take(capacity))
        {
            *dst = src as c_char;
        }
        properties
    }

    fn features(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
        self.device(physical_device).features
    }

    fn ray_tracing_pipeline_feature(&self, physical_device: vk::PhysicalDevice) -> bool {
        self.ray_tracing_queries.set(self.ray_tracing_queries.get() + 1);
        self.device(physical_device).ray_tracing_feature
    }

    fn memory_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceMemoryProperties {
        let device = self.device(physical_device);
        let mut properties = vk::PhysicalDeviceMemoryProperties::default();
        for (heap, mb) in properties
            .memory_heaps
            .iter_mut()
            .zip(&device.device_local_heaps_mb)
        {
            heap.size = mb * 1024 * 1024;
            heap.flags = vk::MemoryHeapFlags::DEVICE_LOCAL;
            properties.memory_heap_count += 1;
        }
        properties
    }

    fn queue_family_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        self.device(physical_device)
            .queue_families
            .iter()
            .map(|&flags| {
                let mut family = vk::QueueFamilyProperties::default();
                family.queue_flags = flags;
                family.queue_count = 1;
                family
            })
            .collect()
    }

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        family_index: u32,
    ) -> VkResult<bool> {
        Ok(self
            .device(physical_device)
            .present_families
            .contains(&family_index))
    }

    fn format_properties(
        &self,
        physical_device: vk::PhysicalDevice,
        format: vk::Format,
    ) -> vk::FormatProperties {
        let mut properties = vk::FormatProperties::default();
        if let Some(&features) = self.device(physical_device).format_features.get(&format) {
            properties.optimal_tiling_features = features;
        }
        properties
    }

    fn create_device(
        &self,
        physical_device: vk::PhysicalDevice,
        config: &DeviceCreateConfig,
    ) -> VkResult<FakeLogicalDevice> {
        self.created.borrow_mut().push(config.clone());
        match self.device(physical_device).reject_creation {
            Some(code) => Err(code),
            None => Ok(FakeLogicalDevice { physical_device }),
        }
    }

    fn device_queue(
        &self,
        _device: &FakeLogicalDevice,
        family_index: u32,
        queue_index: u32,
    ) -> vk::Queue {
        self.queue_requests
            .borrow_mut()
            .push((family_index, queue_index));
        vk::Queue::from_raw(u64::from(family_index) * 16 + u64::from(queue_index) + 1)
    }
}
