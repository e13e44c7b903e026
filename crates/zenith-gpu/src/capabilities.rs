//! GPU capability detection.
//!
//! Instance-level queries (extensions, layers) and a per-device snapshot,
//! [`PhysicalDeviceDescriptor`], that the scorer works on without touching
//! the driver again.

use crate::backend::DeviceBackend;
use crate::error::{GpuError, Result};
use ash::vk;
use std::collections::{BTreeSet, HashSet};

/// Device extension needed to present to a surface.
pub const SWAPCHAIN_EXTENSION: &str = "VK_KHR_swapchain";

/// Device extension exposing ray-tracing pipelines.
pub const RAY_TRACING_PIPELINE_EXTENSION: &str = "VK_KHR_ray_tracing_pipeline";

/// Device extensions every selected device must support and gets enabled with.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&str] = &[SWAPCHAIN_EXTENSION];

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Coarse hardware class used by the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Discrete,
    Integrated,
    /// CPU, virtual GPU or anything else.
    Other,
}

impl From<vk::PhysicalDeviceType> for DeviceClass {
    fn from(ty: vk::PhysicalDeviceType) -> Self {
        match ty {
            vk::PhysicalDeviceType::DISCRETE_GPU => Self::Discrete,
            vk::PhysicalDeviceType::INTEGRATED_GPU => Self::Integrated,
            _ => Self::Other,
        }
    }
}

/// Read-only snapshot of one physical device.
///
/// The handle is not owned; it stays valid as long as the instance does.
#[derive(Debug, Clone)]
pub struct PhysicalDeviceDescriptor {
    /// Native handle
    pub handle: vk::PhysicalDevice,
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Reported device type
    pub device_type: vk::PhysicalDeviceType,
    /// Vulkan API version
    pub api_version: u32,
    /// Largest supported 2D image dimension
    pub max_image_dimension_2d: u32,
    /// Core feature flags
    pub features: vk::PhysicalDeviceFeatures,
    /// Ray-tracing pipeline feature bit. Only queried when the extension is
    /// enumerable, so it is `false` otherwise.
    pub ray_tracing_pipeline: bool,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Available device extensions
    pub available_extensions: HashSet<String>,
    /// Flags of every queue family, indexed by family index
    pub queue_families: Vec<vk::QueueFlags>,
}

impl PhysicalDeviceDescriptor {
    /// Query a physical device through the backend.
    pub fn query<B: DeviceBackend + ?Sized>(
        backend: &B,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let properties = backend.properties(physical_device);
        let features = backend.features(physical_device);
        let memory_properties = backend.memory_properties(physical_device);

        // A device whose extension list can't be read is kept with none, so
        // it scores zero instead of aborting enumeration
        let available_extensions: HashSet<String> =
            match backend.device_extensions(physical_device) {
                Ok(extensions) => extensions.into_iter().collect(),
                Err(e) => {
                    tracing::warn!(
                        "Failed to enumerate extensions of {physical_device:?}: {e}, \
                         treating it as having none"
                    );
                    HashSet::new()
                }
            };

        // Only chain the ray-tracing feature struct when the driver knows it
        let ray_tracing_pipeline = available_extensions.contains(RAY_TRACING_PIPELINE_EXTENSION)
            && backend.ray_tracing_pipeline_feature(physical_device);

        let queue_families = backend
            .queue_family_properties(physical_device)
            .iter()
            .map(|family| family.queue_flags)
            .collect();

        let device_name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            handle: physical_device,
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            device_type: properties.device_type,
            api_version: properties.api_version,
            max_image_dimension_2d: properties.limits.max_image_dimension2_d,
            features,
            ray_tracing_pipeline,
            memory_properties,
            available_extensions,
            queue_families,
        })
    }

    /// Hardware class of this device.
    pub fn device_class(&self) -> DeviceClass {
        self.device_type.into()
    }

    /// Whether every extension in `required` is available.
    pub fn supports_extensions(&self, required: &[&str]) -> bool {
        required
            .iter()
            .all(|ext| self.available_extensions.contains(*ext))
    }

    pub fn supports_swapchain(&self) -> bool {
        self.supports_extensions(&[SWAPCHAIN_EXTENSION])
    }

    /// Whether some family supports graphics, some compute and some transfer.
    ///
    /// The three may be different families. Present support is not part of
    /// this check.
    pub fn has_required_queues(&self) -> bool {
        let any = |flag: vk::QueueFlags| self.queue_families.iter().any(|f| f.contains(flag));
        any(vk::QueueFlags::GRAPHICS)
            && any(vk::QueueFlags::COMPUTE)
            && any(vk::QueueFlags::TRANSFER)
    }

    /// Ray-tracing pipelines: extension present and feature bit set.
    pub fn supports_ray_tracing(&self) -> bool {
        self.available_extensions
            .contains(RAY_TRACING_PIPELINE_EXTENSION)
            && self.ray_tracing_pipeline
    }

    pub fn supports_anisotropy(&self) -> bool {
        self.features.sampler_anisotropy == vk::TRUE
    }

    pub fn supports_geometry_shader(&self) -> bool {
        self.features.geometry_shader == vk::TRUE
    }

    /// Total device-local memory in MB.
    pub fn device_local_memory_mb(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum()
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            self.device_class(),
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb(),
        )
    }
}

/// Instance extensions the loader reports.
pub fn instance_extensions<B: DeviceBackend + ?Sized>(backend: &B) -> Result<BTreeSet<String>> {
    Ok(backend.instance_extensions()?.into_iter().collect())
}

/// Instance layers the loader reports.
pub fn instance_layers<B: DeviceBackend + ?Sized>(backend: &B) -> Result<BTreeSet<String>> {
    Ok(backend.instance_layers()?.into_iter().collect())
}

/// Extensions a physical device reports.
pub fn device_extensions<B: DeviceBackend + ?Sized>(
    backend: &B,
    physical_device: vk::PhysicalDevice,
) -> Result<BTreeSet<String>> {
    Ok(backend
        .device_extensions(physical_device)?
        .into_iter()
        .collect())
}

/// Enumerate and describe every physical device.
///
/// Zero devices is fatal and reported before anything gets scored.
pub fn enumerate_devices<B: DeviceBackend + ?Sized>(
    backend: &B,
) -> Result<Vec<PhysicalDeviceDescriptor>> {
    let devices = backend.enumerate_physical_devices()?;

    if devices.is_empty() {
        return Err(GpuError::NoDevicesFound);
    }

    devices
        .into_iter()
        .map(|device| PhysicalDeviceDescriptor::query(backend, device))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, FakeDevice};

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn device_classes() {
        assert_eq!(
            DeviceClass::from(vk::PhysicalDeviceType::DISCRETE_GPU),
            DeviceClass::Discrete
        );
        assert_eq!(
            DeviceClass::from(vk::PhysicalDeviceType::INTEGRATED_GPU),
            DeviceClass::Integrated
        );
        assert_eq!(DeviceClass::from(vk::PhysicalDeviceType::CPU), DeviceClass::Other);
        assert_eq!(
            DeviceClass::from(vk::PhysicalDeviceType::VIRTUAL_GPU),
            DeviceClass::Other
        );
    }

    #[test]
    fn query_snapshots_backend_state() {
        let backend = FakeBackend::new(vec![FakeDevice::discrete("Fake RTX")
            .max_image_dimension(16384)
            .anisotropy(true)
            .ray_tracing(true)]);
        let handle = backend.handle(0);

        let descriptor = PhysicalDeviceDescriptor::query(&backend, handle).unwrap();

        assert_eq!(descriptor.handle, handle);
        assert_eq!(descriptor.device_name, "Fake RTX");
        assert_eq!(descriptor.device_class(), DeviceClass::Discrete);
        assert_eq!(descriptor.max_image_dimension_2d, 16384);
        assert!(descriptor.supports_anisotropy());
        assert!(descriptor.supports_swapchain());
        assert!(descriptor.supports_ray_tracing());
        assert!(descriptor.has_required_queues());
    }

    #[test]
    fn ray_tracing_feature_is_not_queried_without_extension() {
        let backend = FakeBackend::new(vec![FakeDevice::discrete("Feature only")
            .ray_tracing_feature_without_extension()]);

        let descriptor = PhysicalDeviceDescriptor::query(&backend, backend.handle(0)).unwrap();

        assert!(!descriptor.ray_tracing_pipeline);
        assert!(!descriptor.supports_ray_tracing());
        assert_eq!(backend.ray_tracing_queries(), 0);
    }

    #[test]
    fn ray_tracing_needs_feature_bit_too() {
        let backend = FakeBackend::new(vec![FakeDevice::discrete("Extension only")
            .extension(RAY_TRACING_PIPELINE_EXTENSION)]);

        let descriptor = PhysicalDeviceDescriptor::query(&backend, backend.handle(0)).unwrap();

        assert!(!descriptor.supports_ray_tracing());
        assert_eq!(backend.ray_tracing_queries(), 1);
    }

    #[test]
    fn required_queues_may_span_families() {
        let backend = FakeBackend::new(vec![FakeDevice::discrete("Split").queue_families(vec![
            vk::QueueFlags::GRAPHICS,
            vk::QueueFlags::COMPUTE,
            vk::QueueFlags::TRANSFER,
        ])]);

        let descriptor = PhysicalDeviceDescriptor::query(&backend, backend.handle(0)).unwrap();
        assert!(descriptor.has_required_queues());
    }

    #[test]
    fn required_queues_need_transfer_bit() {
        let backend = FakeBackend::new(vec![FakeDevice::discrete("No transfer")
            .queue_families(vec![vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE])]);

        let descriptor = PhysicalDeviceDescriptor::query(&backend, backend.handle(0)).unwrap();
        assert!(!descriptor.has_required_queues());
    }

    #[test]
    fn instance_queries_return_sets() {
        let backend = FakeBackend::new(vec![FakeDevice::discrete("A")])
            .with_instance_extensions(&["VK_KHR_surface", "VK_KHR_surface"])
            .with_instance_layers(&["VK_LAYER_KHRONOS_validation"]);

        let extensions = instance_extensions(&backend).unwrap();
        assert_eq!(extensions.len(), 1);
        assert!(extensions.contains("VK_KHR_surface"));

        let layers = instance_layers(&backend).unwrap();
        assert!(layers.contains("VK_LAYER_KHRONOS_validation"));

        let device = device_extensions(&backend, backend.handle(0)).unwrap();
        assert!(device.contains(SWAPCHAIN_EXTENSION));
    }

    #[test]
    fn zero_devices_is_fatal() {
        let backend = FakeBackend::new(Vec::new());
        assert!(matches!(
            enumerate_devices(&backend),
            Err(GpuError::NoDevicesFound)
        ));
    }

    #[test]
    fn failed_extension_query_leaves_device_without_extensions() {
        let backend = FakeBackend::new(vec![FakeDevice::discrete("Lost")
            .ray_tracing(true)
            .fail_extension_query(vk::Result::ERROR_INITIALIZATION_FAILED)]);

        let descriptor = PhysicalDeviceDescriptor::query(&backend, backend.handle(0)).unwrap();

        assert!(descriptor.available_extensions.is_empty());
        assert!(!descriptor.supports_swapchain());
        assert!(!descriptor.supports_ray_tracing());
        assert_eq!(backend.ray_tracing_queries(), 0);
        assert!(matches!(
            device_extensions(&backend, backend.handle(0)),
            Err(GpuError::Vulkan(vk::Result::ERROR_INITIALIZATION_FAILED))
        ));
    }

    #[test]
    fn enumeration_survives_one_failed_extension_query() {
        let backend = FakeBackend::new(vec![
            FakeDevice::discrete("Lost").fail_extension_query(vk::Result::ERROR_DEVICE_LOST),
            FakeDevice::integrated("Healthy"),
        ]);

        let descriptors = enumerate_devices(&backend).unwrap();

        assert_eq!(descriptors.len(), 2);
        assert!(descriptors[0].available_extensions.is_empty());
        assert!(descriptors[1].supports_swapchain());
    }

    #[test]
    fn device_local_memory_is_summed() {
        let backend = FakeBackend::new(vec![FakeDevice::discrete("Memory")
            .device_local_heap_mb(4096)
            .device_local_heap_mb(2048)]);

        let descriptor = PhysicalDeviceDescriptor::query(&backend, backend.handle(0)).unwrap();
        assert_eq!(descriptor.device_local_memory_mb(), 6144);
        assert!(descriptor.summary().contains("6144 MB VRAM"));
    }
}
