//! Logical device creation.
//!
//! The pipeline is linear: pick a physical device, classify its queue
//! families, then create the logical device with one queue per distinct
//! family.

use crate::backend::DeviceBackend;
use crate::capabilities::{
    enumerate_devices, PhysicalDeviceDescriptor, REQUIRED_DEVICE_EXTENSIONS,
};
use crate::error::{GpuError, Result};
use crate::queue::{resolve_families, QueueCapabilities, QueueFamilyRecord};
use crate::scoring::DeviceScorer;
use crate::selection::select_best_device;
use ash::vk;
use std::collections::BTreeSet;

/// Everything handed to the driver when creating a logical device.
#[derive(Debug, Clone)]
pub struct DeviceCreateConfig {
    /// Distinct queue family indices, one queue each, ascending.
    pub queue_family_indices: Vec<u32>,
    /// Priority of every requested queue.
    pub queue_priority: f32,
    /// Device extensions to enable.
    pub enabled_extensions: Vec<String>,
    /// Features the device reported; the starting point for enablement.
    pub base_features: vk::PhysicalDeviceFeatures,
    /// Force anisotropic filtering on. Creation fails on hardware without it.
    pub sampler_anisotropy: bool,
}

impl DeviceCreateConfig {
    /// Request one queue for every family that has any capability.
    pub fn new(device: &PhysicalDeviceDescriptor, families: &[QueueFamilyRecord]) -> Self {
        let queue_family_indices: BTreeSet<u32> = families
            .iter()
            .filter(|record| !record.capabilities.is_empty())
            .map(|record| record.index)
            .collect();

        Self {
            queue_family_indices: queue_family_indices.into_iter().collect(),
            queue_priority: 1.0,
            enabled_extensions: REQUIRED_DEVICE_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
            base_features: device.features,
            sampler_anisotropy: true,
        }
    }

    /// The feature set actually requested.
    pub fn enabled_features(&self) -> vk::PhysicalDeviceFeatures {
        let mut features = self.base_features;
        if self.sampler_anisotropy {
            features.sampler_anisotropy = vk::TRUE;
        }
        features
    }
}

/// A queue family record bound to the queue retrieved from it.
#[derive(Debug, Clone, Copy)]
pub struct BoundQueue {
    pub family: QueueFamilyRecord,
    pub queue: vk::Queue,
}

/// A created logical device and its queue table.
pub struct LogicalDevice<D> {
    device: D,
    physical_device: vk::PhysicalDevice,
    config: DeviceCreateConfig,
    queues: Vec<BoundQueue>,
}

impl<D> LogicalDevice<D> {
    /// Get the backend device handle.
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Get the physical device handle.
    pub const fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// The configuration the device was created with.
    pub const fn create_config(&self) -> &DeviceCreateConfig {
        &self.config
    }

    /// All bound queues, in family order.
    pub fn queues(&self) -> &[BoundQueue] {
        &self.queues
    }

    /// Bound queues whose family supports `capability`.
    pub fn queues_with(&self, capability: QueueCapabilities) -> impl Iterator<Item = &BoundQueue> {
        self.queues
            .iter()
            .filter(move |q| q.family.supports(capability))
    }

    /// First queue supporting graphics.
    pub fn graphics_queue(&self) -> Result<&BoundQueue> {
        self.queues_with(QueueCapabilities::GRAPHICS)
            .next()
            .ok_or(GpuError::MissingGraphicsQueue)
    }

    /// First queue able to present.
    pub fn present_queue(&self) -> Result<&BoundQueue> {
        self.queues_with(QueueCapabilities::PRESENT)
            .next()
            .ok_or(GpuError::MissingPresentQueue)
    }

    /// Split into the device, its creation config and the queue table.
    pub fn into_parts(self) -> (D, DeviceCreateConfig, Vec<BoundQueue>) {
        (self.device, self.config, self.queues)
    }
}

/// Create the logical device for `device` and bind its queues.
pub fn build_logical_device<B: DeviceBackend + ?Sized>(
    backend: &B,
    device: &PhysicalDeviceDescriptor,
    families: &[QueueFamilyRecord],
) -> Result<LogicalDevice<B::Device>> {
    let config = DeviceCreateConfig::new(device, families);

    let logical = backend
        .create_device(device.handle, &config)
        .map_err(GpuError::DeviceCreation)?;

    // Families without capabilities were not requested, so they have no queue
    let queues = families
        .iter()
        .filter(|family| !family.capabilities.is_empty())
        .map(|&family| BoundQueue {
            family,
            queue: backend.device_queue(&logical, family.index, 0),
        })
        .collect();

    tracing::debug!(
        "Created logical device with queue families {:?}",
        config.queue_family_indices
    );

    Ok(LogicalDevice {
        device: logical,
        physical_device: device.handle,
        config,
        queues,
    })
}

/// Where a [`LogicalDeviceBuilder`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Uninitialized,
    FamiliesResolved,
    Created,
    /// Terminal. Start over with a new builder.
    Failed,
}

/// Drives family resolution and device creation for one physical device.
pub struct LogicalDeviceBuilder<'a, B: DeviceBackend + ?Sized> {
    backend: &'a B,
    device: &'a PhysicalDeviceDescriptor,
    families: Vec<QueueFamilyRecord>,
    state: BuildState,
}

impl<'a, B: DeviceBackend + ?Sized> LogicalDeviceBuilder<'a, B> {
    pub const fn new(backend: &'a B, device: &'a PhysicalDeviceDescriptor) -> Self {
        Self {
            backend,
            device,
            families: Vec::new(),
            state: BuildState::Uninitialized,
        }
    }

    pub const fn state(&self) -> BuildState {
        self.state
    }

    /// Resolved families; empty before [`Self::resolve_families`].
    pub fn families(&self) -> &[QueueFamilyRecord] {
        &self.families
    }

    fn expect_state(&self, expected: BuildState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(GpuError::InvalidState(format!(
                "logical device builder is {:?}, expected {:?}",
                self.state, expected
            )))
        }
    }

    /// Classify the device's queue families.
    pub fn resolve_families(&mut self) -> Result<&[QueueFamilyRecord]> {
        self.expect_state(BuildState::Uninitialized)?;

        match resolve_families(self.backend, self.device) {
            Ok(families) => {
                self.families = families;
                self.state = BuildState::FamiliesResolved;
                Ok(&self.families)
            }
            Err(e) => {
                self.state = BuildState::Failed;
                Err(e)
            }
        }
    }

    /// Create the logical device from the resolved families.
    pub fn create(&mut self) -> Result<LogicalDevice<B::Device>> {
        self.expect_state(BuildState::FamiliesResolved)?;

        let result = build_logical_device(self.backend, self.device, &self.families);
        self.state = if result.is_ok() {
            BuildState::Created
        } else {
            BuildState::Failed
        };
        result
    }
}

/// Select the best device with `scorer` and create a logical device on it.
///
/// Returns the chosen descriptor alongside the device.
pub fn create_logical_device<B, S>(
    backend: &B,
    scorer: &S,
) -> Result<(PhysicalDeviceDescriptor, LogicalDevice<B::Device>)>
where
    B: DeviceBackend + ?Sized,
    S: DeviceScorer + ?Sized,
{
    let candidates = enumerate_devices(backend)?;
    let selected = select_best_device(&candidates, scorer)?.clone();

    let mut builder = LogicalDeviceBuilder::new(backend, &selected);
    builder.resolve_families()?;
    let logical = builder.create()?;

    Ok((selected, logical))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::DEFAULT_SCORER;
    use crate::testing::{FakeBackend, FakeDevice};
    use std::cell::Cell;

    fn record(index: u32, capabilities: QueueCapabilities) -> QueueFamilyRecord {
        QueueFamilyRecord {
            index,
            capabilities,
        }
    }

    #[test]
    fn shared_family_index_is_requested_once() {
        let backend = FakeBackend::new(vec![FakeDevice::discrete("gpu")]);
        let device = backend.describe(0);
        let families = [
            record(0, QueueCapabilities::GRAPHICS),
            record(0, QueueCapabilities::PRESENT),
        ];

        build_logical_device(&backend, &device, &families).unwrap();

        let configs = backend.created_configs();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].queue_family_indices, vec![0]);
    }

    #[test]
    fn one_queue_per_distinct_family() {
        let backend = FakeBackend::new(vec![FakeDevice::discrete("gpu")]);
        let device = backend.describe(0);
        let families = [
            record(2, QueueCapabilities::TRANSFER),
            record(0, QueueCapabilities::GRAPHICS | QueueCapabilities::PRESENT),
            record(1, QueueCapabilities::COMPUTE),
            record(3, QueueCapabilities::empty()),
        ];

        let logical = build_logical_device(&backend, &device, &families).unwrap();

        let config = logical.create_config();
        assert_eq!(config.queue_family_indices, vec![0, 1, 2]);
        assert_eq!(config.queue_priority, 1.0);
        assert_eq!(logical.queues().len(), 3);
        assert_eq!(backend.queue_requests(), vec![(2, 0), (0, 0), (1, 0)]);
    }

    #[test]
    fn anisotropy_is_always_requested() {
        let backend = FakeBackend::new(vec![FakeDevice::discrete("gpu")
            .anisotropy(false)
            .geometry_shader(true)]);
        let device = backend.describe(0);
        let families = [record(0, QueueCapabilities::all())];

        build_logical_device(&backend, &device, &families).unwrap();

        let config = &backend.created_configs()[0];
        assert!(config.sampler_anisotropy);
        let features = config.enabled_features();
        assert_eq!(features.sampler_anisotropy, vk::TRUE);
        assert_eq!(features.geometry_shader, vk::TRUE);
        assert_eq!(config.enabled_extensions, vec!["VK_KHR_swapchain".to_string()]);
    }

    #[test]
    fn driver_rejection_surfaces_native_code() {
        let backend = FakeBackend::new(vec![FakeDevice::discrete("no aniso")
            .reject_device_creation(vk::Result::ERROR_FEATURE_NOT_PRESENT)]);
        let device = backend.describe(0);
        let families = [record(0, QueueCapabilities::all())];

        let err = build_logical_device(&backend, &device, &families)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            GpuError::DeviceCreation(vk::Result::ERROR_FEATURE_NOT_PRESENT)
        ));
    }

    #[test]
    fn queue_lookup_by_capability() {
        let backend = FakeBackend::new(vec![FakeDevice::discrete("gpu")]);
        let device = backend.describe(0);
        let families = [
            record(0, QueueCapabilities::GRAPHICS | QueueCapabilities::COMPUTE),
            record(1, QueueCapabilities::PRESENT),
        ];

        let logical = build_logical_device(&backend, &device, &families).unwrap();

        assert_eq!(logical.graphics_queue().unwrap().family.index, 0);
        assert_eq!(logical.present_queue().unwrap().family.index, 1);
        assert_eq!(logical.queues_with(QueueCapabilities::TRANSFER).count(), 0);
        assert_ne!(
            logical.graphics_queue().unwrap().queue,
            logical.present_queue().unwrap().queue
        );
    }

    #[test]
    fn builder_walks_states() {
        let backend = FakeBackend::new(vec![FakeDevice::discrete("gpu")]);
        let device = backend.describe(0);
        let mut builder = LogicalDeviceBuilder::new(&backend, &device);
        assert_eq!(builder.state(), BuildState::Uninitialized);

        builder.resolve_families().unwrap();
        assert_eq!(builder.state(), BuildState::FamiliesResolved);
        assert_eq!(builder.families().len(), 1);

        builder.create().unwrap();
        assert_eq!(builder.state(), BuildState::Created);

        assert!(matches!(builder.create(), Err(GpuError::InvalidState(_))));
    }

    #[test]
    fn builder_refuses_create_before_resolution() {
        let backend = FakeBackend::new(vec![FakeDevice::discrete("gpu")]);
        let device = backend.describe(0);
        let mut builder = LogicalDeviceBuilder::new(&backend, &device);

        assert!(matches!(builder.create(), Err(GpuError::InvalidState(_))));
        assert!(backend.created_configs().is_empty());
    }

    #[test]
    fn failed_creation_is_terminal() {
        let backend = FakeBackend::new(vec![FakeDevice::discrete("gpu")
            .reject_device_creation(vk::Result::ERROR_INITIALIZATION_FAILED)]);
        let device = backend.describe(0);
        let mut builder = LogicalDeviceBuilder::new(&backend, &device);

        builder.resolve_families().unwrap();
        assert!(matches!(builder.create(), Err(GpuError::DeviceCreation(_))));
        assert_eq!(builder.state(), BuildState::Failed);

        assert!(matches!(builder.create(), Err(GpuError::InvalidState(_))));
        assert!(matches!(
            builder.resolve_families(),
            Err(GpuError::InvalidState(_))
        ));
        assert_eq!(backend.created_configs().len(), 1);
    }

    #[test]
    fn failed_resolution_is_terminal() {
        let backend =
            FakeBackend::new(vec![FakeDevice::discrete("offscreen").present_families(Vec::new())]);
        let device = backend.describe(0);
        let mut builder = LogicalDeviceBuilder::new(&backend, &device);

        assert!(matches!(
            builder.resolve_families(),
            Err(GpuError::MissingPresentQueue)
        ));
        assert_eq!(builder.state(), BuildState::Failed);
    }

    #[test]
    fn default_pipeline_picks_best_and_creates() {
        let backend = FakeBackend::new(vec![
            FakeDevice::discrete("A")
                .max_image_dimension(4096)
                .anisotropy(true)
                .geometry_shader(true),
            FakeDevice::integrated("B").max_image_dimension(8192).ray_tracing(true),
        ]);

        let (selected, logical) = create_logical_device(&backend, &DEFAULT_SCORER).unwrap();

        assert_eq!(selected.device_name, "B");
        assert_eq!(logical.physical_device(), backend.handle(1));
        assert_eq!(logical.device().physical_device, backend.handle(1));
    }

    #[test]
    fn zero_devices_fails_before_scoring() {
        let backend = FakeBackend::new(Vec::new());
        let calls = Cell::new(0);
        let counting = |d: &PhysicalDeviceDescriptor| {
            calls.set(calls.get() + 1);
            DEFAULT_SCORER.score(d)
        };

        assert!(matches!(
            create_logical_device(&backend, &counting),
            Err(GpuError::NoDevicesFound)
        ));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn present_gap_between_scoring_and_resolution() {
        // Passes the scorer gate (graphics/compute/transfer exist) but
        // nothing can present, so it is selected and then fails resolution.
        let backend =
            FakeBackend::new(vec![FakeDevice::discrete("offscreen").present_families(Vec::new())]);

        let descriptor = backend.describe(0);
        assert!(DEFAULT_SCORER.score(&descriptor) > 0.0);

        assert!(matches!(
            create_logical_device(&backend, &DEFAULT_SCORER),
            Err(GpuError::MissingPresentQueue)
        ));
        assert!(backend.created_configs().is_empty());
    }
}
