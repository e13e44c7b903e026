//! Queue family classification.

use crate::backend::DeviceBackend;
use crate::capabilities::PhysicalDeviceDescriptor;
use crate::error::{GpuError, Result};
use ash::vk;
use bitflags::bitflags;

bitflags! {
    /// What a queue family can be used for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueueCapabilities: u8 {
        const GRAPHICS = 1 << 0;
        const COMPUTE = 1 << 1;
        const TRANSFER = 1 << 2;
        const PRESENT = 1 << 3;
    }
}

impl QueueCapabilities {
    /// Graphics/compute/transfer bits from Vulkan queue flags.
    pub fn from_queue_flags(flags: vk::QueueFlags) -> Self {
        let mut capabilities = Self::empty();
        if flags.contains(vk::QueueFlags::GRAPHICS) {
            capabilities |= Self::GRAPHICS;
        }
        if flags.contains(vk::QueueFlags::COMPUTE) {
            capabilities |= Self::COMPUTE;
        }
        if flags.contains(vk::QueueFlags::TRANSFER) {
            capabilities |= Self::TRANSFER;
        }
        capabilities
    }
}

/// One queue family of a physical device and what it supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyRecord {
    pub index: u32,
    pub capabilities: QueueCapabilities,
}

impl QueueFamilyRecord {
    pub const fn supports(&self, capability: QueueCapabilities) -> bool {
        self.capabilities.contains(capability)
    }
}

/// Classify every queue family of `device`.
///
/// Present support is asked per family index against the backend's target
/// surface. Fails when there are no families, no graphics family or no
/// present family, checked in that order.
pub fn resolve_families<B: DeviceBackend + ?Sized>(
    backend: &B,
    device: &PhysicalDeviceDescriptor,
) -> Result<Vec<QueueFamilyRecord>> {
    let families = backend.queue_family_properties(device.handle);

    let mut records = Vec::with_capacity(families.len());
    for (index, family) in (0u32..).zip(families.iter()) {
        let mut capabilities = QueueCapabilities::from_queue_flags(family.queue_flags);

        if backend.surface_support(device.handle, index)? {
            capabilities |= QueueCapabilities::PRESENT;
        }

        tracing::debug!("Queue family {index}: {capabilities:?}");
        records.push(QueueFamilyRecord {
            index,
            capabilities,
        });
    }

    validate_families(&records)?;
    Ok(records)
}

/// Check that the records can drive rendering and presentation.
pub fn validate_families(records: &[QueueFamilyRecord]) -> Result<()> {
    if records.is_empty() {
        return Err(GpuError::NoQueueFamilies);
    }
    if !records.iter().any(|r| r.supports(QueueCapabilities::GRAPHICS)) {
        return Err(GpuError::MissingGraphicsQueue);
    }
    if !records.iter().any(|r| r.supports(QueueCapabilities::PRESENT)) {
        return Err(GpuError::MissingPresentQueue);
    }
    Ok(())
}

/// All records supporting `capability`, in family order.
pub fn families_with(
    records: &[QueueFamilyRecord],
    capability: QueueCapabilities,
) -> impl Iterator<Item = &QueueFamilyRecord> {
    records.iter().filter(move |r| r.supports(capability))
}
