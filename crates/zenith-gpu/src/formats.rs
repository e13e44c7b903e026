//! Default image formats and their support checks.

use crate::backend::DeviceBackend;
use crate::error::{GpuError, Result};
use ash::vk;

/// Default color attachment format.
pub const DEFAULT_COLOR_FORMAT: vk::Format = vk::Format::B8G8R8A8_SRGB;

/// Default depth attachment format.
pub const DEFAULT_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Check that `format` has `features` with optimal tiling.
pub fn require_format<B: DeviceBackend + ?Sized>(
    backend: &B,
    physical_device: vk::PhysicalDevice,
    format: vk::Format,
    features: vk::FormatFeatureFlags,
    usage: &'static str,
) -> Result<vk::Format> {
    let properties = backend.format_properties(physical_device, format);
    if properties.optimal_tiling_features.contains(features) {
        Ok(format)
    } else {
        Err(GpuError::FormatNotSupported { format, usage })
    }
}

/// The default color format, if usable as a color attachment.
pub fn color_format<B: DeviceBackend + ?Sized>(
    backend: &B,
    physical_device: vk::PhysicalDevice,
) -> Result<vk::Format> {
    require_format(
        backend,
        physical_device,
        DEFAULT_COLOR_FORMAT,
        vk::FormatFeatureFlags::COLOR_ATTACHMENT,
        "color attachment",
    )
}

/// The default depth format, if usable as a depth attachment.
pub fn depth_format<B: DeviceBackend + ?Sized>(
    backend: &B,
    physical_device: vk::PhysicalDevice,
) -> Result<vk::Format> {
    require_format(
        backend,
        physical_device,
        DEFAULT_DEPTH_FORMAT,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        "depth attachment",
    )
}
