//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// The backend enumerated zero physical devices.
    #[error("No Vulkan-compatible devices found")]
    NoDevicesFound,

    /// Every candidate device was disqualified by the scorer.
    #[error("No suitable Vulkan device found")]
    NoSuitableDevice,

    /// The chosen device reports no queue families at all.
    #[error("No queue families found for the physical device")]
    NoQueueFamilies,

    /// No queue family supports graphics.
    #[error("No graphics queue found for the physical device")]
    MissingGraphicsQueue,

    /// No queue family can present to the target surface.
    #[error("No present queue found for the physical device")]
    MissingPresentQueue,

    /// The driver rejected the logical device request.
    #[error("Failed to create logical device: {0}")]
    DeviceCreation(vk::Result),

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader compilation or module creation failed.
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// Format cannot be used the way it was requested.
    #[error("Format {format:?} is not supported as {usage}")]
    FormatNotSupported {
        format: vk::Format,
        usage: &'static str,
    },

    /// Render pass attachments are inconsistent.
    #[error("Invalid render attachment: {0}")]
    InvalidAttachment(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// A texture file could not be decoded.
    #[error("Failed to load texture: {0}")]
    TextureLoad(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl From<zenith_shaders::ShaderError> for GpuError {
    fn from(err: zenith_shaders::ShaderError) -> Self {
        Self::ShaderCompilation(err.to_string())
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_creation_message_is_readable() {
        let err = GpuError::DeviceCreation(vk::Result::ERROR_FEATURE_NOT_PRESENT);
        let message = err.to_string();
        assert!(message.starts_with("Failed to create logical device: "));
        assert!(message.len() > "Failed to create logical device: ".len());
    }

    #[test]
    fn shader_errors_convert() {
        let err: GpuError = zenith_shaders::ShaderError::Empty.into();
        assert!(matches!(err, GpuError::ShaderCompilation(_)));
    }
}
