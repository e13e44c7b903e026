//! Instance and swapchain configuration.

use ash::vk;

/// Validation layer enabled when [`InstanceConfig::validation`] is set.
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Lowest API version an instance is created with.
pub const MIN_API_VERSION: u32 = vk::API_VERSION_1_1;

/// Settings for creating a [`crate::VulkanInstance`].
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Application name reported to the driver.
    pub app_name: String,
    /// Application version as (major, minor, patch).
    pub app_version: (u32, u32, u32),
    /// Engine name reported to the driver.
    pub engine_name: String,
    /// Requested Vulkan API version. Anything below 1.1 is raised to 1.1
    /// when the instance is created.
    pub api_version: u32,
    /// Enable the Khronos validation layer if it is installed.
    pub validation: bool,
    /// Instance extensions on top of what the window needs.
    pub extra_extensions: Vec<String>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            app_name: "Zenith".to_string(),
            app_version: (1, 0, 0),
            engine_name: "Zenith".to_string(),
            api_version: vk::API_VERSION_1_2,
            validation: cfg!(debug_assertions),
            extra_extensions: Vec::new(),
        }
    }
}

impl InstanceConfig {
    /// Create a new config with the given application name.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Set the application version.
    pub const fn with_app_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.app_version = (major, minor, patch);
        self
    }

    /// Set the requested API version, raised to at least 1.1.
    pub const fn with_api_version(mut self, api_version: u32) -> Self {
        self.api_version = api_version;
        self.api_version = self.effective_api_version();
        self
    }

    /// API version passed to the driver.
    ///
    /// `vkGetPhysicalDeviceFeatures2` is core in 1.1, so older requests are
    /// raised to it.
    pub const fn effective_api_version(&self) -> u32 {
        if self.api_version < MIN_API_VERSION {
            MIN_API_VERSION
        } else {
            self.api_version
        }
    }

    /// Enable or disable validation layers.
    pub const fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Require an additional instance extension.
    pub fn with_extension(mut self, name: impl Into<String>) -> Self {
        self.extra_extensions.push(name.into());
        self
    }
}

/// Settings for creating a [`crate::Presentable`].
#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    /// Wait for vertical blank (FIFO) instead of preferring mailbox.
    pub vsync: bool,
    /// Image usage of the swapchain images.
    pub image_usage: vk::ImageUsageFlags,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            vsync: false,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        }
    }
}

impl SwapchainConfig {
    /// Enable or disable vsync.
    pub const fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Add usage flags to the swapchain images.
    pub fn with_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.image_usage |= usage;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_builder_chains() {
        let config = InstanceConfig::new("triangle")
            .with_app_version(0, 2, 1)
            .with_validation(false)
            .with_extension("VK_EXT_debug_utils");

        assert_eq!(config.app_name, "triangle");
        assert_eq!(config.engine_name, "Zenith");
        assert_eq!(config.app_version, (0, 2, 1));
        assert!(!config.validation);
        assert_eq!(config.extra_extensions, vec!["VK_EXT_debug_utils".to_string()]);
    }

    #[test]
    fn api_version_is_raised_to_1_1() {
        let config = InstanceConfig::default().with_api_version(vk::API_VERSION_1_0);
        assert_eq!(config.api_version, vk::API_VERSION_1_1);

        let config = InstanceConfig::default().with_api_version(vk::API_VERSION_1_3);
        assert_eq!(config.api_version, vk::API_VERSION_1_3);

        let config = InstanceConfig {
            api_version: vk::API_VERSION_1_0,
            ..Default::default()
        };
        assert_eq!(config.effective_api_version(), vk::API_VERSION_1_1);
        assert_eq!(InstanceConfig::default().effective_api_version(), vk::API_VERSION_1_2);
    }

    #[test]
    fn swapchain_defaults_prefer_low_latency() {
        let config = SwapchainConfig::default();
        assert!(!config.vsync);
        assert_eq!(config.image_usage, vk::ImageUsageFlags::COLOR_ATTACHMENT);

        let config = config
            .with_vsync(true)
            .with_usage(vk::ImageUsageFlags::TRANSFER_DST);
        assert!(config.vsync);
        assert!(config.image_usage.contains(vk::ImageUsageFlags::TRANSFER_DST));
        assert!(config.image_usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
    }
}
