//! Vulkan instance creation.

use crate::config::{InstanceConfig, VALIDATION_LAYER};
use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::collections::BTreeSet;
use std::ffi::{c_char, CString};

/// Presentation surface supplied by the window.
pub struct Surface {
    /// Surface extension loader.
    pub loader: ash::khr::surface::Instance,
    /// The Vulkan surface handle.
    pub handle: vk::SurfaceKHR,
    /// Pixel size of the window at creation time.
    pub extent: vk::Extent2D,
}

/// Loaded entry point, instance and optional presentation surface.
pub struct VulkanInstance {
    entry: ash::Entry,
    instance: ash::Instance,
    surface: Option<Surface>,
    validation_enabled: bool,
}

impl VulkanInstance {
    /// Create an instance without a surface.
    ///
    /// Good for enumerating and scoring devices. Queue resolution will fail
    /// with [`GpuError::MissingPresentQueue`] since nothing can present.
    pub fn headless(config: &InstanceConfig) -> Result<Self> {
        let entry = load_entry()?;
        let (instance, validation_enabled) = unsafe { create_instance(&entry, config, &[]) }?;

        Ok(Self {
            entry,
            instance,
            surface: None,
            validation_enabled,
        })
    }

    /// Create an instance and a surface for `window`.
    ///
    /// `extent` is the window's size in pixels; the window itself is never
    /// owned and must outlive the instance.
    pub fn with_window<W>(config: &InstanceConfig, window: &W, extent: vk::Extent2D) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?
            .as_raw();

        let entry = load_entry()?;
        let surface_extensions = ash_window::enumerate_required_extensions(display)
            .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let (instance, validation_enabled) =
            unsafe { create_instance(&entry, config, surface_extensions) }?;

        let created = unsafe {
            ash_window::create_surface(&entry, &instance, display, window_handle, None)
        };
        let handle = match created {
            Ok(handle) => handle,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(GpuError::SurfaceCreation(e.to_string()));
            }
        };

        let loader = ash::khr::surface::Instance::new(&entry, &instance);

        Ok(Self {
            entry,
            instance,
            surface: Some(Surface {
                loader,
                handle,
                extent,
            }),
            validation_enabled,
        })
    }

    /// Get the Vulkan entry point.
    pub const fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance handle.
    pub const fn raw(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the presentation surface, if any.
    pub const fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    /// Whether the validation layer was actually enabled.
    pub const fn validation_enabled(&self) -> bool {
        self.validation_enabled
    }

    /// Update the stored window extent after a resize.
    pub fn set_extent(&mut self, extent: vk::Extent2D) {
        if let Some(surface) = self.surface.as_mut() {
            surface.extent = extent;
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some(surface) = self.surface.take() {
                surface.loader.destroy_surface(surface.handle, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn load_entry() -> Result<ash::Entry> {
    unsafe { ash::Entry::load() }
        .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))
}

/// Requested extensions that are not in `available`.
pub fn missing_extensions<'a>(
    requested: &'a [String],
    available: &BTreeSet<String>,
) -> Vec<&'a str> {
    requested
        .iter()
        .filter(|ext| !available.contains(*ext))
        .map(String::as_str)
        .collect()
}

/// Layers to enable: the validation layer when asked for and installed.
pub fn select_layers(validation: bool, available: &BTreeSet<String>) -> Vec<&'static str> {
    if !validation {
        return Vec::new();
    }
    if available.contains(VALIDATION_LAYER) {
        vec![VALIDATION_LAYER]
    } else {
        tracing::warn!("Validation layer {} not available, skipping", VALIDATION_LAYER);
        Vec::new()
    }
}

fn to_cstrings<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Vec<CString>> {
    names
        .into_iter()
        .map(|name| CString::new(name).map_err(|e| GpuError::Other(e.to_string())))
        .collect()
}

/// Create a Vulkan instance.
///
/// Returns the instance and whether validation ended up enabled.
///
/// # Safety
/// The entry must be a valid Vulkan entry point, and `surface_extensions`
/// must point to valid NUL-terminated names.
unsafe fn create_instance(
    entry: &ash::Entry,
    config: &InstanceConfig,
    surface_extensions: &[*const c_char],
) -> Result<(ash::Instance, bool)> {
    let app_name =
        CString::new(config.app_name.as_str()).map_err(|e| GpuError::Other(e.to_string()))?;
    let engine_name =
        CString::new(config.engine_name.as_str()).map_err(|e| GpuError::Other(e.to_string()))?;
    let (major, minor, patch) = config.app_version;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, major, minor, patch))
        .engine_name(&engine_name)
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(config.effective_api_version());

    let available_extensions: BTreeSet<String> = unsafe {
        entry.enumerate_instance_extension_properties(None)?
    }
    .iter()
    .filter_map(|ext| ext.extension_name_as_c_str().ok())
    .map(|name| name.to_string_lossy().into_owned())
    .collect();

    let missing = missing_extensions(&config.extra_extensions, &available_extensions);
    if let Some(name) = missing.first() {
        return Err(GpuError::ExtensionNotSupported((*name).to_string()));
    }

    let extra_extensions = to_cstrings(config.extra_extensions.iter().map(String::as_str))?;
    #[allow(unused_mut)]
    let mut extension_names: Vec<*const c_char> = surface_extensions.to_vec();
    extension_names.extend(extra_extensions.iter().map(|ext| ext.as_ptr()));

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    {
        extension_names.push(ash::khr::portability_enumeration::NAME.as_ptr());
        extension_names.push(ash::khr::get_physical_device_properties2::NAME.as_ptr());
    }
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let available_layers: BTreeSet<String> = unsafe { entry.enumerate_instance_layer_properties()? }
        .iter()
        .filter_map(|layer| layer.layer_name_as_c_str().ok())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();
    let layers = to_cstrings(select_layers(config.validation, &available_layers))?;
    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = unsafe { entry.create_instance(&create_info, None)? };

    tracing::debug!(
        "Created Vulkan instance for {} ({} extensions, {} layers)",
        config.app_name,
        extension_names.len(),
        layer_names.len()
    );

    Ok((instance, !layer_names.is_empty()))
}
