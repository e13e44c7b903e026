//! Swapchain management.
//!
//! [`Presentable`] owns the swapchain built on the instance's surface. The
//! choice helpers are free functions over the surface's reported support.

use crate::config::SwapchainConfig;
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::formats::DEFAULT_COLOR_FORMAT;
use ash::vk;

/// What a surface supports on one physical device.
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Query the instance's surface for the context's device.
    pub fn query(context: &GpuContext) -> Result<Self> {
        let surface = context
            .instance()
            .surface()
            .ok_or_else(|| GpuError::SwapchainCreation("Instance has no surface".to_string()))?;
        let physical_device = context.physical_device();

        unsafe {
            Ok(Self {
                capabilities: surface
                    .loader
                    .get_physical_device_surface_capabilities(physical_device, surface.handle)?,
                formats: surface
                    .loader
                    .get_physical_device_surface_formats(physical_device, surface.handle)?,
                present_modes: surface
                    .loader
                    .get_physical_device_surface_present_modes(physical_device, surface.handle)?,
            })
        }
    }
}

/// Swapchain, its images and their views.
pub struct Presentable {
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl Presentable {
    /// Create a swapchain for the context's surface at the window's extent.
    pub fn new(context: &GpuContext, config: &SwapchainConfig) -> Result<Self> {
        let loader = ash::khr::swapchain::Device::new(context.instance().raw(), context.device());
        unsafe { Self::create(context, config, loader, vk::SwapchainKHR::null()) }
    }

    /// Replace the swapchain after a resize, reusing the old one as a hint.
    ///
    /// # Safety
    /// No image of the current swapchain may still be in use.
    pub unsafe fn recreate(
        &mut self,
        context: &GpuContext,
        config: &SwapchainConfig,
    ) -> Result<()> {
        let loader = self.loader.clone();
        let replacement = unsafe { Self::create(context, config, loader, self.swapchain) }?;
        let mut old = std::mem::replace(self, replacement);
        unsafe { old.destroy(context.device()) };
        Ok(())
    }

    unsafe fn create(
        context: &GpuContext,
        config: &SwapchainConfig,
        loader: ash::khr::swapchain::Device,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Self> {
        let support = SurfaceSupport::query(context)?;
        let surface = context
            .instance()
            .surface()
            .ok_or_else(|| GpuError::SwapchainCreation("Instance has no surface".to_string()))?;

        let format = select_surface_format(&support.formats)?;
        let present_mode = select_present_mode(&support.present_modes, config.vsync);
        let extent = calculate_extent(&support.capabilities, surface.extent);
        let image_count = image_count(&support.capabilities);

        let graphics = context.graphics_queue()?.family.index;
        let present = context.present_queue()?.family.index;
        let (sharing_mode, family_indices) = sharing_mode(graphics, present);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(config.image_usage)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let mut presentable = Self {
            loader,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            format,
            present_mode,
            extent,
        };

        // On failure, destroy whatever was created so far
        if let Err(e) = unsafe { presentable.create_views(context.device()) } {
            unsafe { presentable.destroy(context.device()) };
            return Err(e);
        }

        tracing::info!(
            "Created swapchain: {}x{} {:?} {:?}, {} images",
            extent.width,
            extent.height,
            format.format,
            present_mode,
            presentable.images.len()
        );

        Ok(presentable)
    }

    unsafe fn create_views(&mut self, device: &ash::Device) -> Result<()> {
        self.images = unsafe { self.loader.get_swapchain_images(self.swapchain)? };

        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );
            let view = unsafe { device.create_image_view(&view_info, None)? };
            self.image_views.push(view);
        }
        Ok(())
    }

    pub const fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    pub const fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub const fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Acquire the next image, signalling `semaphore`.
    ///
    /// Returns the image index and whether the swapchain is suboptimal.
    /// `ERROR_OUT_OF_DATE_KHR` means no image was acquired and the caller
    /// must [`Self::recreate`].
    ///
    /// # Safety
    /// The semaphore must be unsignalled and not in use.
    pub unsafe fn acquire(&self, semaphore: vk::Semaphore) -> Result<(u32, bool)> {
        Ok(unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())?
        })
    }

    /// Present `image_index` on `queue` after `wait_semaphores`.
    ///
    /// Returns `true` when the swapchain should be recreated.
    ///
    /// # Safety
    /// `queue` must support presentation and the image must have been acquired.
    pub unsafe fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Destroy the image views and the swapchain.
    ///
    /// # Safety
    /// Nothing may still use the swapchain images.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            for view in self.image_views.drain(..) {
                device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
            }
        }
        self.images.clear();
        self.swapchain = vk::SwapchainKHR::null();
    }
}

/// Prefer the default sRGB format, else take the first reported one.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|f| {
            f.format == DEFAULT_COLOR_FORMAT && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
        .ok_or_else(|| GpuError::SwapchainCreation("Surface reports no formats".to_string()))
}

/// FIFO with vsync; otherwise mailbox when available, falling back to FIFO.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync && available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        // Always supported
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, or `desired` clamped to its limits when the
/// surface leaves it to the swapchain.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: desired.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: desired.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum when there is one.
pub fn image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Concurrent sharing across two families, exclusive for one.
pub fn sharing_mode(graphics_family: u32, present_family: u32) -> (vk::SharingMode, Vec<u32>) {
    if graphics_family == present_family {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![graphics_family, present_family],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn prefers_srgb_format() {
        let available = [
            surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(
            select_surface_format(&available).unwrap().format,
            vk::Format::B8G8R8A8_SRGB
        );
    }

    #[test]
    fn falls_back_to_first_format() {
        let available = [
            surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(
            select_surface_format(&available).unwrap().format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn no_formats_is_an_error() {
        assert!(matches!(
            select_surface_format(&[]),
            Err(GpuError::SwapchainCreation(_))
        ));
    }

    #[test]
    fn vsync_always_fifo() {
        let available = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(select_present_mode(&available, true), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn mailbox_preferred_without_vsync() {
        let available = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(select_present_mode(&available, false), vk::PresentModeKHR::MAILBOX);

        let available = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(select_present_mode(&available, false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn current_extent_wins() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(800, 600),
            ..Default::default()
        };
        assert_eq!(calculate_extent(&capabilities, extent(1920, 1080)), extent(800, 600));
    }

    #[test]
    fn undefined_extent_is_clamped() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(64, 64),
            max_image_extent: extent(1024, 1024),
            ..Default::default()
        };
        assert_eq!(calculate_extent(&capabilities, extent(2000, 10)), extent(1024, 64));
    }

    #[test]
    fn image_count_respects_maximum() {
        let mut capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(image_count(&capabilities), 3);

        capabilities.max_image_count = 2;
        assert_eq!(image_count(&capabilities), 2);
    }

    #[test]
    fn distinct_families_share_concurrently() {
        assert_eq!(sharing_mode(0, 0), (vk::SharingMode::EXCLUSIVE, Vec::new()));
        assert_eq!(
            sharing_mode(0, 2),
            (vk::SharingMode::CONCURRENT, vec![0, 2])
        );
    }
}
