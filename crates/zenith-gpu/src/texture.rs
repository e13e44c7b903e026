//! Sampled 2D textures uploaded through a staging buffer.

use crate::command::{execute_one_shot, CommandPool};
use crate::context::GpuContext;
use crate::descriptors::write_combined_image_sampler;
use crate::error::{GpuError, Result};
use crate::memory::{create_image_view, single_subresource_range, GpuBuffer, GpuImage};
use ash::vk;
use gpu_allocator::MemoryLocation;

/// Format every texture is stored in.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Upper bound for anisotropic filtering when the device allows it.
pub const MAX_ANISOTROPY: f32 = 16.0;

/// Tightly packed RGBA8 pixels.
#[derive(Debug, Clone)]
pub struct TextureData {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TextureData {
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(GpuError::InvalidState(format!(
                "Texture extent {width}x{height} is empty"
            )));
        }

        let expected = u64::from(width) * u64::from(height) * 4;
        if pixels.len() as u64 != expected {
            return Err(GpuError::InvalidState(format!(
                "{width}x{height} RGBA texture needs {expected} bytes, got {}",
                pixels.len()
            )));
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decode an image file, converting it to RGBA8.
    #[cfg(feature = "image")]
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .map_err(|e| GpuError::TextureLoad(format!("{}: {e}", path.display())))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        Self::from_rgba8(width, height, image.into_raw())
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub const fn extent(&self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.width,
            height: self.height,
            depth: 1,
        }
    }
}

/// Device-local image, its view and a sampler.
pub struct Texture {
    image: GpuImage,
    view: vk::ImageView,
    sampler: vk::Sampler,
}

impl Texture {
    /// Copy `data` into a new device-local image and leave it shader-readable.
    ///
    /// Blocks until the copy has finished on the graphics queue.
    ///
    /// # Safety
    /// `pool` must belong to the context's graphics queue family.
    pub unsafe fn upload(
        context: &GpuContext,
        pool: &CommandPool,
        data: &TextureData,
    ) -> Result<Self> {
        let device = context.device();
        let queue = context.graphics_queue()?.queue;
        let extent = data.extent();

        let mut allocator = context.allocator().lock();
        let mut staging = allocator.upload_buffer(
            data.pixels(),
            vk::BufferUsageFlags::TRANSFER_SRC,
            "texture staging",
        )?;

        let mut image = match allocator.create_image(
            &texture_image_info(extent),
            MemoryLocation::GpuOnly,
            "texture",
        ) {
            Ok(image) => image,
            Err(e) => {
                allocator.free_buffer(&mut staging)?;
                return Err(e);
            }
        };

        let copied = unsafe {
            execute_one_shot(device, pool, queue, |cmd| {
                record_upload(device, cmd, &staging, &image);
            })
        };
        allocator.free_buffer(&mut staging)?;
        if let Err(e) = copied {
            allocator.free_image(&mut image)?;
            return Err(e);
        }

        let view = unsafe { create_image_view(device, &image, vk::ImageAspectFlags::COLOR) };
        let view = match view {
            Ok(view) => view,
            Err(e) => {
                allocator.free_image(&mut image)?;
                return Err(e);
            }
        };

        let anisotropy = context.create_config().sampler_anisotropy.then_some(MAX_ANISOTROPY);
        let sampler = unsafe { device.create_sampler(&sampler_info(anisotropy), None) };
        let sampler = match sampler {
            Ok(sampler) => sampler,
            Err(e) => {
                unsafe { device.destroy_image_view(view, None) };
                allocator.free_image(&mut image)?;
                return Err(e.into());
            }
        };

        tracing::debug!("Uploaded {}x{} texture", extent.width, extent.height);

        Ok(Self {
            image,
            view,
            sampler,
        })
    }

    pub const fn view(&self) -> vk::ImageView {
        self.view
    }

    pub const fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    pub const fn extent(&self) -> vk::Extent3D {
        self.image.extent
    }

    /// Point `binding` of `set` at this texture as a combined image sampler.
    ///
    /// # Safety
    /// The device and set must be valid.
    pub unsafe fn write_descriptor(
        &self,
        device: &ash::Device,
        set: vk::DescriptorSet,
        binding: u32,
    ) {
        unsafe { write_combined_image_sampler(device, set, binding, self.view, self.sampler) };
    }

    /// # Safety
    /// The texture must not be in use.
    pub unsafe fn destroy(&mut self, context: &GpuContext) -> Result<()> {
        unsafe {
            context.device().destroy_sampler(self.sampler, None);
            context.device().destroy_image_view(self.view, None);
        }
        self.sampler = vk::Sampler::null();
        self.view = vk::ImageView::null();
        context.allocator().lock().free_image(&mut self.image)
    }
}

/// Record the staging copy between the two layout transitions.
///
/// # Safety
/// `cmd` must be recording on `device`.
unsafe fn record_upload(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    staging: &GpuBuffer,
    image: &GpuImage,
) {
    let [to_transfer, to_shader] = upload_barriers(image.image);
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_transfer],
        );
        device.cmd_copy_buffer_to_image(
            cmd,
            staging.buffer,
            image.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[copy_region(image.extent)],
        );
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_shader],
        );
    }
}

/// Create info for a sampled, transfer-writable texture image.
pub fn texture_image_info(extent: vk::Extent3D) -> vk::ImageCreateInfo<'static> {
    vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(TEXTURE_FORMAT)
        .extent(extent)
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
}

/// Undefined to transfer-dst, then transfer-dst to shader-read.
pub fn upload_barriers(image: vk::Image) -> [vk::ImageMemoryBarrier<'static>; 2] {
    let barrier = vk::ImageMemoryBarrier::default()
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(single_subresource_range(vk::ImageAspectFlags::COLOR));

    [
        barrier
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE),
        barrier
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ),
    ]
}

/// Copy of a tightly packed buffer into mip 0 of the image.
pub fn copy_region(extent: vk::Extent3D) -> vk::BufferImageCopy {
    vk::BufferImageCopy::default()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(
            vk::ImageSubresourceLayers::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .mip_level(0)
                .base_array_layer(0)
                .layer_count(1),
        )
        .image_extent(extent)
}

/// Linear, repeating sampler. `anisotropy` enables anisotropic filtering.
pub fn sampler_info(anisotropy: Option<f32>) -> vk::SamplerCreateInfo<'static> {
    let info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .min_lod(0.0)
        .max_lod(0.0);

    match anisotropy {
        Some(max) => info.anisotropy_enable(true).max_anisotropy(max),
        None => info.anisotropy_enable(false).max_anisotropy(1.0),
    }
}
