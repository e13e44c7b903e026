//! Render passes, their attachments and framebuffers.
//!
//! A pass has one subpass with a color attachment first and an optional
//! depth attachment second. Framebuffers are created per swapchain image.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::{create_image_view, GpuImage};
use crate::swapchain::Presentable;
use ash::vk;
use gpu_allocator::MemoryLocation;

/// What happens to an attachment's contents at the start or end of the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentOp {
    Clear,
    Load,
    Store,
    DontCare,
}

impl AttachmentOp {
    /// Load operation. `Store` has no load counterpart.
    pub fn load_op(self) -> Result<vk::AttachmentLoadOp> {
        match self {
            Self::Clear => Ok(vk::AttachmentLoadOp::CLEAR),
            Self::Load => Ok(vk::AttachmentLoadOp::LOAD),
            Self::DontCare => Ok(vk::AttachmentLoadOp::DONT_CARE),
            Self::Store => Err(GpuError::InvalidAttachment(
                "Store is not a load operation".to_string(),
            )),
        }
    }

    /// Store operation. `Clear` and `Load` have no store counterpart.
    pub fn store_op(self) -> Result<vk::AttachmentStoreOp> {
        match self {
            Self::Store => Ok(vk::AttachmentStoreOp::STORE),
            Self::DontCare => Ok(vk::AttachmentStoreOp::DONT_CARE),
            Self::Clear | Self::Load => Err(GpuError::InvalidAttachment(format!(
                "{self:?} is not a store operation"
            ))),
        }
    }
}

/// Role of an attachment in the subpass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentLayout {
    Color,
    Depth,
}

impl AttachmentLayout {
    /// Layout the image is left in when the pass ends.
    pub const fn final_layout(self) -> vk::ImageLayout {
        match self {
            Self::Color => vk::ImageLayout::PRESENT_SRC_KHR,
            Self::Depth => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }

    /// Layout during the subpass.
    pub const fn subpass_layout(self) -> vk::ImageLayout {
        match self {
            Self::Color => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Self::Depth => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }
}

/// One attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderAttachment {
    pub format: vk::Format,
    pub layout: AttachmentLayout,
    pub load: AttachmentOp,
    pub store: AttachmentOp,
    /// Position in the framebuffer's attachment list.
    pub index: u32,
}

impl RenderAttachment {
    /// Color attachment that is cleared and stored.
    pub const fn color(format: vk::Format, index: u32) -> Self {
        Self {
            format,
            layout: AttachmentLayout::Color,
            load: AttachmentOp::Clear,
            store: AttachmentOp::Store,
            index,
        }
    }

    /// Depth attachment that is cleared and stored.
    pub const fn depth(format: vk::Format, index: u32) -> Self {
        Self {
            format,
            layout: AttachmentLayout::Depth,
            load: AttachmentOp::Clear,
            store: AttachmentOp::Store,
            index,
        }
    }

    pub const fn with_load(mut self, load: AttachmentOp) -> Self {
        self.load = load;
        self
    }

    pub const fn with_store(mut self, store: AttachmentOp) -> Self {
        self.store = store;
        self
    }

    /// Vulkan description, starting from an undefined layout.
    pub fn description(&self) -> Result<vk::AttachmentDescription> {
        Ok(vk::AttachmentDescription::default()
            .format(self.format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(self.load.load_op()?)
            .store_op(self.store.store_op()?)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(self.layout.final_layout()))
    }

    pub fn reference(&self) -> vk::AttachmentReference {
        vk::AttachmentReference::default()
            .attachment(self.index)
            .layout(self.layout.subpass_layout())
    }
}

/// Checked attachment list for a single-subpass render pass.
#[derive(Debug, Clone)]
pub struct RenderPassLayout {
    pub descriptions: Vec<vk::AttachmentDescription>,
    pub color: vk::AttachmentReference,
    pub depth: Option<vk::AttachmentReference>,
}

impl RenderPassLayout {
    pub fn new(attachments: &[RenderAttachment]) -> Result<Self> {
        let (color, rest) = attachments.split_first().ok_or_else(|| {
            GpuError::InvalidAttachment("No attachments specified".to_string())
        })?;

        if color.layout != AttachmentLayout::Color {
            return Err(GpuError::InvalidAttachment(
                "The first attachment must be a color attachment".to_string(),
            ));
        }

        for (position, attachment) in (0u32..).zip(attachments) {
            if attachment.index != position {
                return Err(GpuError::InvalidAttachment(format!(
                    "Attachment at position {position} has index {}",
                    attachment.index
                )));
            }
        }

        let depth = match rest {
            [] => None,
            [depth] if depth.layout == AttachmentLayout::Depth => Some(depth.reference()),
            _ => {
                return Err(GpuError::InvalidAttachment(
                    "Only one color and one optional depth attachment are supported".to_string(),
                ))
            }
        };

        let descriptions = attachments
            .iter()
            .map(RenderAttachment::description)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            descriptions,
            color: color.reference(),
            depth,
        })
    }

    pub const fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    /// Dependency from outside the pass into the subpass.
    pub fn dependency(&self) -> vk::SubpassDependency {
        let mut stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let mut access =
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::COLOR_ATTACHMENT_READ;
        if self.has_depth() {
            stages |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
            access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        }

        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stages)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(stages)
            .dst_access_mask(access)
    }

    /// Clear values in attachment order. Depth clears to 1.0.
    pub fn clear_values(&self, color: [f32; 4]) -> Vec<vk::ClearValue> {
        let mut values = vec![vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        }];
        if self.has_depth() {
            values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });
        }
        values
    }

    /// Views for one framebuffer, matching the attachment list.
    pub fn framebuffer_views(
        &self,
        color: vk::ImageView,
        depth: Option<vk::ImageView>,
    ) -> Result<Vec<vk::ImageView>> {
        match (self.has_depth(), depth) {
            (false, None) => Ok(vec![color]),
            (true, Some(depth)) => Ok(vec![color, depth]),
            (true, None) => Err(GpuError::InvalidAttachment(
                "Render pass has a depth attachment but no depth view was given".to_string(),
            )),
            (false, Some(_)) => Err(GpuError::InvalidAttachment(
                "Depth view given for a render pass without depth".to_string(),
            )),
        }
    }
}

/// A render pass and the framebuffers for the current swapchain.
pub struct RenderPass {
    render_pass: vk::RenderPass,
    layout: RenderPassLayout,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
}

impl RenderPass {
    /// Create a render pass without framebuffers.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, attachments: &[RenderAttachment]) -> Result<Self> {
        let layout = RenderPassLayout::new(attachments)?;

        let color_refs = [layout.color];
        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth) = layout.depth.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth);
        }

        let subpasses = [subpass];
        let dependencies = [layout.dependency()];
        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&layout.descriptions)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.create_render_pass(&create_info, None)? };

        tracing::debug!(
            "Created render pass with {} attachment(s)",
            layout.descriptions.len()
        );

        Ok(Self {
            render_pass,
            layout,
            framebuffers: Vec::new(),
            extent: vk::Extent2D::default(),
        })
    }

    /// Create a render pass and framebuffers for every swapchain image.
    ///
    /// # Safety
    /// The device must be valid and own the swapchain.
    pub unsafe fn for_presentable(
        device: &ash::Device,
        attachments: &[RenderAttachment],
        presentable: &Presentable,
        depth: Option<vk::ImageView>,
    ) -> Result<Self> {
        let mut render_pass = unsafe { Self::new(device, attachments)? };
        if let Err(e) = unsafe { render_pass.create_framebuffers(device, presentable, depth) } {
            unsafe { render_pass.destroy(device) };
            return Err(e);
        }
        Ok(render_pass)
    }

    /// Replace the framebuffers, after creation or a swapchain resize.
    ///
    /// # Safety
    /// The old framebuffers must not be in use.
    pub unsafe fn create_framebuffers(
        &mut self,
        device: &ash::Device,
        presentable: &Presentable,
        depth: Option<vk::ImageView>,
    ) -> Result<()> {
        unsafe { self.destroy_framebuffers(device) };

        let extent = presentable.extent();
        for &color in presentable.image_views() {
            let views = self.layout.framebuffer_views(color, depth)?;
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&views)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe { device.create_framebuffer(&create_info, None)? };
            self.framebuffers.push(framebuffer);
        }
        self.extent = extent;

        Ok(())
    }

    pub const fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub const fn layout(&self) -> &RenderPassLayout {
        &self.layout
    }

    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub const fn has_depth(&self) -> bool {
        self.layout.has_depth()
    }

    /// Framebuffer for the swapchain image at `image_index`.
    pub fn framebuffer(&self, image_index: u32) -> Result<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| {
                GpuError::InvalidState(format!("No framebuffer for image {image_index}"))
            })
    }

    unsafe fn destroy_framebuffers(&mut self, device: &ash::Device) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe { device.destroy_framebuffer(framebuffer, None) };
        }
    }

    /// # Safety
    /// Nothing may still use the pass or its framebuffers.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            self.destroy_framebuffers(device);
            device.destroy_render_pass(self.render_pass, None);
        }
        self.render_pass = vk::RenderPass::null();
    }
}

/// Depth image sized to the swapchain.
pub struct DepthBuffer {
    pub image: GpuImage,
    pub view: vk::ImageView,
}

impl DepthBuffer {
    /// Allocate a device-local depth image and its view.
    pub fn new(context: &GpuContext, format: vk::Format, extent: vk::Extent2D) -> Result<Self> {
        let create_info = depth_image_info(format, extent);
        let mut allocator = context.allocator().lock();
        let mut image =
            allocator.create_image(&create_info, MemoryLocation::GpuOnly, "depth buffer")?;

        let view =
            unsafe { create_image_view(context.device(), &image, vk::ImageAspectFlags::DEPTH) };
        match view {
            Ok(view) => Ok(Self { image, view }),
            Err(e) => {
                allocator.free_image(&mut image)?;
                Err(e)
            }
        }
    }

    /// # Safety
    /// The image must not be in use.
    pub unsafe fn destroy(&mut self, context: &GpuContext) -> Result<()> {
        unsafe { context.device().destroy_image_view(self.view, None) };
        self.view = vk::ImageView::null();
        context.allocator().lock().free_image(&mut self.image)
    }
}

/// Create info for a single-sample depth attachment image.
pub fn depth_image_info(
    format: vk::Format,
    extent: vk::Extent2D,
) -> vk::ImageCreateInfo<'static> {
    vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    const COLOR: vk::Format = vk::Format::B8G8R8A8_SRGB;
    const DEPTH: vk::Format = vk::Format::D32_SFLOAT;

    #[test]
    fn load_and_store_ops_reject_their_opposites() {
        assert_eq!(AttachmentOp::Clear.load_op().unwrap(), vk::AttachmentLoadOp::CLEAR);
        assert_eq!(AttachmentOp::Load.load_op().unwrap(), vk::AttachmentLoadOp::LOAD);
        assert!(matches!(
            AttachmentOp::Store.load_op(),
            Err(GpuError::InvalidAttachment(_))
        ));

        assert_eq!(AttachmentOp::Store.store_op().unwrap(), vk::AttachmentStoreOp::STORE);
        assert_eq!(
            AttachmentOp::DontCare.store_op().unwrap(),
            vk::AttachmentStoreOp::DONT_CARE
        );
        assert!(AttachmentOp::Clear.store_op().is_err());
        assert!(AttachmentOp::Load.store_op().is_err());
    }

    #[test]
    fn color_attachment_ends_ready_to_present() {
        let description = RenderAttachment::color(COLOR, 0).description().unwrap();

        assert_eq!(description.format, COLOR);
        assert_eq!(description.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(description.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(description.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(description.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        let reference = RenderAttachment::color(COLOR, 0).reference();
        assert_eq!(reference.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn invalid_op_fails_description() {
        let attachment = RenderAttachment::color(COLOR, 0).with_store(AttachmentOp::Clear);
        assert!(attachment.description().is_err());
        assert!(RenderPassLayout::new(&[attachment]).is_err());
    }

    #[test]
    fn empty_attachment_list_is_rejected() {
        assert!(matches!(
            RenderPassLayout::new(&[]),
            Err(GpuError::InvalidAttachment(msg)) if msg.contains("No attachments")
        ));
    }

    #[test]
    fn color_only_layout() {
        let layout = RenderPassLayout::new(&[RenderAttachment::color(COLOR, 0)]).unwrap();

        assert!(!layout.has_depth());
        assert_eq!(layout.descriptions.len(), 1);
        assert_eq!(layout.color.attachment, 0);

        let dependency = layout.dependency();
        assert_eq!(dependency.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dependency.dst_subpass, 0);
        assert_eq!(
            dependency.dst_stage_mask,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(
            dependency.dst_access_mask,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::COLOR_ATTACHMENT_READ
        );
        assert_eq!(layout.clear_values([0.0, 0.0, 0.0, 1.0]).len(), 1);
    }

    #[test]
    fn second_depth_attachment_is_used_for_depth() {
        let layout = RenderPassLayout::new(&[
            RenderAttachment::color(COLOR, 0),
            RenderAttachment::depth(DEPTH, 1).with_store(AttachmentOp::DontCare),
        ])
        .unwrap();

        let depth = layout.depth.unwrap();
        assert_eq!(depth.attachment, 1);
        assert_eq!(depth.layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert_eq!(
            layout.descriptions[1].final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
        assert!(layout
            .dependency()
            .dst_stage_mask
            .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));

        let values = layout.clear_values([0.1, 0.2, 0.3, 1.0]);
        assert_eq!(values.len(), 2);
        let depth_clear = unsafe { values[1].depth_stencil };
        assert!((depth_clear.depth - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn attachment_order_is_enforced() {
        assert!(RenderPassLayout::new(&[RenderAttachment::depth(DEPTH, 0)]).is_err());
        assert!(RenderPassLayout::new(&[RenderAttachment::color(COLOR, 1)]).is_err());
        assert!(RenderPassLayout::new(&[
            RenderAttachment::color(COLOR, 0),
            RenderAttachment::color(COLOR, 1),
        ])
        .is_err());
    }

    #[test]
    fn framebuffer_views_follow_depth_presence() {
        let color = vk::ImageView::from_raw(1);
        let depth = vk::ImageView::from_raw(2);

        let color_only = RenderPassLayout::new(&[RenderAttachment::color(COLOR, 0)]).unwrap();
        assert_eq!(color_only.framebuffer_views(color, None).unwrap(), vec![color]);
        assert!(color_only.framebuffer_views(color, Some(depth)).is_err());

        let with_depth = RenderPassLayout::new(&[
            RenderAttachment::color(COLOR, 0),
            RenderAttachment::depth(DEPTH, 1),
        ])
        .unwrap();
        assert_eq!(
            with_depth.framebuffer_views(color, Some(depth)).unwrap(),
            vec![color, depth]
        );
        assert!(with_depth.framebuffer_views(color, None).is_err());
    }

    #[test]
    fn depth_image_matches_extent() {
        let info = depth_image_info(
            DEPTH,
            vk::Extent2D {
                width: 800,
                height: 600,
            },
        );
        assert_eq!(info.format, DEPTH);
        assert_eq!((info.extent.width, info.extent.height, info.extent.depth), (800, 600, 1));
        assert!(info.usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
    }
}
