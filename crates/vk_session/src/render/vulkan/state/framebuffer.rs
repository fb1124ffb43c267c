//! Framebuffer wrapper

use ash::vk;

use crate::foundation::tracking::ResourceKind;
use crate::render::vulkan::initialization::device::DeviceContext;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Owned `VkFramebuffer`
pub struct Framebuffer {
    ctx: DeviceContext,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a single-layer framebuffer over the given attachments
    pub fn new(
        ctx: &DeviceContext,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            ctx.device()
                .create_framebuffer(&framebuffer_create_info, None)
                .map_err(VulkanError::Api)?
        };
        ctx.ledger().record_create(ResourceKind::Framebuffer);

        Ok(Self { ctx: ctx.clone(), framebuffer })
    }

    /// Framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_framebuffer(self.framebuffer, None);
        }
        self.ctx.ledger().record_destroy(ResourceKind::Framebuffer);
    }
}
