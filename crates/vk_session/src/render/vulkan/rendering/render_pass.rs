//! Single-subpass color render pass

use ash::vk;

use crate::foundation::tracking::ResourceKind;
use crate::render::vulkan::initialization::device::DeviceContext;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Subpass dependencies bracketing the layout transitions of the color target:
/// UNDEFINED to COLOR_ATTACHMENT_OPTIMAL on entry, then to PRESENT_SRC_KHR on exit
pub fn color_dependencies() -> [vk::SubpassDependency; 2] {
    let color_rw = vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    [
        vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .src_access_mask(vk::AccessFlags::MEMORY_READ)
            .dst_subpass(0)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(color_rw)
            .build(),
        vk::SubpassDependency::builder()
            .src_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(color_rw)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .dst_access_mask(vk::AccessFlags::MEMORY_READ)
            .build(),
    ]
}

/// Render pass writing one swapchain-format color attachment
pub struct RenderPass {
    ctx: DeviceContext,
    render_pass: vk::RenderPass,
    format: vk::Format,
}

impl RenderPass {
    /// Clear on load, store on exit, leave the image ready for presentation
    pub fn new(ctx: &DeviceContext, format: vk::Format) -> VulkanResult<Self> {
        let color_attachment = vk::AttachmentDescription::builder()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();
        let attachments = [color_attachment];

        let color_refs = [vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build()];

        let subpasses = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .build()];

        let dependencies = color_dependencies();

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { ctx.device().create_render_pass(&create_info, None) }.map_err(VulkanError::Api)?;
        ctx.ledger().record_create(ResourceKind::RenderPass);
        log::debug!("created render pass {render_pass:?} for {format:?}");

        Ok(Self { ctx: ctx.clone(), render_pass, format })
    }

    /// Render pass handle
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Color attachment format
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_render_pass(self.render_pass, None);
        }
        self.ctx.ledger().record_destroy(ResourceKind::RenderPass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_bracket_the_subpass() {
        let [enter, exit] = color_dependencies();
        assert_eq!(enter.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(enter.dst_subpass, 0);
        assert!(enter.dst_access_mask.contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
        assert_eq!(exit.src_subpass, 0);
        assert_eq!(exit.dst_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(exit.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
    }
}
