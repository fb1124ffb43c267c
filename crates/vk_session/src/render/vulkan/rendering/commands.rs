//! Command pool and command buffer recording
//!
//! Recording is scoped: [`CommandRecorder::begin`] resets and opens a buffer,
//! [`ActiveRenderPass`] closes its render pass when dropped, and
//! [`CommandRecorder::end`] finishes the buffer for submission.

use ash::vk;

use crate::foundation::tracking::ResourceKind;
use crate::render::vulkan::initialization::device::DeviceContext;
use crate::render::vulkan::resources::mesh::Mesh;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Command pool whose buffers can be reset one at a time
pub struct CommandPool {
    ctx: DeviceContext,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool
    pub fn new(ctx: &DeviceContext, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool =
            unsafe { ctx.device().create_command_pool(&pool_create_info, None) }.map_err(VulkanError::Api)?;
        ctx.ledger().record_create(ResourceKind::CommandPool);

        Ok(Self { ctx: ctx.clone(), command_pool })
    }

    /// Allocate primary command buffers; they are freed with the pool
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.ctx.device().allocate_command_buffers(&alloc_info) }.map_err(VulkanError::Api)
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_command_pool(self.command_pool, None);
        }
        self.ctx.ledger().record_destroy(ResourceKind::CommandPool);
    }
}

/// Viewport covering the whole extent with the standard depth range
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering the whole extent
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent }
}

/// Records into one command buffer between `begin` and `end`
pub struct CommandRecorder<'d> {
    device: &'d ash::Device,
    command_buffer: vk::CommandBuffer,
}

impl<'d> CommandRecorder<'d> {
    /// Reset the buffer and start a one-time-submit recording
    pub fn begin(device: &'d ash::Device, command_buffer: vk::CommandBuffer) -> VulkanResult<Self> {
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
            device.begin_command_buffer(command_buffer, &begin_info).map_err(VulkanError::Api)?;
        }
        Ok(Self { device, command_buffer })
    }

    /// Begin the render pass, clearing the color attachment
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) -> ActiveRenderPass<'_, 'd> {
        let clear_values = [vk::ClearValue { color: vk::ClearColorValue { float32: clear_color } }];
        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(full_scissor(extent))
            .clear_values(&clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(self.command_buffer, &render_pass_begin, vk::SubpassContents::INLINE);
        }
        ActiveRenderPass { recorder: self }
    }

    /// Finish recording
    pub fn end(self) -> VulkanResult<vk::CommandBuffer> {
        unsafe { self.device.end_command_buffer(self.command_buffer) }.map_err(VulkanError::Api)?;
        Ok(self.command_buffer)
    }
}

/// Open render pass, ended on drop
pub struct ActiveRenderPass<'r, 'd> {
    recorder: &'r mut CommandRecorder<'d>,
}

impl ActiveRenderPass<'_, '_> {
    /// Set viewport and scissor to the full extent
    pub fn set_full_viewport(&mut self, extent: vk::Extent2D) {
        let cb = self.recorder.command_buffer;
        unsafe {
            self.recorder.device.cmd_set_viewport(cb, 0, &[full_viewport(extent)]);
            self.recorder.device.cmd_set_scissor(cb, 0, &[full_scissor(extent)]);
        }
    }

    /// Bind graphics pipeline
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.recorder
                .device
                .cmd_bind_pipeline(self.recorder.command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    /// Bind descriptor sets starting at set 0
    pub fn bind_descriptor_sets(&mut self, layout: vk::PipelineLayout, sets: &[vk::DescriptorSet]) {
        unsafe {
            self.recorder.device.cmd_bind_descriptor_sets(
                self.recorder.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                sets,
                &[],
            );
        }
    }

    /// Bind a mesh's buffers and draw it
    pub fn draw_mesh(&mut self, mesh: &Mesh) {
        mesh.record_draw(self.recorder.device, self.recorder.command_buffer);
    }
}

impl Drop for ActiveRenderPass<'_, '_> {
    fn drop(&mut self) {
        unsafe {
            self.recorder.device.cmd_end_render_pass(self.recorder.command_buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_full_viewport_matches_extent() {
        let extent = vk::Extent2D { width: 800, height: 600 };
        let viewport = full_viewport(extent);
        assert_relative_eq!(viewport.width, 800.0);
        assert_relative_eq!(viewport.height, 600.0);
        assert_relative_eq!(viewport.max_depth, 1.0);

        let scissor = full_scissor(extent);
        assert_eq!((scissor.offset.x, scissor.offset.y), (0, 0));
        assert_eq!((scissor.extent.width, scissor.extent.height), (800, 600));
    }
}
