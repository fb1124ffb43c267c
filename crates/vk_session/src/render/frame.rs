//! Frame driver
//!
//! One frame runs: rebuild a stale swapchain, wait on the slot's fence,
//! acquire an image, write uniforms, record, reset the fence, submit, advance
//! the slot, present. The fence is reset only once every fallible step before
//! submission has succeeded, so an early return never leaves an unsignaled
//! fence that the next wait on the same slot would block on forever.

use ash::vk;

use crate::render::vulkan::state::swapchain_manager::{
    stale_after_present, AcquireOutcome, PresentOutcome, RecreateOutcome, StaleReason,
};
use crate::render::vulkan::VulkanResult;

/// What happened to one [`Session::draw_frame`](crate::render::Session::draw_frame) call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and queued for presentation
    Presented,
    /// Acquire reported the swapchain out of date; nothing was submitted and
    /// the next frame rebuilds it
    SwapchainStale,
    /// The drawable area is empty, nothing was rendered
    Skipped,
}

/// Work recorded for one acquired image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedFrame {
    /// Command buffer ready to submit
    pub command_buffer: vk::CommandBuffer,
    /// Signaled by the submit, waited on by the present
    pub render_finished: vk::Semaphore,
}

/// The individual operations [`drive_frame`] sequences
pub trait FrameSteps {
    /// Whether the swapchain must be rebuilt before drawing
    fn swapchain_stale(&self) -> bool;

    /// Rebuild the swapchain and everything built on it
    fn recreate_swapchain(&mut self) -> VulkanResult<RecreateOutcome>;

    /// Block on the current slot's fence and retire its previous frame
    fn wait_for_slot(&mut self) -> VulkanResult<()>;

    /// Acquire the next swapchain image
    fn acquire(&mut self) -> VulkanResult<AcquireOutcome>;

    /// Copy this frame's uniforms into the slot's buffer
    fn write_uniforms(&mut self) -> VulkanResult<()>;

    /// Record the draw into the slot's command buffer
    fn record(&mut self, image_index: u32) -> VulkanResult<RecordedFrame>;

    /// Return the slot's fence to unsignaled
    fn reset_fence(&mut self) -> VulkanResult<()>;

    /// Submit to the graphics queue, signaling the slot's fence
    fn submit(&mut self, recorded: &RecordedFrame) -> VulkanResult<()>;

    /// Move on to the next slot
    fn advance(&mut self);

    /// Queue the image for presentation
    fn present(&mut self, image_index: u32, recorded: &RecordedFrame) -> VulkanResult<PresentOutcome>;

    /// Record that the swapchain no longer matches the surface
    fn mark_stale(&mut self, reason: StaleReason);
}

/// Run one frame through `steps`
pub fn drive_frame<S: FrameSteps + ?Sized>(steps: &mut S) -> VulkanResult<FrameOutcome> {
    if steps.swapchain_stale() && steps.recreate_swapchain()? == RecreateOutcome::Deferred {
        return Ok(FrameOutcome::Skipped);
    }

    steps.wait_for_slot()?;

    let (image_index, acquire_suboptimal) = match steps.acquire()? {
        AcquireOutcome::Image { index, suboptimal } => (index, suboptimal),
        AcquireOutcome::OutOfDate => {
            // Fence stays signaled so the slot can be reused right away
            steps.mark_stale(StaleReason::OutOfDate);
            return Ok(FrameOutcome::SwapchainStale);
        }
    };

    steps.write_uniforms()?;
    let recorded = steps.record(image_index)?;

    steps.reset_fence()?;
    steps.submit(&recorded)?;
    steps.advance();

    let presented = steps.present(image_index, &recorded)?;
    if let Some(reason) = stale_after_present(acquire_suboptimal, presented) {
        steps.mark_stale(reason);
    }
    Ok(FrameOutcome::Presented)
}
