//! Synchronization primitives and frame pacing
//!
//! [`FramePacer`] is the bookkeeping half of frames in flight: it tracks which
//! slots have been submitted and not yet fenced, and never lets that number
//! exceed the pool size. The Vulkan half is [`FrameSync`], one per slot.

use ash::vk;

use crate::foundation::tracking::ResourceKind;
use crate::render::vulkan::initialization::device::DeviceContext;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive
pub struct Semaphore {
    ctx: DeviceContext,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary semaphore
    pub fn new(ctx: &DeviceContext) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            ctx.device()
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        ctx.ledger().record_create(ResourceKind::Semaphore);

        Ok(Self { ctx: ctx.clone(), semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_semaphore(self.semaphore, None);
        }
        self.ctx.ledger().record_destroy(ResourceKind::Semaphore);
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    ctx: DeviceContext,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(ctx: &DeviceContext, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            ctx.device()
                .create_fence(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        ctx.ledger().record_create(ResourceKind::Fence);

        Ok(Self { ctx: ctx.clone(), fence })
    }

    /// Wait for fence
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe {
            self.ctx
                .device()
                .wait_for_fences(&[self.fence], true, timeout)
                .map_err(VulkanError::Api)
        }
    }

    /// Reset fence
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.ctx.device().reset_fences(&[self.fence]).map_err(VulkanError::Api) }
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_fence(self.fence, None);
        }
        self.ctx.ledger().record_destroy(ResourceKind::Fence);
    }
}

/// Synchronization objects of one frame slot
///
/// Render-finished semaphores live with the swapchain images instead, since a
/// presentation may still hold one after the slot's fence has signaled.
pub struct FrameSync {
    /// Semaphore signaled when swapchain image becomes available
    pub image_available: Semaphore,
    /// Fence for CPU-GPU synchronization of frame, created signaled
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create frame synchronization objects
    pub fn new(ctx: &DeviceContext) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(ctx)?,
            in_flight: Fence::new(ctx, true)?,
        })
    }
}

/// Frame slot bookkeeping for N frames in flight
#[derive(Debug, Clone)]
pub struct FramePacer {
    pending: Vec<bool>,
    current: usize,
    frame_number: u64,
}

impl FramePacer {
    /// Pacer over `frames_in_flight` slots, at least one
    pub fn new(frames_in_flight: usize) -> Self {
        Self { pending: vec![false; frames_in_flight.max(1)], current: 0, frame_number: 0 }
    }

    /// Pool size
    pub fn frames_in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Slot the next frame records into
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Frames presented or skipped after submission so far
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// The slot's fence has been waited on; its resources are free again
    pub fn retire(&mut self, slot: usize) {
        if let Some(pending) = self.pending.get_mut(slot) {
            *pending = false;
        }
    }

    /// Work for the slot has been submitted with its fence
    pub fn mark_submitted(&mut self, slot: usize) {
        debug_assert!(!self.pending[slot], "slot {slot} submitted twice without a fence wait");
        self.pending[slot] = true;
    }

    /// Move to the next slot
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.pending.len();
        self.frame_number += 1;
    }

    /// Submitted-but-not-fenced slot count
    pub fn in_flight(&self) -> usize {
        self.pending.iter().filter(|&&pending| pending).count()
    }

    /// Device idle: nothing is in flight any more
    pub fn retire_all(&mut self) {
        self.pending.iter_mut().for_each(|pending| *pending = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacer_cycles_slots() {
        let mut pacer = FramePacer::new(2);
        let mut slots = Vec::new();
        for _ in 0..5 {
            slots.push(pacer.current_slot());
            pacer.advance();
        }
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
        assert_eq!(pacer.frame_number(), 5);
    }

    #[test]
    fn test_pacer_never_exceeds_pool_size() {
        for frames in 1..=4 {
            let mut pacer = FramePacer::new(frames);
            for frame in 0..50 {
                let slot = pacer.current_slot();
                // wait on the slot's fence before reuse
                pacer.retire(slot);
                if frame % 7 != 3 {
                    pacer.mark_submitted(slot);
                }
                assert!(pacer.in_flight() <= frames);
                pacer.advance();
            }
            assert!(pacer.in_flight() > 0);
            pacer.retire_all();
            assert_eq!(pacer.in_flight(), 0);
        }
    }

    #[test]
    fn test_pacer_minimum_one_slot() {
        let mut pacer = FramePacer::new(0);
        assert_eq!(pacer.frames_in_flight(), 1);
        pacer.mark_submitted(0);
        assert_eq!(pacer.in_flight(), 1);
        pacer.advance();
        assert_eq!(pacer.current_slot(), 0);
    }
}
