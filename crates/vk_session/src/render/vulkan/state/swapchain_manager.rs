//! Swapchain lifecycle management
//!
//! ```text
//! Uninitialized --create--> Ready --out of date / suboptimal / resize--> Stale
//!                             ^                                           |
//!                             +-----------------recreate------------------+
//! any --destroy--> Destroyed
//! ```
//!
//! Recreation always runs behind a device-idle barrier. The old image views
//! and framebuffers are released before the replacement swapchain is built,
//! and the surface is reused.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::vk;

use super::framebuffer::Framebuffer;
use super::swapchain::{Swapchain, SwapchainDescriptor};
use super::sync::Semaphore;
use crate::foundation::tracking::ResourceKind;
use crate::render::vulkan::initialization::device::{DeviceContext, QueueFamilyIndices};
use crate::render::vulkan::initialization::surface::PresentationSurface;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Lifecycle states of the swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainState {
    /// Nothing created yet
    Uninitialized,
    /// Images match the surface
    Ready,
    /// Images no longer match the surface and must be rebuilt
    Stale,
    /// Torn down for good
    Destroyed,
}

/// Why the swapchain went stale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// Acquire or present reported `ERROR_OUT_OF_DATE_KHR`
    OutOfDate,
    /// Acquire or present reported a suboptimal swapchain
    Suboptimal,
    /// The window reported a new drawable size
    Resized,
    /// The swapchain was rebuilt but the objects built on it were not
    Incomplete,
}

/// State machine without any Vulkan objects attached
#[derive(Debug, Clone)]
pub struct SwapchainLifecycle {
    state: SwapchainState,
    generation: u64,
    stale_reason: Option<StaleReason>,
}

impl Default for SwapchainLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl SwapchainLifecycle {
    /// Start uninitialized
    pub fn new() -> Self {
        Self { state: SwapchainState::Uninitialized, generation: 0, stale_reason: None }
    }

    /// Current state
    pub fn state(&self) -> SwapchainState {
        self.state
    }

    /// Number of swapchains created so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// First reason recorded since the last rebuild
    pub fn stale_reason(&self) -> Option<StaleReason> {
        self.stale_reason
    }

    /// A swapchain has been built
    pub fn on_created(&mut self) -> VulkanResult<()> {
        match self.state {
            SwapchainState::Uninitialized | SwapchainState::Stale => {
                self.state = SwapchainState::Ready;
                self.generation += 1;
                self.stale_reason = None;
                Ok(())
            }
            other => Err(VulkanError::invalid(format!("swapchain cannot be created from state {other:?}"))),
        }
    }

    /// Move Ready to Stale; returns whether the state changed
    pub fn mark_stale(&mut self, reason: StaleReason) -> bool {
        if self.state == SwapchainState::Ready {
            self.state = SwapchainState::Stale;
            self.stale_reason = Some(reason);
            true
        } else {
            false
        }
    }

    /// Whether a rebuild is allowed now
    pub fn can_recreate(&self) -> bool {
        matches!(self.state, SwapchainState::Ready | SwapchainState::Stale)
    }

    /// Terminal state
    pub fn on_destroyed(&mut self) {
        self.state = SwapchainState::Destroyed;
    }
}

/// Result of acquiring a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready to render into
    Image {
        /// Swapchain image index
        index: u32,
        /// The swapchain still works but no longer matches the surface
        suboptimal: bool,
    },
    /// The swapchain must be rebuilt before anything can be acquired
    OutOfDate,
}

/// Result of presenting a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented normally
    Presented,
    /// Presented, but the swapchain should be rebuilt
    Suboptimal,
    /// Not presented, the swapchain must be rebuilt
    OutOfDate,
}

/// Result of a rebuild request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecreateOutcome {
    /// New swapchain in place
    Recreated {
        /// Color format differs from the previous swapchain
        format_changed: bool,
    },
    /// The drawable area is empty; the swapchain stays stale
    Deferred,
}

/// Map the result of `vkAcquireNextImageKHR`
pub fn acquire_outcome(result: Result<(u32, bool), vk::Result>) -> VulkanResult<AcquireOutcome> {
    match result {
        Ok((index, suboptimal)) => Ok(AcquireOutcome::Image { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(VulkanError::Api(e)),
    }
}

/// Map the result of `vkQueuePresentKHR`
pub fn present_outcome(result: Result<bool, vk::Result>) -> VulkanResult<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(e) => Err(VulkanError::Api(e)),
    }
}

/// Whether a frame that got as far as presenting leaves the swapchain stale
///
/// Out of date wins over suboptimal; a suboptimal acquire counts even when
/// the present itself went through cleanly.
pub fn stale_after_present(acquire_suboptimal: bool, present: PresentOutcome) -> Option<StaleReason> {
    match present {
        PresentOutcome::OutOfDate => Some(StaleReason::OutOfDate),
        PresentOutcome::Suboptimal => Some(StaleReason::Suboptimal),
        PresentOutcome::Presented if acquire_suboptimal => Some(StaleReason::Suboptimal),
        PresentOutcome::Presented => None,
    }
}

/// Owns the swapchain, its framebuffers and per-image render-finished semaphores
pub struct SwapchainManager {
    ctx: DeviceContext,
    loader: SwapchainLoader,
    physical_device: vk::PhysicalDevice,
    queue_families: QueueFamilyIndices,
    framebuffers: Vec<Framebuffer>,
    render_finished: Vec<Semaphore>,
    swapchain: Option<Swapchain>,
    lifecycle: SwapchainLifecycle,
}

impl SwapchainManager {
    /// Manager in the uninitialized state
    pub fn new(
        ctx: &DeviceContext,
        loader: &SwapchainLoader,
        physical_device: vk::PhysicalDevice,
        queue_families: QueueFamilyIndices,
    ) -> Self {
        Self {
            ctx: ctx.clone(),
            loader: loader.clone(),
            physical_device,
            queue_families,
            framebuffers: Vec::new(),
            render_finished: Vec::new(),
            swapchain: None,
            lifecycle: SwapchainLifecycle::new(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SwapchainState {
        self.lifecycle.state()
    }

    /// Lifecycle details
    pub fn lifecycle(&self) -> &SwapchainLifecycle {
        &self.lifecycle
    }

    /// Build the first swapchain
    pub fn create_swapchain(&mut self, surface: &PresentationSurface<'_>, drawable: (u32, u32)) -> VulkanResult<()> {
        if self.lifecycle.state() != SwapchainState::Uninitialized {
            return Err(VulkanError::invalid("create_swapchain called twice"));
        }
        let descriptor = SwapchainDescriptor::choose(&surface.swapchain_support(self.physical_device)?, drawable)?;
        if !descriptor.has_area() {
            return Err(VulkanError::InitializationFailed(format!(
                "drawable size {}x{} has no area",
                drawable.0, drawable.1
            )));
        }
        self.install(surface, descriptor)?;
        self.lifecycle.on_created()
    }

    /// Mark the swapchain stale; returns whether the state changed
    pub fn mark_stale(&mut self, reason: StaleReason) -> bool {
        let changed = self.lifecycle.mark_stale(reason);
        if changed {
            log::debug!("Swapchain stale: {reason:?}");
        }
        changed
    }

    /// Rebuild the swapchain for the current drawable size
    ///
    /// Framebuffers are dropped; call [`build_framebuffers`](Self::build_framebuffers)
    /// after a successful rebuild.
    pub fn recreate_swapchain(
        &mut self,
        surface: &PresentationSurface<'_>,
        drawable: (u32, u32),
    ) -> VulkanResult<RecreateOutcome> {
        if !self.lifecycle.can_recreate() {
            return Err(VulkanError::invalid(format!(
                "swapchain cannot be recreated from state {:?}",
                self.lifecycle.state()
            )));
        }
        self.lifecycle.mark_stale(StaleReason::Resized);

        unsafe { self.ctx.device().device_wait_idle().map_err(VulkanError::Api)? };

        let descriptor = SwapchainDescriptor::choose(&surface.swapchain_support(self.physical_device)?, drawable)?;
        if !descriptor.has_area() {
            log::debug!("Deferring swapchain rebuild, drawable size {}x{}", drawable.0, drawable.1);
            return Ok(RecreateOutcome::Deferred);
        }

        let previous_format = self.swapchain.as_ref().map(Swapchain::format);
        self.install(surface, descriptor)?;
        self.lifecycle.on_created()?;

        log::debug!(
            "Swapchain generation {} live image views {}",
            self.lifecycle.generation(),
            self.ctx.ledger().live(ResourceKind::ImageView)
        );

        Ok(RecreateOutcome::Recreated {
            format_changed: previous_format != Some(descriptor.surface_format.format),
        })
    }

    fn install(&mut self, surface: &PresentationSurface<'_>, descriptor: SwapchainDescriptor) -> VulkanResult<()> {
        self.framebuffers.clear();
        self.render_finished.clear();

        let old = self.swapchain.take();
        let old_handle = old.as_ref().map_or(vk::SwapchainKHR::null(), Swapchain::handle);
        let created = Swapchain::new(
            &self.ctx,
            &self.loader,
            surface.handle(),
            descriptor,
            self.queue_families,
            old_handle,
        );
        // The retired swapchain and its views go away regardless of the outcome
        drop(old);
        let swapchain = created?;

        self.render_finished = (0..swapchain.image_count())
            .map(|_| Semaphore::new(&self.ctx))
            .collect::<VulkanResult<_>>()?;
        self.swapchain = Some(swapchain);
        Ok(())
    }

    /// One framebuffer per swapchain image for a render pass
    pub fn build_framebuffers(&mut self, render_pass: vk::RenderPass) -> VulkanResult<()> {
        let swapchain = self.swapchain()?;
        let extent = swapchain.extent();
        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|view| Framebuffer::new(&self.ctx, render_pass, &[view.handle()], extent))
            .collect::<VulkanResult<Vec<_>>>()?;
        self.framebuffers = framebuffers;
        Ok(())
    }

    /// The live swapchain
    pub fn swapchain(&self) -> VulkanResult<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| VulkanError::invalid(format!("no swapchain in state {:?}", self.state())))
    }

    /// Framebuffer for an image index
    pub fn framebuffer(&self, image_index: u32) -> VulkanResult<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .map(Framebuffer::handle)
            .ok_or_else(|| VulkanError::invalid(format!("no framebuffer for image {image_index}")))
    }

    /// Render-finished semaphore for an image index
    pub fn render_finished(&self, image_index: u32) -> VulkanResult<vk::Semaphore> {
        self.render_finished
            .get(image_index as usize)
            .map(Semaphore::handle)
            .ok_or_else(|| VulkanError::invalid(format!("no render-finished semaphore for image {image_index}")))
    }

    /// Acquire the next image, signaling `image_available` when it is ready
    pub fn acquire_next_image(&self, image_available: vk::Semaphore) -> VulkanResult<AcquireOutcome> {
        let swapchain = self.swapchain()?;
        acquire_outcome(unsafe {
            self.loader
                .acquire_next_image(swapchain.handle(), u64::MAX, image_available, vk::Fence::null())
        })
    }

    /// Queue an image for presentation after `wait` signals
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait: vk::Semaphore) -> VulkanResult<PresentOutcome> {
        let swapchains = [self.swapchain()?.handle()];
        let wait_semaphores = [wait];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        present_outcome(unsafe { self.loader.queue_present(queue, &present_info) })
    }

    /// Release every owned object and enter the terminal state
    pub fn destroy(&mut self) {
        self.framebuffers.clear();
        self.render_finished.clear();
        self.swapchain = None;
        self.lifecycle.on_destroyed();
    }
}

impl Drop for SwapchainManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_happy_path() {
        let mut lifecycle = SwapchainLifecycle::new();
        assert_eq!(lifecycle.state(), SwapchainState::Uninitialized);
        assert!(!lifecycle.can_recreate());

        lifecycle.on_created().unwrap();
        assert_eq!(lifecycle.state(), SwapchainState::Ready);
        assert_eq!(lifecycle.generation(), 1);

        assert!(lifecycle.mark_stale(StaleReason::OutOfDate));
        assert!(!lifecycle.mark_stale(StaleReason::Resized));
        assert_eq!(lifecycle.stale_reason(), Some(StaleReason::OutOfDate));
        assert_eq!(lifecycle.state(), SwapchainState::Stale);

        lifecycle.on_created().unwrap();
        assert_eq!(lifecycle.state(), SwapchainState::Ready);
        assert_eq!(lifecycle.generation(), 2);
        assert_eq!(lifecycle.stale_reason(), None);

        lifecycle.on_destroyed();
        assert_eq!(lifecycle.state(), SwapchainState::Destroyed);
    }

    #[test]
    fn test_lifecycle_rejects_invalid_transitions() {
        let mut lifecycle = SwapchainLifecycle::new();
        assert!(!lifecycle.mark_stale(StaleReason::Suboptimal));
        assert_eq!(lifecycle.state(), SwapchainState::Uninitialized);

        lifecycle.on_created().unwrap();
        assert!(lifecycle.on_created().is_err());

        lifecycle.on_destroyed();
        assert!(lifecycle.on_created().is_err());
        assert!(!lifecycle.mark_stale(StaleReason::Resized));
        assert!(!lifecycle.can_recreate());
    }

    #[test]
    fn test_incomplete_rebuild_leaves_swapchain_recreatable() {
        let mut lifecycle = SwapchainLifecycle::new();
        lifecycle.on_created().unwrap();
        assert!(lifecycle.mark_stale(StaleReason::Incomplete));
        assert!(lifecycle.can_recreate());
        assert_eq!(lifecycle.stale_reason(), Some(StaleReason::Incomplete));
        lifecycle.on_created().unwrap();
        assert_eq!(lifecycle.generation(), 2);
    }

    #[test]
    fn test_acquire_outcome_mapping() {
        assert_eq!(acquire_outcome(Ok((2, false))).unwrap(), AcquireOutcome::Image { index: 2, suboptimal: false });
        assert_eq!(acquire_outcome(Ok((0, true))).unwrap(), AcquireOutcome::Image { index: 0, suboptimal: true });
        assert_eq!(acquire_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(), AcquireOutcome::OutOfDate);

        for fatal in [vk::Result::ERROR_SURFACE_LOST_KHR, vk::Result::ERROR_DEVICE_LOST, vk::Result::TIMEOUT] {
            match acquire_outcome(Err(fatal)) {
                Err(VulkanError::Api(code)) => assert_eq!(code, fatal),
                other => panic!("{fatal:?} mapped to {other:?}"),
            }
        }
    }

    #[test]
    fn test_present_outcome_mapping() {
        assert_eq!(present_outcome(Ok(false)).unwrap(), PresentOutcome::Presented);
        assert_eq!(present_outcome(Ok(true)).unwrap(), PresentOutcome::Suboptimal);
        assert_eq!(present_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(), PresentOutcome::OutOfDate);

        for fatal in [vk::Result::ERROR_SURFACE_LOST_KHR, vk::Result::ERROR_DEVICE_LOST] {
            match present_outcome(Err(fatal)) {
                Err(VulkanError::Api(code)) => assert_eq!(code, fatal),
                other => panic!("{fatal:?} mapped to {other:?}"),
            }
        }
    }

    #[test]
    fn test_stale_after_present_covers_every_combination() {
        let cases = [
            (false, PresentOutcome::Presented, None),
            (true, PresentOutcome::Presented, Some(StaleReason::Suboptimal)),
            (false, PresentOutcome::Suboptimal, Some(StaleReason::Suboptimal)),
            (true, PresentOutcome::Suboptimal, Some(StaleReason::Suboptimal)),
            (false, PresentOutcome::OutOfDate, Some(StaleReason::OutOfDate)),
            (true, PresentOutcome::OutOfDate, Some(StaleReason::OutOfDate)),
        ];
        for (acquire_suboptimal, present, expected) in cases {
            assert_eq!(stale_after_present(acquire_suboptimal, present), expected, "{acquire_suboptimal} {present:?}");
        }
    }
}
