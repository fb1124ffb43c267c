//! Create/destroy accounting for Vulkan objects
//!
//! Every scoped wrapper records its creation and its destruction here. A
//! balanced ledger at session teardown means each `vkCreate*`/`vkAllocate*`
//! call was paired with exactly one matching destroy.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Kinds of Vulkan object the session creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// `VkInstance`
    Instance,
    /// `VkDebugUtilsMessengerEXT`
    DebugMessenger,
    /// `VkSurfaceKHR`
    Surface,
    /// `VkDevice`
    Device,
    /// `VkSwapchainKHR`
    Swapchain,
    /// `VkImageView`
    ImageView,
    /// `VkFramebuffer`
    Framebuffer,
    /// `VkRenderPass`
    RenderPass,
    /// `VkPipelineLayout`
    PipelineLayout,
    /// `VkPipeline`
    Pipeline,
    /// `VkShaderModule`
    ShaderModule,
    /// `VkDescriptorSetLayout`
    DescriptorSetLayout,
    /// `VkDescriptorPool`
    DescriptorPool,
    /// `VkBuffer`
    Buffer,
    /// `VkDeviceMemory`
    DeviceMemory,
    /// `VkCommandPool`
    CommandPool,
    /// `VkSemaphore`
    Semaphore,
    /// `VkFence`
    Fence,
}

impl ResourceKind {
    /// Every kind, in creation order of a typical session
    pub const ALL: [Self; 18] = [
        Self::Instance,
        Self::DebugMessenger,
        Self::Surface,
        Self::Device,
        Self::Swapchain,
        Self::ImageView,
        Self::Framebuffer,
        Self::RenderPass,
        Self::PipelineLayout,
        Self::Pipeline,
        Self::ShaderModule,
        Self::DescriptorSetLayout,
        Self::DescriptorPool,
        Self::Buffer,
        Self::DeviceMemory,
        Self::CommandPool,
        Self::Semaphore,
        Self::Fence,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

const KINDS: usize = ResourceKind::ALL.len();

/// Per-kind create and destroy counters
#[derive(Debug, Default)]
pub struct ResourceLedger {
    created: [AtomicU64; KINDS],
    destroyed: [AtomicU64; KINDS],
}

impl ResourceLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one creation
    pub fn record_create(&self, kind: ResourceKind) {
        self.created[kind.index()].fetch_add(1, Ordering::Relaxed);
        log::trace!("create {kind}");
    }

    /// Record one destruction
    pub fn record_destroy(&self, kind: ResourceKind) {
        let destroyed = self.destroyed[kind.index()].fetch_add(1, Ordering::Relaxed) + 1;
        if destroyed > self.created(kind) {
            log::error!("{kind} destroyed more often than created ({destroyed} > {})", self.created(kind));
            debug_assert!(false, "double destroy of {kind}");
        }
        log::trace!("destroy {kind}");
    }

    /// Total creations of a kind
    pub fn created(&self, kind: ResourceKind) -> u64 {
        self.created[kind.index()].load(Ordering::Relaxed)
    }

    /// Total destructions of a kind
    pub fn destroyed(&self, kind: ResourceKind) -> u64 {
        self.destroyed[kind.index()].load(Ordering::Relaxed)
    }

    /// Objects of a kind currently alive
    pub fn live(&self, kind: ResourceKind) -> u64 {
        self.created(kind).saturating_sub(self.destroyed(kind))
    }

    /// Kinds with live objects and their counts
    pub fn outstanding(&self) -> Vec<(ResourceKind, u64)> {
        ResourceKind::ALL
            .iter()
            .map(|&kind| (kind, self.live(kind)))
            .filter(|&(_, live)| live > 0)
            .collect()
    }

    /// True when every creation has been matched by a destruction
    pub fn is_balanced(&self) -> bool {
        ResourceKind::ALL
            .iter()
            .all(|&kind| self.created(kind) == self.destroyed(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_indices_match_table() {
        for (position, kind) in ResourceKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), position);
        }
    }

    #[test]
    fn test_balanced_after_pairs() {
        let ledger = ResourceLedger::new();
        assert!(ledger.is_balanced());

        ledger.record_create(ResourceKind::Buffer);
        ledger.record_create(ResourceKind::DeviceMemory);
        ledger.record_create(ResourceKind::Buffer);
        assert!(!ledger.is_balanced());
        assert_eq!(ledger.live(ResourceKind::Buffer), 2);
        assert_eq!(
            ledger.outstanding(),
            vec![(ResourceKind::Buffer, 2), (ResourceKind::DeviceMemory, 1)]
        );

        ledger.record_destroy(ResourceKind::Buffer);
        ledger.record_destroy(ResourceKind::DeviceMemory);
        ledger.record_destroy(ResourceKind::Buffer);
        assert!(ledger.is_balanced());
        assert!(ledger.outstanding().is_empty());
        assert_eq!(ledger.created(ResourceKind::Buffer), 2);
    }

    fn record_image_set(ledger: &ResourceLedger, images: usize, create: bool) {
        for _ in 0..images {
            for kind in [ResourceKind::ImageView, ResourceKind::Semaphore, ResourceKind::Framebuffer] {
                if create {
                    ledger.record_create(kind);
                } else {
                    ledger.record_destroy(kind);
                }
            }
        }
    }

    #[test]
    fn test_replacing_image_set_tracks_new_count() {
        let ledger = ResourceLedger::new();
        ledger.record_create(ResourceKind::Swapchain);
        record_image_set(&ledger, 3, true);
        assert_eq!(ledger.live(ResourceKind::ImageView), 3);

        // Rebuild: framebuffers and semaphores go first, the replacement
        // swapchain is created before the retired one and its views are released
        for _ in 0..3 {
            ledger.record_destroy(ResourceKind::Framebuffer);
            ledger.record_destroy(ResourceKind::Semaphore);
        }
        ledger.record_create(ResourceKind::Swapchain);
        for _ in 0..4 {
            ledger.record_create(ResourceKind::ImageView);
        }
        assert_eq!(ledger.live(ResourceKind::ImageView), 7);
        for _ in 0..3 {
            ledger.record_destroy(ResourceKind::ImageView);
        }
        ledger.record_destroy(ResourceKind::Swapchain);
        for _ in 0..4 {
            ledger.record_create(ResourceKind::Semaphore);
            ledger.record_create(ResourceKind::Framebuffer);
        }

        assert_eq!(ledger.live(ResourceKind::ImageView), 4);
        assert_eq!(ledger.live(ResourceKind::Framebuffer), 4);
        assert_eq!(ledger.live(ResourceKind::Swapchain), 1);
        assert_eq!(ledger.created(ResourceKind::ImageView), 7);

        record_image_set(&ledger, 4, false);
        ledger.record_destroy(ResourceKind::Swapchain);
        assert!(ledger.is_balanced());
    }
}
