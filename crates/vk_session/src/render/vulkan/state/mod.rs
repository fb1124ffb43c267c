//! Swapchain lifecycle, framebuffers and synchronization

pub mod framebuffer;
pub mod swapchain;
pub mod swapchain_manager;
pub mod sync;

pub use framebuffer::Framebuffer;
pub use swapchain::{Swapchain, SwapchainDescriptor, SwapchainSupport};
pub use swapchain_manager::{StaleReason, SwapchainLifecycle, SwapchainManager, SwapchainState};
pub use sync::{Fence, FramePacer, FrameSync, Semaphore};
