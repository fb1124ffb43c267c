//! Vulkan back end
//!
//! - `initialization`: instance, debug messenger, surface, physical and logical device
//! - `resources`: memory-type selection, buffers, meshes, descriptor sets
//! - `rendering`: shader modules, pipelines, render pass, command recording
//! - `state`: swapchain lifecycle, framebuffers and frame synchronization

pub mod error;
pub mod initialization;
pub mod rendering;
pub mod resources;
pub mod state;

pub use error::{VulkanError, VulkanResult};
pub use initialization::device::DeviceContext;
