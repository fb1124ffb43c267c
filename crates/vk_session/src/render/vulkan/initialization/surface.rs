//! Presentation surface owned for the lifetime of a session

use std::sync::Arc;

use ash::extensions::khr::Surface as SurfaceLoader;
use ash::vk;

use super::instance::VulkanInstance;
use crate::foundation::tracking::{ResourceKind, ResourceLedger};
use crate::platform::PlatformSurface;
use crate::render::vulkan::state::swapchain::SwapchainSupport;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Surface created through the platform and destroyed through it again
pub struct PresentationSurface<'p> {
    platform: &'p dyn PlatformSurface,
    loader: SurfaceLoader,
    handle: vk::SurfaceKHR,
    ledger: Arc<ResourceLedger>,
}

impl<'p> PresentationSurface<'p> {
    /// Ask the platform for a surface bound to its window
    pub fn new(
        platform: &'p dyn PlatformSurface,
        instance: &VulkanInstance,
        ledger: Arc<ResourceLedger>,
    ) -> VulkanResult<Self> {
        let handle = platform
            .create_surface(instance.entry(), instance.instance())
            .map_err(|e| VulkanError::SurfaceCreation(e.to_string()))?;
        ledger.record_create(ResourceKind::Surface);

        let loader = SurfaceLoader::new(instance.entry(), instance.instance());
        Ok(Self { platform, loader, handle, ledger })
    }

    /// Surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// `VK_KHR_surface` function table
    pub fn loader(&self) -> &SurfaceLoader {
        &self.loader
    }

    /// Whether a queue family of a device can present to this surface
    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, family: u32) -> VulkanResult<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, family, self.handle)
                .map_err(VulkanError::Api)
        }
    }

    /// Capabilities, formats and present modes of this surface on a device
    pub fn swapchain_support(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<SwapchainSupport> {
        SwapchainSupport::query(&self.loader, physical_device, self.handle)
    }
}

impl Drop for PresentationSurface<'_> {
    fn drop(&mut self) {
        self.platform.destroy_surface(&self.loader, self.handle);
        self.ledger.record_destroy(ResourceKind::Surface);
    }
}
