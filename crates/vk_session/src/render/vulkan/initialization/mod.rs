//! Instance, surface and device bootstrap

pub mod debug;
pub mod device;
pub mod instance;
pub mod surface;

pub use debug::{DebugMessenger, ObjectNamer};
pub use device::{DeviceCandidate, DeviceContext, LogicalDevice, PhysicalDeviceInfo, QueueFamilyIndices};
pub use instance::{InstanceRequest, VulkanInstance, VALIDATION_LAYER};
pub use surface::PresentationSurface;
