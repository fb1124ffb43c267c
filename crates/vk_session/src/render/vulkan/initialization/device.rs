//! Physical device selection and logical device creation
//!
//! Each enumerated physical device is turned into a [`DeviceCandidate`], a
//! plain-data snapshot of what the selector needs: queue family indices,
//! supported extensions and swapchain support for the session surface. The
//! choice itself ([`select_device`]) is a pure function over those snapshots.
//!
//! A device is suitable when
//! - it has a graphics family and a family that can present to the surface,
//! - it exposes every required device extension (`VK_KHR_swapchain`),
//! - the surface reports at least one format and one present mode for it.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Instance};

use super::surface::PresentationSurface;
use crate::core::config::DeviceSelectionPolicy;
use crate::foundation::logging::LogSink;
use crate::foundation::tracking::{ResourceKind, ResourceLedger};
use crate::render::vulkan::state::swapchain::SwapchainSupport;
use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::sink_line;

/// Graphics and presentation queue family indices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family with the graphics bit
    pub graphics: Option<u32>,
    /// Family able to present to the surface
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scan queue families
    ///
    /// The graphics family is the first one with the graphics bit and at least
    /// one queue. It also serves presentation when it can, otherwise the first
    /// presenting family is used.
    pub fn find(families: &[vk::QueueFamilyProperties], mut can_present: impl FnMut(u32) -> bool) -> Self {
        let mut indices = Self::default();
        let mut first_presenting = None;

        for (index, family) in (0u32..).zip(families) {
            if family.queue_count == 0 {
                continue;
            }
            let presents = can_present(index);
            if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
                if presents {
                    indices.present = Some(index);
                }
            }
            if presents && first_presenting.is_none() {
                first_presenting = Some(index);
            }
        }

        if indices.present.is_none() {
            indices.present = first_presenting;
        }
        indices
    }

    /// Both families found
    pub fn is_valid(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Both families when valid
    pub fn pair(&self) -> Option<(u32, u32)> {
        self.graphics.zip(self.present)
    }

    /// Distinct family indices, graphics first
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        for family in [self.graphics, self.present].into_iter().flatten() {
            if !families.contains(&family) {
                families.push(family);
            }
        }
        families
    }
}

/// Device extensions every session needs
pub fn required_device_extensions() -> Vec<String> {
    vec![SwapchainLoader::name().to_string_lossy().into_owned()]
}

/// Snapshot of one physical device as seen by the selector
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    /// Physical device handle
    pub handle: vk::PhysicalDevice,
    /// Driver-reported name
    pub name: String,
    /// Discrete, integrated, ...
    pub device_type: vk::PhysicalDeviceType,
    /// Queue families for the session surface
    pub queue_families: QueueFamilyIndices,
    /// Supported device extensions
    pub extensions: Vec<String>,
    /// Surface support on this device
    pub swapchain_support: SwapchainSupport,
}

impl DeviceCandidate {
    /// Query a physical device against a surface
    pub fn query(
        instance: &Instance,
        surface: &PresentationSurface<'_>,
        handle: vk::PhysicalDevice,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(handle) };
        let families = unsafe { instance.get_physical_device_queue_family_properties(handle) };

        let mut probe_error = None;
        let queue_families = QueueFamilyIndices::find(&families, |family| {
            surface.supports_present(handle, family).unwrap_or_else(|e| {
                probe_error.get_or_insert(e);
                false
            })
        });
        if let Some(e) = probe_error {
            log::warn!("Present support probe failed: {e}");
        }

        let extensions = unsafe { instance.enumerate_device_extension_properties(handle) }
            .map_err(VulkanError::Api)?
            .iter()
            .map(|ext| c_name(&ext.extension_name))
            .collect();

        Ok(Self {
            handle,
            name: c_name(&properties.device_name),
            device_type: properties.device_type,
            queue_families,
            extensions,
            swapchain_support: surface.swapchain_support(handle)?,
        })
    }

    /// Required extensions this device lacks
    pub fn missing_extensions<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|name| !self.extensions.contains(name))
            .map(String::as_str)
            .collect()
    }

    /// Whether the device can run a session
    pub fn is_suitable(&self, required_extensions: &[String]) -> bool {
        self.queue_families.is_valid()
            && self.missing_extensions(required_extensions).is_empty()
            && self.swapchain_support.is_adequate()
    }

    /// Preference score by device type
    pub fn type_score(&self) -> u32 {
        match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 10,
            vk::PhysicalDeviceType::CPU => 1,
            _ => 0,
        }
    }
}

/// Pick a device index according to the policy
pub fn select_device(
    candidates: &[DeviceCandidate],
    required_extensions: &[String],
    policy: DeviceSelectionPolicy,
) -> VulkanResult<usize> {
    let mut suitable = candidates
        .iter()
        .enumerate()
        .filter(|(_, candidate)| candidate.is_suitable(required_extensions));

    let chosen = match policy {
        DeviceSelectionPolicy::FirstSuitable => suitable.next(),
        DeviceSelectionPolicy::PreferDiscrete => suitable.fold(None, |best: Option<(usize, &DeviceCandidate)>, next| {
            match best {
                Some(current) if current.1.type_score() >= next.1.type_score() => Some(current),
                _ => Some(next),
            }
        }),
    };

    chosen
        .map(|(index, _)| index)
        .ok_or(VulkanError::NoSuitableDevice { inspected: candidates.len() })
}

fn c_name(raw: &[c_char]) -> String {
    unsafe { CStr::from_ptr(raw.as_ptr()) }.to_string_lossy().into_owned()
}

/// The selected physical device
#[derive(Debug, Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub handle: vk::PhysicalDevice,
    /// Device name
    pub name: String,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Enumerate devices, report them to the sink and select one
    pub fn select(
        instance: &Instance,
        surface: &PresentationSurface<'_>,
        policy: DeviceSelectionPolicy,
        sink: &LogSink,
    ) -> VulkanResult<Self> {
        let handles = unsafe { instance.enumerate_physical_devices().map_err(VulkanError::Api)? };
        let required = required_device_extensions();

        let mut candidates = Vec::with_capacity(handles.len());
        for handle in handles {
            match DeviceCandidate::query(instance, surface, handle) {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => log::warn!("Skipping physical device {handle:?}: {e}"),
            }
        }

        sink_line!(sink, "vk: physical devices ({}):", candidates.len());
        for (index, candidate) in candidates.iter().enumerate() {
            sink_line!(
                sink,
                "    [{index}] {} {:?} graphics={:?} present={:?} formats={} modes={} missing={:?} suitable={}",
                candidate.name,
                candidate.device_type,
                candidate.queue_families.graphics,
                candidate.queue_families.present,
                candidate.swapchain_support.formats.len(),
                candidate.swapchain_support.present_modes.len(),
                candidate.missing_extensions(&required),
                candidate.is_suitable(&required)
            );
        }

        let index = select_device(&candidates, &required, policy)?;
        let candidate = &candidates[index];
        let (graphics_family, present_family) = candidate
            .queue_families
            .pair()
            .ok_or_else(|| VulkanError::InitializationFailed("selected device lost its queue families".into()))?;

        let properties = unsafe { instance.get_physical_device_properties(candidate.handle) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(candidate.handle) };

        log::info!("Selected GPU: {} ({:?})", candidate.name, candidate.device_type);
        sink_line!(sink, "vk: selected [{index}] {} using {policy:?}", candidate.name);

        Ok(Self {
            handle: candidate.handle,
            name: candidate.name.clone(),
            properties,
            memory_properties,
            graphics_family,
            present_family,
        })
    }

    /// Queue family indices of the selection
    pub fn queue_families(&self) -> QueueFamilyIndices {
        QueueFamilyIndices { graphics: Some(self.graphics_family), present: Some(self.present_family) }
    }
}

/// Logical device with graphics and presentation queues
pub struct LogicalDevice {
    device: Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    swapchain_loader: SwapchainLoader,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    ledger: Arc<ResourceLedger>,
}

impl LogicalDevice {
    /// Create the device with one queue per distinct family and the swapchain extension
    pub fn new(instance: &Instance, physical: &PhysicalDeviceInfo, ledger: Arc<ResourceLedger>) -> VulkanResult<Self> {
        let priorities = [1.0_f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = physical
            .queue_families()
            .unique_families()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extension_names: Vec<CString> = required_device_extensions()
            .into_iter()
            .map(|name| CString::new(name).map_err(|_| VulkanError::invalid("extension name contains NUL")))
            .collect::<VulkanResult<_>>()?;
        let extension_ptrs: Vec<*const c_char> = extension_names.iter().map(|name| name.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .create_device(physical.handle, &create_info, None)
                .map_err(VulkanError::Api)?
        };
        ledger.record_create(ResourceKind::Device);

        let graphics_queue = unsafe { device.get_device_queue(physical.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical.present_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        log::debug!(
            "Created logical device: graphics family {}, present family {}",
            physical.graphics_family,
            physical.present_family
        );

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
            memory_properties: physical.memory_properties,
            ledger,
        })
    }

    /// Device function table
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Presentation queue, may alias the graphics queue
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// `VK_KHR_swapchain` function table
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }

    /// Handle bundle for resource wrappers
    pub fn context(&self) -> DeviceContext {
        DeviceContext {
            device: self.device.clone(),
            memory_properties: self.memory_properties,
            ledger: Arc::clone(&self.ledger),
        }
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            log::warn!("device_wait_idle before destroy failed: {e}");
        }
        unsafe {
            self.device.destroy_device(None);
        }
        self.ledger.record_destroy(ResourceKind::Device);
    }
}

/// What every device-level wrapper keeps for its own teardown
#[derive(Clone)]
pub struct DeviceContext {
    device: Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    ledger: Arc<ResourceLedger>,
}

impl DeviceContext {
    /// Device function table
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Memory types of the physical device
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Shared create/destroy ledger
    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties { queue_flags: flags, queue_count: count, ..Default::default() }
    }

    fn adequate_support() -> SwapchainSupport {
        SwapchainSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    fn candidate(name: &str, device_type: vk::PhysicalDeviceType, present: Option<u32>) -> DeviceCandidate {
        DeviceCandidate {
            handle: vk::PhysicalDevice::null(),
            name: name.to_string(),
            device_type,
            queue_families: QueueFamilyIndices { graphics: Some(0), present },
            extensions: required_device_extensions(),
            swapchain_support: adequate_support(),
        }
    }

    #[test]
    fn test_queue_families_prefer_shared_family() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 4),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        let indices = QueueFamilyIndices::find(&families, |_| true);
        assert_eq!(indices, QueueFamilyIndices { graphics: Some(1), present: Some(1) });
        assert_eq!(indices.unique_families(), vec![1]);
    }

    #[test]
    fn test_queue_families_split_when_graphics_cannot_present() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1), family(vk::QueueFlags::TRANSFER, 1)];
        let indices = QueueFamilyIndices::find(&families, |index| index == 1);
        assert!(indices.is_valid());
        assert_eq!(indices.pair(), Some((0, 1)));
        assert_eq!(indices.unique_families(), vec![0, 1]);
    }

    #[test]
    fn test_queue_families_skip_empty_families() {
        let families = [family(vk::QueueFlags::GRAPHICS, 0), family(vk::QueueFlags::COMPUTE, 1)];
        let indices = QueueFamilyIndices::find(&families, |_| true);
        assert_eq!(indices.graphics, None);
        assert_eq!(indices.present, Some(1));
        assert!(!indices.is_valid());
    }

    #[test]
    fn test_suitability_requires_all_conditions() {
        let required = required_device_extensions();
        assert!(candidate("ok", vk::PhysicalDeviceType::DISCRETE_GPU, Some(0)).is_suitable(&required));

        let no_present = candidate("no present", vk::PhysicalDeviceType::DISCRETE_GPU, None);
        assert!(!no_present.is_suitable(&required));

        let mut no_ext = candidate("no ext", vk::PhysicalDeviceType::DISCRETE_GPU, Some(0));
        no_ext.extensions.clear();
        assert_eq!(no_ext.missing_extensions(&required), vec!["VK_KHR_swapchain"]);
        assert!(!no_ext.is_suitable(&required));

        let mut no_modes = candidate("no modes", vk::PhysicalDeviceType::DISCRETE_GPU, Some(0));
        no_modes.swapchain_support.present_modes.clear();
        assert!(!no_modes.is_suitable(&required));
    }

    #[test]
    fn test_first_suitable_keeps_enumeration_order() {
        let required = required_device_extensions();
        let candidates = [
            candidate("cpu", vk::PhysicalDeviceType::CPU, None),
            candidate("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU, Some(0)),
            candidate("dgpu", vk::PhysicalDeviceType::DISCRETE_GPU, Some(0)),
        ];
        assert_eq!(select_device(&candidates, &required, DeviceSelectionPolicy::FirstSuitable).unwrap(), 1);
        assert_eq!(select_device(&candidates, &required, DeviceSelectionPolicy::PreferDiscrete).unwrap(), 2);
    }

    #[test]
    fn test_prefer_discrete_breaks_ties_by_order() {
        let required = required_device_extensions();
        let candidates = [
            candidate("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU, Some(0)),
            candidate("dgpu a", vk::PhysicalDeviceType::DISCRETE_GPU, Some(0)),
            candidate("dgpu b", vk::PhysicalDeviceType::DISCRETE_GPU, Some(0)),
        ];
        assert_eq!(select_device(&candidates, &required, DeviceSelectionPolicy::PreferDiscrete).unwrap(), 1);
    }

    #[test]
    fn test_no_presenting_device_is_fatal() {
        let required = required_device_extensions();
        let candidates = [
            candidate("a", vk::PhysicalDeviceType::DISCRETE_GPU, None),
            candidate("b", vk::PhysicalDeviceType::INTEGRATED_GPU, None),
        ];
        for policy in [DeviceSelectionPolicy::FirstSuitable, DeviceSelectionPolicy::PreferDiscrete] {
            let err = select_device(&candidates, &required, policy).unwrap_err();
            assert!(matches!(err, VulkanError::NoSuitableDevice { inspected: 2 }));
        }
    }
}
