//! Device selection and swapchain parameter choice through the public API

use ash::vk;
use vk_session::prelude::*;
use vk_session::render::vulkan::initialization::device::{
    required_device_extensions, select_device, DeviceCandidate, QueueFamilyIndices,
};
use vk_session::render::vulkan::resources::memory::find_memory_type;
use vk_session::render::vulkan::state::swapchain::{choose_extent, SwapchainDescriptor, SwapchainSupport};

fn reference_support(current_extent: vk::Extent2D) -> SwapchainSupport {
    SwapchainSupport {
        capabilities: vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 4,
            current_extent,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            ..Default::default()
        },
        formats: vec![
            vk::SurfaceFormatKHR { format: vk::Format::R8G8B8A8_UNORM, color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
        ],
        present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
    }
}

fn candidate(device_type: vk::PhysicalDeviceType, present: Option<u32>) -> DeviceCandidate {
    DeviceCandidate {
        handle: vk::PhysicalDevice::null(),
        name: format!("{device_type:?}"),
        device_type,
        queue_families: QueueFamilyIndices { graphics: Some(0), present },
        extensions: required_device_extensions(),
        swapchain_support: reference_support(vk::Extent2D { width: 800, height: 600 }),
    }
}

#[test]
fn test_reference_surface_scenario() {
    let support = reference_support(vk::Extent2D { width: 800, height: 600 });
    let descriptor = SwapchainDescriptor::choose(&support, (1024, 768)).unwrap();

    assert_eq!(descriptor.surface_format.format, vk::Format::R8G8B8A8_UNORM);
    assert_eq!(descriptor.surface_format.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    assert_eq!(descriptor.present_mode, vk::PresentModeKHR::MAILBOX);
    assert_eq!((descriptor.extent.width, descriptor.extent.height), (800, 600));
    assert_eq!(descriptor.image_count, 3);
}

#[test]
fn test_resize_extent_follows_window_within_limits() {
    let support = reference_support(vk::Extent2D { width: u32::MAX, height: u32::MAX });
    let extent = choose_extent(&support.capabilities, (1280, 720));
    assert_eq!((extent.width, extent.height), (1280, 720));

    let extent = choose_extent(&support.capabilities, (10_000, 0));
    assert_eq!((extent.width, extent.height), (4096, 1));
}

#[test]
fn test_devices_without_present_support_are_rejected() {
    let candidates = [
        candidate(vk::PhysicalDeviceType::DISCRETE_GPU, None),
        candidate(vk::PhysicalDeviceType::INTEGRATED_GPU, None),
    ];
    for policy in [DeviceSelectionPolicy::FirstSuitable, DeviceSelectionPolicy::PreferDiscrete] {
        let err = select_device(&candidates, &required_device_extensions(), policy).unwrap_err();
        assert!(matches!(err, VulkanError::NoSuitableDevice { inspected: 2 }), "{err}");
    }
}

#[test]
fn test_policies_differ_only_in_preference() {
    let candidates = [
        candidate(vk::PhysicalDeviceType::INTEGRATED_GPU, Some(0)),
        candidate(vk::PhysicalDeviceType::DISCRETE_GPU, Some(1)),
    ];
    let required = required_device_extensions();
    assert_eq!(select_device(&candidates, &required, DeviceSelectionPolicy::FirstSuitable).unwrap(), 0);
    assert_eq!(select_device(&candidates, &required, DeviceSelectionPolicy::PreferDiscrete).unwrap(), 1);
}

#[test]
fn test_memory_type_choice_is_stable() {
    let mut props = vk::PhysicalDeviceMemoryProperties { memory_type_count: 3, ..Default::default() };
    props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    props.memory_types[1].property_flags =
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
    props.memory_types[2].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE
        | vk::MemoryPropertyFlags::HOST_COHERENT
        | vk::MemoryPropertyFlags::HOST_CACHED;

    let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
    let first = find_memory_type(&props, 0b110, wanted).unwrap();
    assert_eq!(first, 1);
    for _ in 0..4 {
        assert_eq!(find_memory_type(&props, 0b110, wanted).unwrap(), first);
    }
    assert_eq!(find_memory_type(&props, 0b100, wanted).unwrap(), 2);
    assert!(find_memory_type(&props, 0b001, wanted).is_err());
}
