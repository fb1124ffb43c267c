//! Swapchain selection rules and the swapchain object
//!
//! Selection is split from creation: [`SwapchainDescriptor::choose`] is a pure
//! function of the surface support and the drawable size, [`Swapchain::new`]
//! turns a descriptor into images and views.
//!
//! Rules:
//! - format: a lone `UNDEFINED` entry means any format, use `R8G8B8A8_UNORM`;
//!   otherwise the first 8-bit UNORM RGBA/BGRA format in sRGB-nonlinear color
//!   space;
//!   otherwise the first reported format
//! - present mode: mailbox when offered, FIFO otherwise
//! - extent: the surface's current extent unless it is the `u32::MAX`
//!   sentinel, then the drawable size clamped into the min/max image extent
//! - image count: one more than the minimum, clamped to the maximum when the
//!   surface reports one

use ash::extensions::khr::{Surface as SurfaceLoader, Swapchain as SwapchainLoader};
use ash::vk;

use crate::foundation::tracking::ResourceKind;
use crate::render::vulkan::initialization::device::{DeviceContext, QueueFamilyIndices};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// 8-bit per channel formats accepted for presentation; `_SRGB` variants are not
pub const PREFERRED_FORMATS: [vk::Format; 2] = [vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM];

/// Format used when the surface accepts anything
pub const DEFAULT_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// What a surface supports on one physical device
#[derive(Debug, Clone)]
pub struct SwapchainSupport {
    /// Image count, extent and transform limits
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format/color-space pairs
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    /// Query a surface on a physical device
    pub fn query(
        loader: &SurfaceLoader,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<Self> {
        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .map_err(VulkanError::Api)?,
                formats: loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .map_err(VulkanError::Api)?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .map_err(VulkanError::Api)?,
            })
        }
    }

    /// At least one format and one present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Choose the surface format
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return Some(DEFAULT_SURFACE_FORMAT);
        }
    }

    formats
        .iter()
        .find(|candidate| {
            PREFERRED_FORMATS.contains(&candidate.format)
                && candidate.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// Choose the present mode
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Choose the image extent for a drawable size in pixels
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, drawable: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (width, height) = drawable;
    vk::Extent2D {
        width: width.clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width.max(capabilities.min_image_extent.width)),
        height: height.clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height.max(capabilities.min_image_extent.height)),
    }
}

/// Choose how many images to request
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count.saturating_add(1);
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Chosen swapchain parameters
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDescriptor {
    /// Color format and color space
    pub surface_format: vk::SurfaceFormatKHR,
    /// Presentation mode
    pub present_mode: vk::PresentModeKHR,
    /// Image size in pixels
    pub extent: vk::Extent2D,
    /// Requested image count
    pub image_count: u32,
    /// Surface transform to apply
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainDescriptor {
    /// Apply the selection rules
    pub fn choose(support: &SwapchainSupport, drawable: (u32, u32)) -> VulkanResult<Self> {
        let surface_format = choose_surface_format(&support.formats)
            .ok_or_else(|| VulkanError::invalid("surface reports no formats"))?;
        Ok(Self {
            surface_format,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, drawable),
            image_count: choose_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
        })
    }

    /// Whether images of this extent can be created at all
    pub fn has_area(&self) -> bool {
        self.extent.width > 0 && self.extent.height > 0
    }
}

/// Owned color view of a swapchain image
pub struct ImageView {
    ctx: DeviceContext,
    view: vk::ImageView,
}

impl ImageView {
    /// Create a 2D color view
    pub fn new(ctx: &DeviceContext, image: vk::Image, format: vk::Format) -> VulkanResult<Self> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe {
            ctx.device()
                .create_image_view(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        ctx.ledger().record_create(ResourceKind::ImageView);
        Ok(Self { ctx: ctx.clone(), view })
    }

    /// View handle
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_image_view(self.view, None);
        }
        self.ctx.ledger().record_destroy(ResourceKind::ImageView);
    }
}

/// Swapchain with its images and views
pub struct Swapchain {
    ctx: DeviceContext,
    loader: SwapchainLoader,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    // Declared after the handle fields but destroyed first in Drop
    image_views: Vec<ImageView>,
    descriptor: SwapchainDescriptor,
}

impl Swapchain {
    /// Create a swapchain from a chosen descriptor
    ///
    /// `old_swapchain` may be a retiring swapchain or null. Images are shared
    /// concurrently when graphics and presentation use different families.
    pub fn new(
        ctx: &DeviceContext,
        loader: &SwapchainLoader,
        surface: vk::SurfaceKHR,
        descriptor: SwapchainDescriptor,
        queue_families: QueueFamilyIndices,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let family_indices = queue_families.unique_families();
        let sharing_mode = if family_indices.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(descriptor.image_count)
            .image_format(descriptor.surface_format.format)
            .image_color_space(descriptor.surface_format.color_space)
            .image_extent(descriptor.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .pre_transform(descriptor.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(descriptor.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);
        if sharing_mode == vk::SharingMode::CONCURRENT {
            create_info = create_info.queue_family_indices(&family_indices);
        }

        let handle = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        ctx.ledger().record_create(ResourceKind::Swapchain);

        let mut swapchain = Self {
            ctx: ctx.clone(),
            loader: loader.clone(),
            handle,
            images: Vec::new(),
            image_views: Vec::new(),
            descriptor,
        };

        // From here on an error drops `swapchain`, which destroys what exists so far
        swapchain.images = unsafe { loader.get_swapchain_images(handle).map_err(VulkanError::Api)? };
        for &image in &swapchain.images {
            let view = ImageView::new(ctx, image, descriptor.surface_format.format)?;
            swapchain.image_views.push(view);
        }

        log::debug!(
            "Created swapchain {}x{} {:?} {:?} with {} image(s)",
            descriptor.extent.width,
            descriptor.extent.height,
            descriptor.surface_format.format,
            descriptor.present_mode,
            swapchain.images.len()
        );

        Ok(swapchain)
    }

    /// Swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    /// `VK_KHR_swapchain` function table
    pub fn loader(&self) -> &SwapchainLoader {
        &self.loader
    }

    /// Parameters the swapchain was created with
    pub fn descriptor(&self) -> &SwapchainDescriptor {
        &self.descriptor
    }

    /// Image size
    pub fn extent(&self) -> vk::Extent2D {
        self.descriptor.extent
    }

    /// Color format
    pub fn format(&self) -> vk::Format {
        self.descriptor.surface_format.format
    }

    /// One view per image
    pub fn image_views(&self) -> &[ImageView] {
        &self.image_views
    }

    /// Number of images the driver actually created
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.image_views.clear();
        unsafe {
            self.loader.destroy_swapchain(self.handle, None);
        }
        self.ctx.ledger().record_destroy(ResourceKind::Swapchain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn assert_format(actual: vk::SurfaceFormatKHR, expected: vk::SurfaceFormatKHR) {
        assert_eq!(actual.format, expected.format);
        assert_eq!(actual.color_space, expected.color_space);
    }

    fn capabilities(min: u32, max: u32, current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: 64, height: 64 },
            max_image_extent: vk::Extent2D { width: 4096, height: 2160 },
            ..Default::default()
        }
    }

    #[test]
    fn test_format_prefers_srgb_pair_at_any_position() {
        let srgb = format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let lists = [
            vec![srgb, format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT)],
            vec![format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT), srgb],
            vec![
                format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                format(vk::Format::R5G6B5_UNORM_PACK16, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                srgb,
            ],
        ];
        for list in &lists {
            assert_format(choose_surface_format(list).unwrap(), srgb);
        }
    }

    #[test]
    fn test_format_skips_srgb_encoded_variants() {
        let unorm = format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let list = [format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR), unorm];
        assert_format(choose_surface_format(&list).unwrap(), unorm);

        let list = [
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_format(choose_surface_format(&list).unwrap(), list[0]);
    }

    #[test]
    fn test_format_falls_back_to_first() {
        let first = format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let list = [first, format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT)];
        assert_format(choose_surface_format(&list).unwrap(), first);
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_format_undefined_means_default() {
        let list = [format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        assert_format(choose_surface_format(&list).unwrap(), DEFAULT_SURFACE_FORMAT);
    }

    #[test]
    fn test_present_mode_rules() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(choose_present_mode(&[vk::PresentModeKHR::FIFO]), vk::PresentModeKHR::FIFO);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_extent_uses_fixed_surface_extent() {
        let caps = capabilities(2, 4, (800, 600));
        let extent = choose_extent(&caps, (1920, 1080));
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_extent_follows_window_clamped() {
        let caps = capabilities(2, 4, (u32::MAX, u32::MAX));
        let extent = choose_extent(&caps, (1280, 720));
        assert_eq!((extent.width, extent.height), (1280, 720));

        let extent = choose_extent(&caps, (10, 9000));
        assert_eq!((extent.width, extent.height), (64, 2160));
    }

    #[test]
    fn test_image_count_is_min_plus_one_clamped() {
        assert_eq!(choose_image_count(&capabilities(2, 4, (1, 1))), 3);
        assert_eq!(choose_image_count(&capabilities(3, 3, (1, 1))), 3);
        assert_eq!(choose_image_count(&capabilities(2, 0, (1, 1))), 3);
    }

    #[test]
    fn test_descriptor_end_to_end() {
        let support = SwapchainSupport {
            capabilities: capabilities(2, 4, (800, 600)),
            formats: vec![
                format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };
        assert!(support.is_adequate());

        let descriptor = SwapchainDescriptor::choose(&support, (1024, 768)).unwrap();
        assert_eq!(descriptor.surface_format.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(descriptor.surface_format.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        assert_eq!(descriptor.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!((descriptor.extent.width, descriptor.extent.height), (800, 600));
        assert_eq!(descriptor.image_count, 3);
        assert!(descriptor.has_area());
    }

    #[test]
    fn test_descriptor_zero_drawable_has_no_area() {
        let mut caps = capabilities(2, 4, (0, 0));
        caps.min_image_extent = vk::Extent2D { width: 0, height: 0 };
        let support = SwapchainSupport {
            capabilities: caps,
            formats: vec![DEFAULT_SURFACE_FORMAT],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(!SwapchainDescriptor::choose(&support, (0, 0)).unwrap().has_area());
    }
}
