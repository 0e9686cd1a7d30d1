// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Built once; a resized or out-of-date surface is not recreated.

use super::{Surface, VulkanDevice};
use crate::error::ResourceError;
use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

/// Prefer 8-bit BGRA sRGB, else whatever the surface lists first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX when preferred and offered, otherwise FIFO (always supported).
///
/// No other mode is ever returned, whatever the surface lists.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if preferred == vk::PresentModeKHR::MAILBOX && available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's fixed extent, or the framebuffer size clamped into bounds
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer: (u32, u32)) -> vk::Extent2D {
    // u32::MAX means "the window decides"
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (width, height) = framebuffer;
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, clamped into [1, max] with max == 0 unbounded.
///
/// When max == min the clamp takes the extra image back off again.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let upper = if capabilities.max_image_count == 0 {
        u32::MAX
    } else {
        capabilities.max_image_count
    };
    capabilities.min_image_count.saturating_add(1).clamp(1, upper)
}

/// Concurrent across both families when they differ, exclusive otherwise
pub fn image_sharing(graphics_family: u32, present_family: u32) -> (vk::SharingMode, Vec<u32>) {
    if graphics_family == present_family {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, vec![graphics_family, present_family])
    }
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    device: Arc<VulkanDevice>,
    _surface: Arc<Surface>,
}

impl Swapchain {
    pub fn new(
        device: Arc<VulkanDevice>,
        surface: Arc<Surface>,
        framebuffer_size: (u32, u32),
        preferred_present_mode: vk::PresentModeKHR,
    ) -> Result<Self, ResourceError> {
        // Queried again here; the snapshot from device selection may be stale
        let support = surface.swapchain_support(device.physical_device)?;
        let caps = &support.capabilities;

        let surface_format = choose_surface_format(&support.formats).ok_or(ResourceError::NoSurfaceFormat)?;
        let present_mode = choose_present_mode(&support.present_modes, preferred_present_mode);
        let extent = choose_extent(caps, framebuffer_size);
        let image_count = choose_image_count(caps);

        log::info!(
            "Creating swapchain: {}x{} {:?} {:?}, {} image(s) requested",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            image_count
        );

        let (sharing_mode, family_indices) =
            image_sharing(device.graphics_queue_family, device.present_queue_family);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let swapchain_loader = khr::Swapchain::new(&device.instance.instance, &device.device);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(ResourceError::Swapchain)?;

        // Owned from here: an early return below destroys what exists so far
        let mut this = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
            present_mode,
            device,
            _surface: surface,
        };

        // The driver may hand back more images than requested
        this.images = unsafe { this.swapchain_loader.get_swapchain_images(this.swapchain) }
            .map_err(ResourceError::SwapchainImages)?;

        log::info!("Created swapchain with {} images", this.images.len());

        for index in 0..this.images.len() {
            let view = this.create_image_view(this.images[index])?;
            this.image_views.push(view);
        }

        Ok(this)
    }

    fn create_image_view(&self, image: vk::Image) -> Result<vk::ImageView, ResourceError> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.format)
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

        unsafe { self.device.device.create_image_view(&create_info, None) }.map_err(ResourceError::ImageView)
    }

    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Acquire next image for rendering. Returns (index, suboptimal).
    pub fn acquire_next_image(&self, timeout: u64, semaphore: vk::Semaphore) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, timeout, semaphore, vk::Fence::null())
        }
    }

    /// Present rendered image to screen. Returns whether the swapchain is suboptimal.
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait_semaphores: &[vk::Semaphore]) -> VkResult<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn bounded_caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 100, height: 100 },
            max_image_extent: vk::Extent2D { width: 1920, height: 1080 },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        }
    }

    #[test]
    fn preferred_format_found_anywhere_in_list() {
        let preferred = format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let others = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];

        for position in 0..=others.len() {
            let mut formats = others.to_vec();
            formats.insert(position, preferred);
            let chosen = choose_surface_format(&formats).unwrap();
            assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
            assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        }
    }

    #[test]
    fn first_format_is_the_fallback() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);

        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn mailbox_when_offered() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn fifo_otherwise_never_anything_else() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&[], vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn only_mailbox_or_fifo_come_back() {
        let everything = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO_RELAXED,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ];
        let preferences = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO_RELAXED,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ];

        for preferred in preferences {
            for len in 0..=everything.len() {
                let chosen = choose_present_mode(&everything[..len], preferred);
                assert!(
                    chosen == vk::PresentModeKHR::MAILBOX || chosen == vk::PresentModeKHR::FIFO,
                    "{:?} preferred, {:?} offered, got {:?}",
                    preferred,
                    &everything[..len],
                    chosen
                );
            }
        }

        let configured = crate::config::Config::parse("[graphics]\npresent_mode = \"immediate\"").unwrap();
        assert_eq!(
            choose_present_mode(&everything, configured.present_mode()),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn fifo_preference_skips_mailbox() {
        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::FIFO),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn fixed_extent_is_used_unmodified() {
        let mut caps = bounded_caps();
        caps.current_extent = vk::Extent2D { width: 640, height: 480 };

        let extent = choose_extent(&caps, (5000, 5000));
        assert_eq!((extent.width, extent.height), (640, 480));
    }

    #[test]
    fn framebuffer_inside_bounds_passes_through() {
        let extent = choose_extent(&bounded_caps(), (1280, 720));
        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn framebuffer_outside_bounds_is_clamped() {
        let extent = choose_extent(&bounded_caps(), (4000, 10));
        assert_eq!((extent.width, extent.height), (1920, 100));
    }

    #[test]
    fn image_count_unbounded_max() {
        let caps = bounded_caps();
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn image_count_clamped_to_max() {
        let mut caps = bounded_caps();
        caps.min_image_count = 3;
        caps.max_image_count = 3;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn image_count_never_below_one() {
        let mut caps = bounded_caps();
        caps.min_image_count = 0;
        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 1);
    }

    #[test]
    fn sharing_mode_follows_families() {
        let (mode, families) = image_sharing(0, 0);
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(families.is_empty());

        let (mode, families) = image_sharing(0, 2);
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(families, vec![0, 2]);
    }
}
