// Window surface and the capability queries made against it

use super::Instance;
use crate::error::{InitError, ResourceError};
use crate::platform::SurfaceProvider;
use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

/// Capabilities, formats and present modes a device offers for a surface.
///
/// Always queried fresh; never cached between device selection and
/// swapchain creation.
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    /// At least one format and one present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

pub struct Surface {
    pub surface: vk::SurfaceKHR,
    pub loader: khr::Surface,
    _instance: Arc<Instance>,
}

impl Surface {
    pub fn new(instance: Arc<Instance>, window: &dyn SurfaceProvider) -> Result<Arc<Self>, InitError> {
        let surface = window.create_surface(&instance.entry, &instance.instance)?;
        let loader = khr::Surface::new(&instance.entry, &instance.instance);

        Ok(Arc::new(Self {
            surface,
            loader,
            _instance: instance,
        }))
    }

    pub fn supports_present(&self, device: vk::PhysicalDevice, queue_family: u32) -> VkResult<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(device, queue_family, self.surface)
        }
    }

    pub fn query_support(&self, device: vk::PhysicalDevice) -> VkResult<SwapchainSupport> {
        unsafe {
            Ok(SwapchainSupport {
                capabilities: self
                    .loader
                    .get_physical_device_surface_capabilities(device, self.surface)?,
                formats: self
                    .loader
                    .get_physical_device_surface_formats(device, self.surface)?,
                present_modes: self
                    .loader
                    .get_physical_device_surface_present_modes(device, self.surface)?,
            })
        }
    }

    /// Support query for swapchain creation, with the error typed for that step
    pub fn swapchain_support(&self, device: vk::PhysicalDevice) -> Result<SwapchainSupport, ResourceError> {
        self.query_support(device).map_err(ResourceError::SupportQuery)
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}
